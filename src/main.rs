use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::{error, info};

use vendlink::application::engine::{PaymentGating, VendEngine};
use vendlink::domain::ports::{CommandLedgerBox, ProductStore, ProductStoreBox, SaleLogBox};
use vendlink::domain::product::{Price, Product};
use vendlink::error::VendError;
use vendlink::infrastructure::in_memory::InMemoryVendStore;
use vendlink::interfaces::api::{
    AcknowledgeRequest, Api, ConfirmPaymentRequest, PurchaseRequest,
};
use vendlink::interfaces::csv::event_reader::{EventReader, EventRecord, EventType};
use vendlink::interfaces::csv::inventory_writer::InventoryWriter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input replay events CSV file
    events: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Hold new purchases in awaiting_payment until confirmed
    #[arg(long)]
    payment_gating: bool,

    /// Shared secret for payment confirmations
    /// (falls back to VENDLINK_GATE_SECRET)
    #[arg(long)]
    gate_secret: Option<String>,
}

fn build_stores(
    db_path: Option<PathBuf>,
) -> Result<(ProductStoreBox, CommandLedgerBox, SaleLogBox)> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store =
                vendlink::infrastructure::rocksdb::RocksDbVendStore::open(path)
                    .into_diagnostic()?;
            let products: ProductStoreBox = Box::new(store.clone());
            let ledger: CommandLedgerBox = Box::new(store.clone());
            let sales: SaleLogBox = Box::new(store);
            Ok((products, ledger, sales))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: persistent storage requested via --db-path, but the \
                 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
            );
            Ok(in_memory_stores())
        }
        None => Ok(in_memory_stores()),
    }
}

fn in_memory_stores() -> (ProductStoreBox, CommandLedgerBox, SaleLogBox) {
    let store = InMemoryVendStore::new();
    let products: ProductStoreBox = Box::new(store.clone());
    let ledger: CommandLedgerBox = Box::new(store.clone());
    let sales: SaleLogBox = Box::new(store);
    (products, ledger, sales)
}

async fn apply_event(
    api: &Api,
    gate_secret: &Option<String>,
    record: EventRecord,
) -> vendlink::error::Result<()> {
    match record.event {
        EventType::Stock => {
            let (Some(product_id), Some(motor_id), Some(price), Some(count)) =
                (record.product, record.motor, record.price, record.count)
            else {
                return Err(VendError::InvalidInput(
                    "stock event needs product, motor, price and count".to_string(),
                ));
            };
            let product = Product::new(
                product_id,
                record.machine,
                motor_id,
                format!("slot-{motor_id}"),
                Price::new(price)?,
                count,
            );
            api.engine().products().put(product).await
        }
        EventType::Purchase => {
            let Some(product_id) = record.product else {
                return Err(VendError::InvalidInput(
                    "purchase event needs a product".to_string(),
                ));
            };
            let response = api
                .create_purchase(PurchaseRequest {
                    machine_id: record.machine,
                    product_id,
                })
                .await?;
            info!(
                command_id = response.command_id,
                status = %response.status,
                "purchase created"
            );
            Ok(())
        }
        EventType::Poll => {
            let response = api.next_command(&record.machine).await?;
            match response.command_id {
                Some(id) => info!(
                    machine = %record.machine,
                    command_id = id,
                    motor_id = response.motor_id,
                    "dispatched"
                ),
                None => info!(machine = %record.machine, "no pending command"),
            }
            Ok(())
        }
        EventType::Ack => {
            let (Some(command_id), Some(outcome), Some(motor_id)) =
                (record.command, record.outcome, record.motor)
            else {
                return Err(VendError::InvalidInput(
                    "ack event needs command, motor and outcome".to_string(),
                ));
            };
            let response = api
                .acknowledge(AcknowledgeRequest {
                    command_id,
                    machine_id: record.machine,
                    motor_id,
                    status: outcome,
                })
                .await?;
            info!(command_id, message = %response.message, "acknowledged");
            Ok(())
        }
        EventType::Confirm => {
            let response = api
                .confirm_payment(ConfirmPaymentRequest {
                    machine_id: record.machine.clone(),
                    secret: gate_secret.clone(),
                })
                .await?;
            info!(
                machine = %record.machine,
                command_id = response.command_id,
                "payment confirmed"
            );
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let gate_secret = cli
        .gate_secret
        .or_else(|| std::env::var("VENDLINK_GATE_SECRET").ok());
    let gating = if cli.payment_gating {
        PaymentGating::Enabled
    } else {
        PaymentGating::Disabled
    };

    let (products, ledger, sales) = build_stores(cli.db_path)?;
    let engine = VendEngine::new(products, ledger, sales, gating);
    let api = Api::new(engine, gate_secret.clone());

    let file = File::open(cli.events).into_diagnostic()?;
    let mut machines: BTreeSet<String> = BTreeSet::new();
    for event in EventReader::new(file).events() {
        match event {
            Ok(record) => {
                machines.insert(record.machine.clone());
                if let Err(e) = apply_event(&api, &gate_secret, record).await {
                    error!(code = e.code(), "event failed: {e}");
                }
            }
            Err(e) => error!("bad event row: {e}"),
        }
    }

    let mut inventory = Vec::new();
    for machine in machines {
        inventory.extend(api.engine().products().for_machine(&machine).await.into_diagnostic()?);
    }

    let stdout = io::stdout();
    let mut writer = InventoryWriter::new(stdout.lock());
    writer.write_products(inventory).into_diagnostic()?;

    Ok(())
}
