use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::domain::command::{CommandStatus, VendCommand};
use crate::domain::ports::{
    AckEffects, CommandLedger, ProductStore, SaleLog, StockAdjustment,
};
use crate::domain::product::Product;
use crate::domain::sale::SaleRecord;
use crate::error::{Result, VendError};

/// Column Family for product slots.
pub const CF_PRODUCTS: &str = "products";
/// Column Family for the command ledger.
pub const CF_COMMANDS: &str = "commands";
/// Column Family for the append-only sale log.
pub const CF_SALES: &str = "sales";
/// Column Family for id counters.
pub const CF_META: &str = "meta";

const KEY_NEXT_COMMAND_ID: &[u8] = b"next_command_id";
const KEY_NEXT_SALE_ID: &[u8] = b"next_sale_id";

/// A persistent store implementation using RocksDB.
///
/// Each logical transaction (supersession + insert, CAS transition + side
/// effects) is serialized behind a write mutex and committed as a single
/// `WriteBatch`, so a crash can never leave a transition half applied.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbVendStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbVendStore {
    /// Opens or creates a RocksDB instance at the given path, ensuring all
    /// column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_PRODUCTS, CF_COMMANDS, CF_SALES, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;
        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| VendError::Storage(format!("column family '{name}' not found")))
    }

    fn next_id(&self, key: &[u8], batch: &mut WriteBatch) -> Result<u64> {
        let cf = self.cf(CF_META)?;
        let current = match self.db.get_cf(cf, key)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| VendError::Storage("corrupt id counter".to_string()))?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let next = current + 1;
        batch.put_cf(cf, key, next.to_be_bytes());
        Ok(next)
    }

    fn get_product(&self, product_id: u32) -> Result<Option<Product>> {
        let cf = self.cf(CF_PRODUCTS)?;
        match self.db.get_cf(cf, product_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_command(&self, command_id: u64) -> Result<Option<VendCommand>> {
        let cf = self.cf(CF_COMMANDS)?;
        match self.db.get_cf(cf, command_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_commands(&self) -> Result<Vec<VendCommand>> {
        let cf = self.cf(CF_COMMANDS)?;
        let mut commands = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            commands.push(serde_json::from_slice(&value)?);
        }
        Ok(commands)
    }

    fn put_command(&self, batch: &mut WriteBatch, command: &VendCommand) -> Result<()> {
        let cf = self.cf(CF_COMMANDS)?;
        batch.put_cf(cf, command.id.to_be_bytes(), serde_json::to_vec(command)?);
        Ok(())
    }

    /// Stages a stock adjustment into `batch`, failing before any write if a
    /// guarded decrement would go negative.
    fn stage_stock(&self, batch: &mut WriteBatch, adjustment: StockAdjustment) -> Result<()> {
        let (product_id, delta) = match adjustment {
            StockAdjustment::None => return Ok(()),
            StockAdjustment::Decrement(id) => (id, -1i64),
            StockAdjustment::Increment(id) => (id, 1i64),
        };
        let mut product = self
            .get_product(product_id)?
            .ok_or(VendError::ProductNotFound(product_id))?;
        if delta < 0 && product.stock == 0 {
            return Err(VendError::OutOfStock { product_id });
        }
        product.stock = (product.stock as i64 + delta) as u32;
        let cf = self.cf(CF_PRODUCTS)?;
        batch.put_cf(cf, product.id.to_be_bytes(), serde_json::to_vec(&product)?);
        Ok(())
    }
}

#[async_trait]
impl ProductStore for RocksDbVendStore {
    async fn put(&self, product: Product) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| VendError::Storage("write lock poisoned".to_string()))?;
        let cf = self.cf(CF_PRODUCTS)?;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let existing: Product = serde_json::from_slice(&value)?;
            if existing.id != product.id
                && existing.machine_id == product.machine_id
                && existing.motor_id == product.motor_id
            {
                return Err(VendError::DuplicateSlot {
                    machine_id: product.machine_id,
                    motor_id: product.motor_id,
                });
            }
        }
        self.db
            .put_cf(cf, product.id.to_be_bytes(), serde_json::to_vec(&product)?)?;
        Ok(())
    }

    async fn get(&self, product_id: u32) -> Result<Option<Product>> {
        self.get_product(product_id)
    }

    async fn for_machine(&self, machine_id: &str) -> Result<Vec<Product>> {
        let cf = self.cf(CF_PRODUCTS)?;
        let mut products = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let product: Product = serde_json::from_slice(&value)?;
            if product.machine_id == machine_id {
                products.push(product);
            }
        }
        products.sort_by_key(|p| p.motor_id);
        Ok(products)
    }
}

#[async_trait]
impl CommandLedger for RocksDbVendStore {
    async fn create(
        &self,
        machine_id: &str,
        product_id: u32,
        motor_id: u32,
        initial: CommandStatus,
    ) -> Result<VendCommand> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| VendError::Storage("write lock poisoned".to_string()))?;
        let mut batch = WriteBatch::default();

        // Supersede in-flight commands for the machine in the same batch
        // that inserts the new one.
        for mut existing in self.scan_commands()? {
            if existing.machine_id == machine_id && existing.status.is_in_flight() {
                existing.status = CommandStatus::Superseded;
                self.put_command(&mut batch, &existing)?;
            }
        }

        let id = self.next_id(KEY_NEXT_COMMAND_ID, &mut batch)?;
        let command = VendCommand {
            id,
            machine_id: machine_id.to_string(),
            product_id,
            motor_id,
            status: initial,
            created_at: Utc::now(),
            acknowledged_at: None,
        };
        self.put_command(&mut batch, &command)?;
        self.db.write(batch)?;
        Ok(command)
    }

    async fn get(&self, command_id: u64) -> Result<Option<VendCommand>> {
        self.get_command(command_id)
    }

    async fn oldest_pending(&self, machine_id: &str) -> Result<Option<VendCommand>> {
        // Id-ordered scan, so min_by_key keeps the lower id on ties.
        Ok(self
            .scan_commands()?
            .into_iter()
            .filter(|c| c.machine_id == machine_id && c.status == CommandStatus::Pending)
            .min_by_key(|c| c.created_at))
    }

    async fn latest_awaiting_payment(&self, machine_id: &str) -> Result<Option<VendCommand>> {
        Ok(self
            .scan_commands()?
            .into_iter()
            .filter(|c| {
                c.machine_id == machine_id && c.status == CommandStatus::AwaitingPayment
            })
            .max_by_key(|c| (c.created_at, c.id)))
    }

    async fn transition(
        &self,
        command_id: u64,
        expected: CommandStatus,
        to: CommandStatus,
        effects: AckEffects,
    ) -> Result<VendCommand> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| VendError::Storage("write lock poisoned".to_string()))?;

        let mut command = self
            .get_command(command_id)?
            .ok_or(VendError::CommandNotFound(command_id))?;
        if command.status != expected {
            return Err(VendError::StaleTransition {
                command_id,
                expected,
                actual: command.status,
            });
        }

        let mut batch = WriteBatch::default();
        self.stage_stock(&mut batch, effects.stock)?;
        if let Some(draft) = effects.sale {
            let id = self.next_id(KEY_NEXT_SALE_ID, &mut batch)?;
            let sale = SaleRecord {
                id,
                product_id: draft.product_id,
                quantity: 1,
                amount_paid: draft.amount_paid,
                timestamp: Utc::now(),
            };
            let cf = self.cf(CF_SALES)?;
            batch.put_cf(cf, id.to_be_bytes(), serde_json::to_vec(&sale)?);
        }

        command.status = to;
        if to.is_terminal() {
            command.acknowledged_at = Some(Utc::now());
        }
        self.put_command(&mut batch, &command)?;
        self.db.write(batch)?;
        Ok(command)
    }

    async fn in_flight_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<VendCommand>> {
        Ok(self
            .scan_commands()?
            .into_iter()
            .filter(|c| c.status.is_in_flight() && c.created_at < cutoff)
            .collect())
    }
}

#[async_trait]
impl SaleLog for RocksDbVendStore {
    async fn all(&self) -> Result<Vec<SaleRecord>> {
        let cf = self.cf(CF_SALES)?;
        let mut sales = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            sales.push(serde_json::from_slice(&value)?);
        }
        Ok(sales)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::Price;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn product(id: u32, machine: &str, motor: u32, stock: u32) -> Product {
        Product::new(id, machine, motor, "Cola", Price::new(dec!(2.50)).unwrap(), stock)
    }

    #[tokio::test]
    async fn test_open_creates_column_families() {
        let dir = tempdir().unwrap();
        let store = RocksDbVendStore::open(dir.path()).expect("failed to open RocksDB");
        for name in [CF_PRODUCTS, CF_COMMANDS, CF_SALES, CF_META] {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_command_ids_survive_reopen() {
        let dir = tempdir().unwrap();
        let first_id = {
            let store = RocksDbVendStore::open(dir.path()).unwrap();
            store
                .create("v1", 1, 3, CommandStatus::Pending)
                .await
                .unwrap()
                .id
        };

        let store = RocksDbVendStore::open(dir.path()).unwrap();
        let recovered = store.get_command(first_id).unwrap().unwrap();
        assert_eq!(recovered.status, CommandStatus::Pending);

        let second = store
            .create("v2", 2, 1, CommandStatus::Pending)
            .await
            .unwrap();
        assert_eq!(second.id, first_id + 1);
    }

    #[tokio::test]
    async fn test_transition_with_effects_is_atomic() {
        let dir = tempdir().unwrap();
        let store = RocksDbVendStore::open(dir.path()).unwrap();
        ProductStore::put(&store, product(1, "v1", 3, 1)).await.unwrap();
        let command = store
            .create("v1", 1, 3, CommandStatus::Pending)
            .await
            .unwrap();

        store
            .transition(
                command.id,
                CommandStatus::Pending,
                CommandStatus::AcknowledgedSuccess,
                AckEffects::vend(1, Price::new(dec!(2.50)).unwrap()),
            )
            .await
            .unwrap();

        assert_eq!(store.get_product(1).unwrap().unwrap().stock, 0);
        assert_eq!(store.all().await.unwrap().len(), 1);

        // A second decrement attempt must leave everything untouched.
        let other = store
            .create("v1", 1, 3, CommandStatus::Pending)
            .await
            .unwrap();
        let result = store
            .transition(
                other.id,
                CommandStatus::Pending,
                CommandStatus::AcknowledgedSuccess,
                AckEffects::vend(1, Price::new(dec!(2.50)).unwrap()),
            )
            .await;
        assert!(matches!(result, Err(VendError::OutOfStock { .. })));
        assert_eq!(store.get_command(other.id).unwrap().unwrap().status, CommandStatus::Pending);
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_supersession_batch() {
        let dir = tempdir().unwrap();
        let store = RocksDbVendStore::open(dir.path()).unwrap();
        let first = store
            .create("v1", 1, 3, CommandStatus::AwaitingPayment)
            .await
            .unwrap();
        let second = store
            .create("v1", 2, 4, CommandStatus::Pending)
            .await
            .unwrap();

        assert_eq!(
            store.get_command(first.id).unwrap().unwrap().status,
            CommandStatus::Superseded
        );
        let dispatched = store.oldest_pending("v1").await.unwrap().unwrap();
        assert_eq!(dispatched.id, second.id);
    }
}
