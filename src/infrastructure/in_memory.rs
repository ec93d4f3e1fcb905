use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::command::{CommandStatus, VendCommand};
use crate::domain::ports::{
    AckEffects, CommandLedger, ProductStore, SaleLog, StockAdjustment,
};
use crate::domain::product::Product;
use crate::domain::sale::SaleRecord;
use crate::error::{Result, VendError};

#[derive(Default)]
struct Inner {
    products: HashMap<u32, Product>,
    commands: BTreeMap<u64, VendCommand>,
    sales: Vec<SaleRecord>,
    next_command_id: u64,
    next_sale_id: u64,
}

impl Inner {
    fn apply_stock(&mut self, adjustment: StockAdjustment) -> Result<()> {
        match adjustment {
            StockAdjustment::None => Ok(()),
            StockAdjustment::Decrement(product_id) => {
                let product = self
                    .products
                    .get_mut(&product_id)
                    .ok_or(VendError::ProductNotFound(product_id))?;
                if product.stock == 0 {
                    return Err(VendError::OutOfStock { product_id });
                }
                product.stock -= 1;
                Ok(())
            }
            StockAdjustment::Increment(product_id) => {
                let product = self
                    .products
                    .get_mut(&product_id)
                    .ok_or(VendError::ProductNotFound(product_id))?;
                product.stock += 1;
                Ok(())
            }
        }
    }
}

/// A thread-safe in-memory store implementing all three ports.
///
/// One write lock spans one logical transaction, so supersession + insert and
/// status transition + stock/sale effects each commit as a unit. `Clone`
/// shares the underlying state.
#[derive(Default, Clone)]
pub struct InMemoryVendStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryVendStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for InMemoryVendStore {
    async fn put(&self, product: Product) -> Result<()> {
        let mut inner = self.inner.write().await;
        let slot_taken = inner.products.values().any(|p| {
            p.id != product.id
                && p.machine_id == product.machine_id
                && p.motor_id == product.motor_id
        });
        if slot_taken {
            return Err(VendError::DuplicateSlot {
                machine_id: product.machine_id,
                motor_id: product.motor_id,
            });
        }
        inner.products.insert(product.id, product);
        Ok(())
    }

    async fn get(&self, product_id: u32) -> Result<Option<Product>> {
        let inner = self.inner.read().await;
        Ok(inner.products.get(&product_id).cloned())
    }

    async fn for_machine(&self, machine_id: &str) -> Result<Vec<Product>> {
        let inner = self.inner.read().await;
        let mut products: Vec<Product> = inner
            .products
            .values()
            .filter(|p| p.machine_id == machine_id)
            .cloned()
            .collect();
        products.sort_by_key(|p| p.motor_id);
        Ok(products)
    }
}

#[async_trait]
impl CommandLedger for InMemoryVendStore {
    async fn create(
        &self,
        machine_id: &str,
        product_id: u32,
        motor_id: u32,
        initial: CommandStatus,
    ) -> Result<VendCommand> {
        let mut inner = self.inner.write().await;

        // Supersession happens-before the insert, inside the same lock.
        let in_flight: Vec<u64> = inner
            .commands
            .values()
            .filter(|c| c.machine_id == machine_id && c.status.is_in_flight())
            .map(|c| c.id)
            .collect();
        for id in in_flight {
            if let Some(command) = inner.commands.get_mut(&id) {
                command.status = CommandStatus::Superseded;
            }
        }

        inner.next_command_id += 1;
        let command = VendCommand {
            id: inner.next_command_id,
            machine_id: machine_id.to_string(),
            product_id,
            motor_id,
            status: initial,
            created_at: Utc::now(),
            acknowledged_at: None,
        };
        inner.commands.insert(command.id, command.clone());
        Ok(command)
    }

    async fn get(&self, command_id: u64) -> Result<Option<VendCommand>> {
        let inner = self.inner.read().await;
        Ok(inner.commands.get(&command_id).cloned())
    }

    async fn oldest_pending(&self, machine_id: &str) -> Result<Option<VendCommand>> {
        let inner = self.inner.read().await;
        // BTreeMap iterates in id order, so min_by_key on created_at keeps
        // the lower id on timestamp ties.
        Ok(inner
            .commands
            .values()
            .filter(|c| c.machine_id == machine_id && c.status == CommandStatus::Pending)
            .min_by_key(|c| c.created_at)
            .cloned())
    }

    async fn latest_awaiting_payment(&self, machine_id: &str) -> Result<Option<VendCommand>> {
        let inner = self.inner.read().await;
        Ok(inner
            .commands
            .values()
            .filter(|c| {
                c.machine_id == machine_id && c.status == CommandStatus::AwaitingPayment
            })
            .max_by_key(|c| (c.created_at, c.id))
            .cloned())
    }

    async fn transition(
        &self,
        command_id: u64,
        expected: CommandStatus,
        to: CommandStatus,
        effects: AckEffects,
    ) -> Result<VendCommand> {
        let mut inner = self.inner.write().await;

        let current = inner
            .commands
            .get(&command_id)
            .ok_or(VendError::CommandNotFound(command_id))?
            .status;
        if current != expected {
            return Err(VendError::StaleTransition {
                command_id,
                expected,
                actual: current,
            });
        }

        // Effects are validated before any write so a failure leaves the
        // command in its `expected` state.
        inner.apply_stock(effects.stock)?;
        if let Some(draft) = effects.sale {
            inner.next_sale_id += 1;
            let sale = SaleRecord {
                id: inner.next_sale_id,
                product_id: draft.product_id,
                quantity: 1,
                amount_paid: draft.amount_paid,
                timestamp: Utc::now(),
            };
            inner.sales.push(sale);
        }

        let command = inner
            .commands
            .get_mut(&command_id)
            .ok_or(VendError::CommandNotFound(command_id))?;
        command.status = to;
        if to.is_terminal() {
            command.acknowledged_at = Some(Utc::now());
        }
        Ok(command.clone())
    }

    async fn in_flight_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<VendCommand>> {
        let inner = self.inner.read().await;
        Ok(inner
            .commands
            .values()
            .filter(|c| c.status.is_in_flight() && c.created_at < cutoff)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SaleLog for InMemoryVendStore {
    async fn all(&self) -> Result<Vec<SaleRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.sales.clone())
    }
}
