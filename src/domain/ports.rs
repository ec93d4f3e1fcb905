use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::command::{CommandStatus, VendCommand};
use super::product::{Price, Product};
use super::sale::SaleRecord;
use crate::error::Result;

pub type ProductStoreBox = Box<dyn ProductStore>;
pub type CommandLedgerBox = Box<dyn CommandLedger>;
pub type SaleLogBox = Box<dyn SaleLog>;

/// Stock change applied alongside a status transition. The payload is the
/// product id whose slot is adjusted by one unit.
///
/// `Decrement` is guarded: if the slot is already empty the whole transition
/// aborts with `OutOfStock` and the command is left untouched. `Increment` is
/// the compensation direction used by optimistic-decrement designs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockAdjustment {
    None,
    Decrement(u32),
    Increment(u32),
}

/// Sale row to append as part of a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleDraft {
    pub product_id: u32,
    pub amount_paid: Price,
}

/// Side effects committed atomically with a status transition, or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct AckEffects {
    pub stock: StockAdjustment,
    pub sale: Option<SaleDraft>,
}

impl AckEffects {
    pub fn none() -> Self {
        Self {
            stock: StockAdjustment::None,
            sale: None,
        }
    }

    pub fn vend(product_id: u32, amount_paid: Price) -> Self {
        Self {
            stock: StockAdjustment::Decrement(product_id),
            sale: Some(SaleDraft {
                product_id,
                amount_paid,
            }),
        }
    }

    pub fn restock(product_id: u32) -> Self {
        Self {
            stock: StockAdjustment::Increment(product_id),
            sale: None,
        }
    }
}

/// Inventory of product slots. Owned externally; the core reads slots and
/// adjusts stock only through [`CommandLedger::transition`] effects.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Inserts or replaces a slot. Fails with `DuplicateSlot` if another
    /// product already occupies `(machine_id, motor_id)`.
    async fn put(&self, product: Product) -> Result<()>;
    async fn get(&self, product_id: u32) -> Result<Option<Product>>;
    /// All slots of a machine, ordered by motor id.
    async fn for_machine(&self, machine_id: &str) -> Result<Vec<Product>>;
}

/// Durable, ordered log of vend commands per machine.
#[async_trait]
pub trait CommandLedger: Send + Sync {
    /// Assigns the next monotonic id and inserts a command in `initial`
    /// state. Any in-flight command for the same machine is superseded in
    /// the same transaction, before the insert.
    async fn create(
        &self,
        machine_id: &str,
        product_id: u32,
        motor_id: u32,
        initial: CommandStatus,
    ) -> Result<VendCommand>;

    async fn get(&self, command_id: u64) -> Result<Option<VendCommand>>;

    /// Earliest-created pending command for the machine; lower id wins ties.
    async fn oldest_pending(&self, machine_id: &str) -> Result<Option<VendCommand>>;

    /// Newest command held in `AwaitingPayment` for the machine.
    async fn latest_awaiting_payment(&self, machine_id: &str) -> Result<Option<VendCommand>>;

    /// Compare-and-set on status plus atomic side effects.
    ///
    /// Fails with `StaleTransition` if the current status differs from
    /// `expected`; fails with `OutOfStock` if a guarded decrement finds an
    /// empty slot. On any failure nothing is applied.
    async fn transition(
        &self,
        command_id: u64,
        expected: CommandStatus,
        to: CommandStatus,
        effects: AckEffects,
    ) -> Result<VendCommand>;

    /// In-flight commands created strictly before `cutoff`, for the expiry
    /// sweep.
    async fn in_flight_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<VendCommand>>;
}

/// Read side of the sale audit log. Appends happen only through
/// [`AckEffects`].
#[async_trait]
pub trait SaleLog: Send + Sync {
    async fn all(&self) -> Result<Vec<SaleRecord>>;
}
