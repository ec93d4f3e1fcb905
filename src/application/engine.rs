use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::command::{AckOutcome, CommandStatus, VendCommand};
use crate::domain::ports::{
    AckEffects, CommandLedger, CommandLedgerBox, ProductStore, ProductStoreBox, SaleLogBox,
};
use crate::error::{Result, VendError};

/// Whether new purchases must wait for an external payment confirmation
/// before becoming dispatchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaymentGating {
    #[default]
    Disabled,
    Enabled,
}

/// What the dispatcher hands to a polling actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub command_id: u64,
    pub motor_id: u32,
}

/// Result of processing an acknowledgment report.
///
/// `AlreadyProcessed` is the idempotence path: a repeated or late report for
/// a command that already reached a terminal state is accepted without any
/// further effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckReceipt {
    Processed(CommandStatus),
    AlreadyProcessed(CommandStatus),
}

impl AckReceipt {
    pub fn status(&self) -> CommandStatus {
        match self {
            Self::Processed(s) | Self::AlreadyProcessed(s) => *s,
        }
    }
}

/// Coordinates the vend command lifecycle against the storage ports.
///
/// Stock is decremented only at confirmed success (never optimistically at
/// purchase time), so failure acknowledgments carry no compensation.
pub struct VendEngine {
    products: ProductStoreBox,
    ledger: CommandLedgerBox,
    sales: SaleLogBox,
    gating: PaymentGating,
}

impl VendEngine {
    pub fn new(
        products: ProductStoreBox,
        ledger: CommandLedgerBox,
        sales: SaleLogBox,
        gating: PaymentGating,
    ) -> Self {
        Self {
            products,
            ledger,
            sales,
            gating,
        }
    }

    pub fn products(&self) -> &ProductStoreBox {
        &self.products
    }

    pub fn sales(&self) -> &SaleLogBox {
        &self.sales
    }

    /// Admits a purchase request as a new ledger entry.
    ///
    /// Any in-flight command for the machine is superseded by the ledger
    /// within the same transaction that inserts the new one.
    pub async fn create_purchase(
        &self,
        machine_id: &str,
        product_id: u32,
    ) -> Result<VendCommand> {
        let product = self
            .products
            .get(product_id)
            .await?
            .ok_or(VendError::ProductNotFound(product_id))?;
        if product.machine_id != machine_id {
            return Err(VendError::InvalidProduct {
                product_id,
                machine_id: machine_id.to_string(),
            });
        }
        if product.stock == 0 {
            return Err(VendError::OutOfStock { product_id });
        }

        let initial = match self.gating {
            PaymentGating::Enabled => CommandStatus::AwaitingPayment,
            PaymentGating::Disabled => CommandStatus::Pending,
        };
        let command = self
            .ledger
            .create(machine_id, product_id, product.motor_id, initial)
            .await?;
        info!(
            command_id = command.id,
            machine_id, product_id, status = %command.status,
            "purchase admitted"
        );
        Ok(command)
    }

    /// Returns the command the machine should execute next, without mutating
    /// the ledger. Repeated polls return the same command until it is
    /// acknowledged; re-delivery is the retry mechanism, the status guard in
    /// [`Self::acknowledge`] keeps it safe.
    pub async fn next_command(&self, machine_id: &str) -> Result<Option<Dispatch>> {
        Ok(self
            .ledger
            .oldest_pending(machine_id)
            .await?
            .map(|c| Dispatch {
                command_id: c.id,
                motor_id: c.motor_id,
            }))
    }

    /// Applies the exactly-once logical effect of a reported outcome.
    ///
    /// Safe under at-least-once delivery: the pending check plus the ledger's
    /// compare-and-set guarantee that only the first report for a command
    /// mutates anything.
    pub async fn acknowledge(
        &self,
        command_id: u64,
        machine_id: &str,
        motor_id: u32,
        outcome: AckOutcome,
    ) -> Result<AckReceipt> {
        let command = self
            .ledger
            .get(command_id)
            .await?
            .ok_or(VendError::CommandNotFound(command_id))?;

        if command.machine_id != machine_id {
            return Err(VendError::MachineMismatch {
                command_id,
                expected: command.machine_id,
                reported: machine_id.to_string(),
            });
        }
        if command.motor_id != motor_id {
            // The original firmware occasionally reports a stale motor id;
            // the command id is authoritative.
            warn!(
                command_id,
                expected = command.motor_id,
                reported = motor_id,
                "motor id mismatch in acknowledgment"
            );
        }

        if command.status != CommandStatus::Pending {
            info!(command_id, status = %command.status, "duplicate acknowledgment ignored");
            return Ok(AckReceipt::AlreadyProcessed(command.status));
        }

        let result = match outcome {
            AckOutcome::Success => self.acknowledge_success(&command).await,
            AckOutcome::Failure => {
                self.ledger
                    .transition(
                        command_id,
                        CommandStatus::Pending,
                        CommandStatus::AcknowledgedFailure,
                        AckEffects::none(),
                    )
                    .await
                    .map(|c| AckReceipt::Processed(c.status))
            }
        };

        match result {
            // A concurrent acknowledgment won the compare-and-set; this one
            // becomes the harmless duplicate.
            Err(VendError::StaleTransition { actual, .. }) => {
                info!(command_id, status = %actual, "lost acknowledgment race");
                Ok(AckReceipt::AlreadyProcessed(actual))
            }
            Ok(receipt) => {
                info!(command_id, status = %receipt.status(), "acknowledgment processed");
                Ok(receipt)
            }
            Err(e) => Err(e),
        }
    }

    async fn acknowledge_success(&self, command: &VendCommand) -> Result<AckReceipt> {
        let Some(product) = self.products.get(command.product_id).await? else {
            warn!(
                command_id = command.id,
                product_id = command.product_id,
                "acknowledged success for a missing product"
            );
            let c = self
                .ledger
                .transition(
                    command.id,
                    CommandStatus::Pending,
                    CommandStatus::ProductMissing,
                    AckEffects::none(),
                )
                .await?;
            return Ok(AckReceipt::Processed(c.status));
        };

        if product.stock == 0 {
            return self.record_stock_error(command).await;
        }

        match self
            .ledger
            .transition(
                command.id,
                CommandStatus::Pending,
                CommandStatus::AcknowledgedSuccess,
                AckEffects::vend(product.id, product.price),
            )
            .await
        {
            Ok(c) => Ok(AckReceipt::Processed(c.status)),
            // The slot emptied between our read and the commit; record the
            // anomaly instead of going negative.
            Err(VendError::OutOfStock { .. }) => self.record_stock_error(command).await,
            Err(e) => Err(e),
        }
    }

    async fn record_stock_error(&self, command: &VendCommand) -> Result<AckReceipt> {
        warn!(
            command_id = command.id,
            product_id = command.product_id,
            "acknowledged success with empty slot"
        );
        let c = self
            .ledger
            .transition(
                command.id,
                CommandStatus::Pending,
                CommandStatus::StockError,
                AckEffects::none(),
            )
            .await?;
        Ok(AckReceipt::Processed(c.status))
    }

    /// Releases the newest gated command for the machine into the
    /// dispatchable set. Late or duplicate signals find nothing and report
    /// [`VendError::NothingAwaitingPayment`].
    pub async fn confirm_payment(&self, machine_id: &str) -> Result<VendCommand> {
        let command = self
            .ledger
            .latest_awaiting_payment(machine_id)
            .await?
            .ok_or_else(|| VendError::NothingAwaitingPayment(machine_id.to_string()))?;
        let command = self
            .ledger
            .transition(
                command.id,
                CommandStatus::AwaitingPayment,
                CommandStatus::Pending,
                AckEffects::none(),
            )
            .await?;
        info!(command_id = command.id, machine_id, "payment confirmed");
        Ok(command)
    }

    /// Expires every in-flight command created before `cutoff`.
    ///
    /// Pure ledger logic; any scheduler may drive it. Commands that reach a
    /// terminal state concurrently are skipped, so repeated sweeps are
    /// harmless. Returns the ids that were expired.
    pub async fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<u64>> {
        let mut expired = Vec::new();
        for command in self.ledger.in_flight_before(cutoff).await? {
            match self
                .ledger
                .transition(
                    command.id,
                    command.status,
                    CommandStatus::Expired,
                    AckEffects::none(),
                )
                .await
            {
                Ok(_) => {
                    info!(command_id = command.id, "command expired");
                    expired.push(command.id);
                }
                Err(VendError::StaleTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }
}
