use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::VendError;

/// Lifecycle state of a vend command.
///
/// `AwaitingPayment` and `Pending` are the in-flight states; everything else
/// is terminal. Only `Pending` commands are visible to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Held back until an external payment confirmation names the machine.
    AwaitingPayment,
    /// Dispatchable; returned by polls until acknowledged.
    Pending,
    AcknowledgedSuccess,
    AcknowledgedFailure,
    /// Replaced by a newer purchase request before dispatch.
    Superseded,
    /// Actuator reported success but the slot was already empty.
    StockError,
    /// Actuator reported success but the product row was gone.
    ProductMissing,
    /// Aged out of the in-flight set by the stale sweep.
    Expired,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        !self.is_in_flight()
    }

    /// In-flight states count against the one-command-per-machine limit.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::AwaitingPayment | Self::Pending)
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingPayment => "awaiting_payment",
            Self::Pending => "pending",
            Self::AcknowledgedSuccess => "acknowledged_success",
            Self::AcknowledgedFailure => "acknowledged_failure",
            Self::Superseded => "superseded",
            Self::StockError => "stock_error",
            Self::ProductMissing => "product_missing",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Outcome reported by the actuator for one dispensing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckOutcome {
    Success,
    Failure,
}

impl FromStr for AckOutcome {
    type Err = VendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(VendError::InvalidInput(format!(
                "invalid outcome '{other}', expected 'success' or 'failure'"
            ))),
        }
    }
}

/// One instructed dispense action and its lifecycle.
///
/// Ids are monotonic and assigned by the ledger at creation; together with
/// `created_at` they define dispatch priority (oldest first, lower id breaks
/// ties).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendCommand {
    pub id: u64,
    /// Machine this command should run on.
    pub machine_id: String,
    pub product_id: u32,
    /// Motor to activate.
    pub motor_id: u32,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}
