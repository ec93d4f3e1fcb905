use serde::{Deserialize, Serialize};

use crate::application::engine::VendEngine;
use crate::domain::command::AckOutcome;
use crate::error::{Result, VendError};

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub machine_id: String,
    pub product_id: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseResponse {
    pub command_id: u64,
    pub status: String,
}

/// Poll response in the shape the firmware expects: both fields null when
/// there is nothing to do.
#[derive(Debug, Clone, Serialize)]
pub struct NextCommandResponse {
    pub motor_id: Option<u32>,
    pub command_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcknowledgeRequest {
    pub command_id: u64,
    pub machine_id: String,
    pub motor_id: u32,
    /// Free-form on the wire; parsed into [`AckOutcome`], anything else is
    /// rejected as invalid input.
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcknowledgeResponse {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub machine_id: String,
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmPaymentResponse {
    pub command_id: u64,
}

/// Error body for any failed boundary call.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub error: String,
}

impl From<&VendError> for ErrorResponse {
    fn from(e: &VendError) -> Self {
        Self {
            code: e.code(),
            error: e.to_string(),
        }
    }
}

/// Transport-agnostic facade over the engine.
///
/// Owns the payment-gate secret so the ledger is never touched by an
/// unauthenticated confirmation signal.
pub struct Api {
    engine: VendEngine,
    gate_secret: Option<String>,
}

impl Api {
    pub fn new(engine: VendEngine, gate_secret: Option<String>) -> Self {
        Self {
            engine,
            gate_secret,
        }
    }

    pub fn engine(&self) -> &VendEngine {
        &self.engine
    }

    pub async fn create_purchase(&self, req: PurchaseRequest) -> Result<PurchaseResponse> {
        let command = self
            .engine
            .create_purchase(&req.machine_id, req.product_id)
            .await?;
        Ok(PurchaseResponse {
            command_id: command.id,
            status: command.status.to_string(),
        })
    }

    pub async fn next_command(&self, machine_id: &str) -> Result<NextCommandResponse> {
        let dispatch = self.engine.next_command(machine_id).await?;
        Ok(NextCommandResponse {
            motor_id: dispatch.map(|d| d.motor_id),
            command_id: dispatch.map(|d| d.command_id),
        })
    }

    pub async fn acknowledge(&self, req: AcknowledgeRequest) -> Result<AcknowledgeResponse> {
        let outcome: AckOutcome = req.status.parse()?;
        let receipt = self
            .engine
            .acknowledge(req.command_id, &req.machine_id, req.motor_id, outcome)
            .await?;
        let message = match receipt {
            crate::application::engine::AckReceipt::Processed(status) => {
                format!("acknowledgment received, command is {status}")
            }
            crate::application::engine::AckReceipt::AlreadyProcessed(status) => {
                format!("command already in status {status}")
            }
        };
        Ok(AcknowledgeResponse { message })
    }

    pub async fn confirm_payment(
        &self,
        req: ConfirmPaymentRequest,
    ) -> Result<ConfirmPaymentResponse> {
        match (&self.gate_secret, &req.secret) {
            (Some(expected), Some(presented)) if expected == presented => {}
            (None, _) => return Err(VendError::Unauthorized),
            _ => return Err(VendError::Unauthorized),
        }
        let command = self.engine.confirm_payment(&req.machine_id).await?;
        Ok(ConfirmPaymentResponse {
            command_id: command.id,
        })
    }
}
