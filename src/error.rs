use thiserror::Error;

use crate::domain::command::CommandStatus;

pub type Result<T> = std::result::Result<T, VendError>;

#[derive(Error, Debug)]
pub enum VendError {
    #[error("command {0} not found")]
    CommandNotFound(u64),
    #[error("product {0} not found")]
    ProductNotFound(u32),
    #[error("no command awaiting payment for machine '{0}'")]
    NothingAwaitingPayment(String),
    #[error("product {product_id} does not belong to machine '{machine_id}'")]
    InvalidProduct { product_id: u32, machine_id: String },
    #[error("product {product_id} is out of stock")]
    OutOfStock { product_id: u32 },
    #[error(
        "command {command_id} belongs to machine '{expected}', reported by '{reported}'"
    )]
    MachineMismatch {
        command_id: u64,
        expected: String,
        reported: String,
    },
    #[error("command {command_id} is {actual}, expected {expected}")]
    StaleTransition {
        command_id: u64,
        expected: CommandStatus,
        actual: CommandStatus,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("duplicate slot: motor {motor_id} already assigned on machine '{machine_id}'")]
    DuplicateSlot { machine_id: String, motor_id: u32 },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl VendError {
    /// Stable wire code for boundary responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CommandNotFound(_)
            | Self::ProductNotFound(_)
            | Self::NothingAwaitingPayment(_) => "not_found",
            Self::InvalidProduct { .. } => "invalid_product",
            Self::OutOfStock { .. } => "out_of_stock",
            Self::MachineMismatch { .. } => "machine_mismatch",
            Self::StaleTransition { .. } => "conflict",
            Self::InvalidInput(_) | Self::DuplicateSlot { .. } => "invalid_input",
            Self::Unauthorized => "unauthorized",
            Self::Csv(_) | Self::Io(_) | Self::Storage(_) => "storage",
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for VendError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for VendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(format!("serialization error: {e}"))
    }
}
