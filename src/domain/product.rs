use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::VendError;

/// A positive monetary amount.
///
/// Wrapper around `rust_decimal::Decimal` so that prices and paid amounts
/// can never be zero or negative.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    pub fn new(value: Decimal) -> Result<Self, VendError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(VendError::InvalidInput(
                "price must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Price {
    type Error = VendError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One product slot inside a machine.
///
/// A product is bound to the motor that dispenses it; `(machine_id, motor_id)`
/// is unique across the inventory. Stock is only ever mutated through
/// acknowledgment side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u32,
    /// Machine this slot belongs to.
    pub machine_id: String,
    /// Motor index within the machine.
    pub motor_id: u32,
    pub name: String,
    pub price: Price,
    /// Units remaining in this slot.
    pub stock: u32,
    pub description: Option<String>,
}

impl Product {
    pub fn new(
        id: u32,
        machine_id: impl Into<String>,
        motor_id: u32,
        name: impl Into<String>,
        price: Price,
        stock: u32,
    ) -> Self {
        Self {
            id,
            machine_id: machine_id.into(),
            motor_id,
            name: name.into(),
            price,
            stock,
            description: None,
        }
    }
}
