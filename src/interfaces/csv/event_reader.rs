use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

use crate::error::{Result, VendError};

/// One row of a replay script.
#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Load a product slot: `stock, machine, product, motor, price, count`.
    Stock,
    /// Purchase request: `purchase, machine, product`.
    Purchase,
    /// Actuator poll: `poll, machine`.
    Poll,
    /// Outcome report: `ack, machine, , motor, , , command, outcome`.
    Ack,
    /// Payment confirmation: `confirm, machine`.
    Confirm,
}

/// A replay event. Unused columns stay empty, as in
///
/// ```csv
/// event, machine, product, motor, price, count, command, outcome
/// stock, v1, 1, 3, 2.50, 5,,
/// purchase, v1, 1,,,,,
/// poll, v1,,,,,,
/// ack, v1,, 3,,, 1, success
/// ```
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct EventRecord {
    pub event: EventType,
    pub machine: String,
    pub product: Option<u32>,
    pub motor: Option<u32>,
    pub price: Option<Decimal>,
    pub count: Option<u32>,
    pub command: Option<u64>,
    pub outcome: Option<String>,
}

/// Streams replay events from any `Read` source, trimming whitespace and
/// tolerating short rows.
pub struct EventReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EventReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn events(self) -> impl Iterator<Item = Result<EventRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(VendError::from))
    }
}
