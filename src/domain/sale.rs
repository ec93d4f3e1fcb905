use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::product::Price;

/// Append-only audit row for one confirmed vend.
///
/// Written exactly once, inside the same transaction as the success
/// transition and the stock decrement. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: u64,
    pub product_id: u32,
    pub quantity: u32,
    pub amount_paid: Price,
    pub timestamp: DateTime<Utc>,
}
