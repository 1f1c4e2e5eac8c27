//! Low-stock alerting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::ProductId;
use stockroom_events::Event;

/// True when a movement takes on-hand from above `threshold` to at or below it.
///
/// Edge-triggered: staying low, or starting low and going lower, does not
/// cross again.
pub fn crosses_into_low(before: i64, after: i64, threshold: i64) -> bool {
    before > threshold && after <= threshold
}

/// Event: a product's on-hand just dropped to its reorder threshold or below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRaised {
    pub product_id: ProductId,
    pub sku: String,
    pub on_hand: i64,
    pub threshold: i64,
    pub reorder_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

impl Event for AlertRaised {
    fn event_type(&self) -> &'static str {
        "inventory.stock.alert_raised"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl core::fmt::Display for AlertRaised {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "low stock: {} has {} on hand (threshold {}, reorder {})",
            self.sku, self.on_hand, self.threshold, self.reorder_quantity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_is_edge_triggered() {
        assert!(crosses_into_low(20, 3, 5));
        assert!(crosses_into_low(6, 5, 5));
        assert!(!crosses_into_low(5, 4, 5));
        assert!(!crosses_into_low(3, 10, 5));
        assert!(!crosses_into_low(10, 6, 5));
    }
}
