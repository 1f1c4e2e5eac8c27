use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, MovementId, ProductId};

/// Why stock changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Goods arrived from a supplier.
    Receipt,
    /// Raw material used up by a production batch.
    ProductionConsumption,
    /// Finished goods produced by a batch.
    ProductionOutput,
    Sale,
    /// Manual correction (stocktake, spoilage, found stock).
    Adjustment,
}

impl MovementKind {
    pub const ALL: [MovementKind; 5] = [
        MovementKind::Receipt,
        MovementKind::ProductionConsumption,
        MovementKind::ProductionOutput,
        MovementKind::Sale,
        MovementKind::Adjustment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Receipt => "receipt",
            MovementKind::ProductionConsumption => "production_consumption",
            MovementKind::ProductionOutput => "production_output",
            MovementKind::Sale => "sale",
            MovementKind::Adjustment => "adjustment",
        }
    }

    /// Sign rule for original (non-compensating) movements.
    ///
    /// Zero is never a movement. Receipts and production output add stock,
    /// consumption and sales remove it, adjustments go either way.
    pub fn check_delta(&self, delta: i64) -> DomainResult<()> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        let ok = match self {
            MovementKind::Receipt | MovementKind::ProductionOutput => delta > 0,
            MovementKind::ProductionConsumption | MovementKind::Sale => delta < 0,
            MovementKind::Adjustment => true,
        };
        if !ok {
            let expected = if delta > 0 { "negative" } else { "positive" };
            return Err(DomainError::validation(format!(
                "{} delta must be {expected}, got {delta}",
                self.as_str()
            )));
        }
        Ok(())
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown movement kind '{s}'")))
    }
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    /// Store-assigned, strictly increasing insertion order.
    pub sequence: i64,
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
    /// The movement this one compensates, if any.
    pub reverses: Option<MovementId>,
    pub note: Option<String>,
}

impl MovementRecord {
    pub fn is_compensation(&self) -> bool {
        self.reverses.is_some()
    }
}

/// Request to record an original movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
    /// Expiry of the lot a positive movement creates. Ignored for negative deltas.
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewMovement {
    pub fn new(product_id: ProductId, kind: MovementKind, delta: i64, occurred_at: DateTime<Utc>) -> Self {
        Self {
            product_id,
            kind,
            delta,
            occurred_at,
            note: None,
            expires_at: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}
