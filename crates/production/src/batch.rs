use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{BatchId, DomainError, DomainResult, Entity, MovementId, ProductId};

/// Batch lifecycle: produced batches are `Ready` until shipped or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Ready,
    Shipped,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Ready => "ready",
            BatchStatus::Shipped => "shipped",
            BatchStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(BatchStatus::Ready),
            "shipped" => Ok(BatchStatus::Shipped),
            "cancelled" => Ok(BatchStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown batch status '{other}'"))),
        }
    }
}

/// Request to produce a batch of a finished good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceBatch {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Caller-chosen batch number; the next free number is used when absent.
    pub batch_number: Option<i64>,
    /// Draw the recipe's materials from stock.
    pub consume_materials: bool,
    pub notes: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl ProduceBatch {
    pub fn new(product_id: ProductId, quantity: i64, completed_at: DateTime<Utc>) -> Self {
        Self {
            product_id,
            quantity,
            batch_number: None,
            consume_materials: true,
            notes: None,
            completed_at,
        }
    }

    pub fn with_batch_number(mut self, number: i64) -> Self {
        self.batch_number = Some(number);
        self
    }

    pub fn without_consumption(mut self) -> Self {
        self.consume_materials = false;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("batch quantity must be positive"));
        }
        if matches!(self.batch_number, Some(n) if n <= 0) {
            return Err(DomainError::validation("batch number must be positive"));
        }
        Ok(())
    }
}

/// A produced batch and the movements that back it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionBatch {
    pub id: BatchId,
    pub batch_number: i64,
    pub product_id: ProductId,
    pub quantity: i64,
    pub status: BatchStatus,
    pub notes: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// The `production_output` movement that put the goods on hand.
    pub output_movement: MovementId,
    /// The sale (on ship) or the output reversal (on cancel).
    pub closing_movement: Option<MovementId>,
    /// Raw-material consumption movements, empty when nothing was drawn.
    pub consumptions: Vec<MovementId>,
}

impl ProductionBatch {
    pub fn is_ready(&self) -> bool {
        self.status == BatchStatus::Ready
    }

    fn ensure_ready(&self, action: &str) -> DomainResult<()> {
        if !self.is_ready() {
            return Err(DomainError::conflict(format!(
                "batch {} is {} and cannot be {action}",
                self.batch_number, self.status
            )));
        }
        Ok(())
    }

    /// Check a ship is allowed without changing anything.
    pub fn check_ship(&self) -> DomainResult<()> {
        self.ensure_ready("shipped")
    }

    pub fn check_cancel(&self) -> DomainResult<()> {
        self.ensure_ready("cancelled")
    }

    pub fn ship(&mut self, sale: MovementId, at: DateTime<Utc>) -> DomainResult<()> {
        self.check_ship()?;
        self.status = BatchStatus::Shipped;
        self.shipped_at = Some(at);
        self.closing_movement = Some(sale);
        Ok(())
    }

    pub fn cancel(&mut self, output_reversal: MovementId, at: DateTime<Utc>) -> DomainResult<()> {
        self.check_cancel()?;
        self.status = BatchStatus::Cancelled;
        self.cancelled_at = Some(at);
        self.closing_movement = Some(output_reversal);
        Ok(())
    }
}

impl Entity for ProductionBatch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
