//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only (validation, stock rules, conflicts).
/// Persistence failures are modelled by the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (missing field, negative threshold, wrong delta sign).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Duplicate identity or an illegal state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Reference to a missing product, movement, recipe or batch.
    #[error("not found: {0}")]
    NotFound(String),

    /// A consumption or sale asked for more than is on hand.
    #[error("insufficient stock for {product}: requested {requested}, on hand {on_hand}")]
    InsufficientStock {
        product: String,
        requested: i64,
        on_hand: i64,
    },

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn insufficient_stock(product: impl Into<String>, requested: i64, on_hand: i64) -> Self {
        Self::InsufficientStock {
            product: product.into(),
            requested,
            on_hand,
        }
    }
}
