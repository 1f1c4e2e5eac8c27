//! Store-level error taxonomy.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `InventoryError` as follows:
//!
//! | SQLx error | `ErrorKind` | InventoryError | Scenario |
//! |------------|-------------|----------------|----------|
//! | Database | `UniqueViolation` | `Conflict` | duplicate SKU, batch number, second reversal |
//! | Database | `ForeignKeyViolation` | `NotFound` | reference to a missing product or movement |
//! | Database | `CheckViolation` | `Validation` | a CHECK constraint rejected the row |
//! | Database | other | `Store` | trigger abort, busy database, ... |
//! | anything else | n/a | `Store` | pool closed, IO, decode failures |

use sqlx::error::ErrorKind;
use thiserror::Error;

use stockroom_core::DomainError;

pub type InventoryResult<T> = Result<T, InventoryError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient stock for {product}: requested {requested}, on hand {on_hand}")]
    InsufficientStock {
        product: String,
        requested: i64,
        on_hand: i64,
    },

    /// Persistence failure; the operation left no trace.
    #[error("store error in {operation}: {message}")]
    Store { operation: String, message: String },
}

impl InventoryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl From<DomainError> for InventoryError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => Self::Validation(msg),
            DomainError::Conflict(msg) => Self::Conflict(msg),
            DomainError::NotFound(msg) => Self::NotFound(msg),
            DomainError::InsufficientStock {
                product,
                requested,
                on_hand,
            } => Self::InsufficientStock {
                product,
                requested,
                on_hand,
            },
            DomainError::InvalidId(msg) => Self::Validation(msg),
        }
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> InventoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.kind() {
                ErrorKind::UniqueViolation => InventoryError::Conflict(msg),
                ErrorKind::ForeignKeyViolation => InventoryError::NotFound(msg),
                ErrorKind::CheckViolation | ErrorKind::NotNullViolation => InventoryError::Validation(msg),
                _ => InventoryError::store(operation, db_err.message()),
            }
        }
        sqlx::Error::PoolClosed => InventoryError::store(operation, "connection pool closed"),
        other => InventoryError::store(operation, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_category() {
        let err: InventoryError = DomainError::insufficient_stock("matcha-powder-1kg", 5, 3).into();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                product: "matcha-powder-1kg".into(),
                requested: 5,
                on_hand: 3,
            }
        );

        let err: InventoryError = DomainError::invalid_id("ProductId: bad").into();
        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[test]
    fn non_database_errors_become_store_errors() {
        let err = map_sqlx_error("get_product", sqlx::Error::PoolClosed);
        assert_eq!(err, InventoryError::store("get_product", "connection pool closed"));
        assert_eq!(err.to_string(), "store error in get_product: connection pool closed");
    }
}
