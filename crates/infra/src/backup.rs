//! Point-in-time copies of the database file.

use std::path::Path;

use tracing::{info, instrument};

use crate::error::{InventoryError, InventoryResult, map_sqlx_error};
use crate::store::Store;

impl<B> Store<B> {
    /// Write a consistent snapshot of the whole database to `target`.
    ///
    /// Holds the write lock for the duration so no mutation straddles the
    /// copy. Refuses to overwrite an existing file.
    #[instrument(skip(self), fields(operation = "backup_to"), err)]
    pub async fn backup_to(&self, target: &Path) -> InventoryResult<()> {
        let _guard = self.write_lock.lock().await;
        if target.exists() {
            return Err(InventoryError::conflict(format!(
                "backup target {} already exists",
                target.display()
            )));
        }
        let path = target.to_str().ok_or_else(|| {
            InventoryError::validation(format!("backup path {} is not valid UTF-8", target.display()))
        })?;

        sqlx::query("VACUUM INTO ?")
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("backup_to", e))?;

        info!(target = %target.display(), "database backed up");
        Ok(())
    }
}
