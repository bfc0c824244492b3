//! Table import over a transactional statement executor
//!
//! MySQL commits `CREATE TABLE` implicitly, so rolling back the transaction
//! only undoes the data. A table the import created itself is dropped again
//! when any later statement fails.

use crate::error::{AdminError, Result};
use async_trait::async_trait;
use dbadmin_types::TableBackup;
use tracing::{info, warn};

/// Connection-level operations an import needs
#[async_trait]
pub trait ImportTarget: Send {
    async fn table_exists(&mut self, name: &str) -> Result<bool>;
    async fn begin(&mut self) -> Result<()>;
    async fn execute(&mut self, statement: &str) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;
    /// Drop outside the transaction
    async fn drop_table(&mut self, name: &str) -> Result<()>;
}

/// Replay a backup: structure first, then every non-blank data line.
/// Returns the number of data statements applied.
pub async fn import_backup<T>(target: &mut T, backup: &TableBackup) -> Result<usize>
where
    T: ImportTarget + ?Sized,
{
    if backup.name.trim().is_empty() || backup.structure.trim().is_empty() {
        return Err(AdminError::invalid("backup name and structure are required"));
    }

    let existed = target.table_exists(&backup.name).await?;
    target.begin().await?;

    match replay(target, backup).await {
        Ok(count) => {
            target.commit().await?;
            info!("Imported table {} ({} statements)", backup.name, count);
            Ok(count)
        }
        Err(e) => {
            if let Err(rollback) = target.rollback().await {
                warn!("Rollback of import {} failed: {}", backup.name, rollback);
            }
            if !existed {
                if let Err(drop) = target.drop_table(&backup.name).await {
                    warn!("Cleanup of failed import {} failed: {}", backup.name, drop);
                }
            }
            Err(e)
        }
    }
}

async fn replay<T>(target: &mut T, backup: &TableBackup) -> Result<usize>
where
    T: ImportTarget + ?Sized,
{
    target.execute(&backup.structure).await?;

    let mut count = 0;
    for statement in backup.statements() {
        target.execute(statement).await?;
        count += 1;
    }
    Ok(count)
}
