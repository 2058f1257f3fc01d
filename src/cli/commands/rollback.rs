//! Rollback command.

use std::path::Path;
use tokio::runtime::Runtime;

use super::open_db;
use crate::config::Config;
use crate::organizer::{RollbackTarget, rollback};

/// Undo a batch (newest move first) or a single operation.
pub fn cmd_rollback(
    rt: &Runtime,
    config: &Config,
    batch: Option<&str>,
    operation: Option<i64>,
    db: Option<&Path>,
) -> anyhow::Result<()> {
    let target = match (batch, operation) {
        (Some(batch), _) => RollbackTarget::Batch(batch.to_string()),
        (None, Some(id)) => RollbackTarget::Operation(id),
        (None, None) => anyhow::bail!("Pass --batch or --operation"),
    };

    rt.block_on(async {
        let pool = open_db(config, db).await?;
        let library_root = config.library.destination.as_deref();

        let report = rollback(&pool, &target, library_root).await?;
        for outcome in &report.outcomes {
            println!(
                "RESTORED #{}: {} -> {}",
                outcome.operation_id,
                outcome.removed_path.display(),
                outcome.restored_path.display()
            );
        }
        println!("\n{} file(s) restored", report.outcomes.len());

        match report.error {
            Some(e) => anyhow::bail!("Rollback halted: {e}"),
            None => Ok(()),
        }
    })
}
