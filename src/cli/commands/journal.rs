//! Journal listing command.

use std::path::Path;
use tokio::runtime::Runtime;

use super::open_db;
use crate::config::Config;
use crate::db::journal;

/// Without `--batch`, one line per batch; with it, every operation.
pub fn cmd_journal(rt: &Runtime, config: &Config, batch: Option<&str>, db: Option<&Path>) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_db(config, db).await?;

        let Some(batch) = batch else {
            let batches = journal::batch_summaries(&pool).await?;
            if batches.is_empty() {
                println!("Journal is empty.");
                return Ok(());
            }
            println!(
                "{:<38} {:<27} {:>9} {:>6} {:>8} {:>7}",
                "BATCH", "STARTED", "COMPLETED", "FAILED", "ROLLBACK", "PENDING"
            );
            for b in batches {
                println!(
                    "{:<38} {:<27} {:>9} {:>6} {:>8} {:>7}",
                    b.batch_id, b.started_at, b.completed, b.failed, b.rolled_back, b.pending
                );
            }
            return Ok(());
        };

        let operations = journal::list_operations(&pool, Some(batch)).await?;
        if operations.is_empty() {
            anyhow::bail!("No operations recorded for batch {batch}");
        }
        for op in operations {
            println!(
                "#{:<6} {:<11} {} -> {}",
                op.operation_id,
                op.status.as_str(),
                op.source_path.display(),
                op.dest_path.display()
            );
            if let Some(original) = op.rolls_back {
                println!("        undoes #{original}");
            }
            if let Some(message) = op.message {
                println!("        {message}");
            }
        }
        Ok(())
    })
}
