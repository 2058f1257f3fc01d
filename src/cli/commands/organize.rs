//! Album organization command.

use anyhow::Context;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::broadcast::error::RecvError;

use super::{OrganizeArgs, open_db};
use crate::config::Config;
use crate::jobs::{AlbumOutcome, BatchRunner, JobOptions, JobRegistry, JobRequest, JobStatus};
use crate::metadata::LoftyReader;

/// Organize every album under `--source`.
pub fn cmd_organize(rt: &Runtime, mut config: Config, args: &OrganizeArgs) -> anyhow::Result<()> {
    apply_overrides(&mut config, args);
    config.validate()?;

    let destination = args
        .destination
        .clone()
        .or_else(|| config.library.destination.clone())
        .context("No destination given (use --destination or set library.destination)")?;
    let dry_run = !args.move_files;

    rt.block_on(async {
        let pool = open_db(&config, args.db.as_deref()).await?;

        println!("Source:      {}", args.source.display());
        println!("Destination: {}", destination.display());
        if dry_run {
            println!("\n[DRY RUN MODE - No files will be moved; pass --move to organize]\n");
        }

        let request = JobRequest {
            source_directory: args.source.clone(),
            destination,
            options: JobOptions {
                dry_run,
                enrichment_enabled: config.enrichment.enabled,
                mode: args.mode,
                worker_count: Some(config.worker_count()),
                incremental: config.library.incremental,
            },
        };

        let history_size = config.workers.history_size;
        let registry = JobRegistry::new(BatchRunner::new(pool, config, Arc::new(LoftyReader)), history_size);
        let mut events = registry.subscribe();
        let batch_id = registry.submit(request);

        let canceller = registry.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling after the albums in progress...");
                canceller.cancel(batch_id);
            }
        });

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.job_id == batch_id => {
                        if event.status.is_terminal() {
                            break;
                        }
                        if event.total_items > 0 {
                            println!("[{}/{}]", event.processed_items, event.total_items);
                        }
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let report = registry.wait(batch_id).await?;

        for album in &report.albums {
            let path = album.album.display();
            match &album.result {
                Ok(AlbumOutcome::Organized { destination, mode, files, .. }) => {
                    println!("MOVED [{mode}]: {path} -> {} ({files} files)", destination.display());
                }
                Ok(AlbumOutcome::Planned { destination, mode, rule_trace, planned }) => {
                    println!("WOULD MOVE [{mode}]: {path} -> {} ({} files)", destination.display(), planned.len());
                    println!("    {rule_trace}");
                }
                Ok(AlbumOutcome::AlreadyProcessed) => println!("SKIPPED (already processed): {path}"),
                Ok(AlbumOutcome::SkippedDuplicate { existing, .. }) => {
                    println!("SKIPPED (duplicate of {}): {path}", existing.display());
                }
                Ok(AlbumOutcome::Cancelled { stage }) => println!("CANCELLED before {stage}: {path}"),
                Err(e) => eprintln!("ERROR {path}: {e}"),
            }
            for warning in &album.warnings {
                println!("    warning: {warning}");
            }
        }

        let summary = report.summary;
        println!(
            "\nCompleted: {} organized, {} failed, {} skipped, {} cancelled",
            summary.succeeded, summary.failed, summary.skipped, summary.cancelled
        );
        if !dry_run && summary.succeeded > 0 {
            println!("Batch {batch_id}; undo with: album-organizer rollback --batch {batch_id}");
        }

        if report.event.status == JobStatus::Failed {
            anyhow::bail!("Batch aborted: {}", report.event.errors.last().map_or("", |e| e.message.as_str()));
        }
        Ok(())
    })
}

/// Command-line flags win over the config file.
fn apply_overrides(config: &mut Config, args: &OrganizeArgs) {
    if let Some(n) = args.parallel {
        config.workers.count = Some(n);
    }
    if args.enable_electronic {
        config.decision.electronic = true;
    }
    if args.discogs {
        config.enrichment.discogs_enabled = true;
    }
    if let Some(token) = &args.discogs_token {
        config.enrichment.discogs_token = Some(token.clone());
    }
    if args.no_enrich {
        config.enrichment.enabled = false;
    }
    if let Some(threshold) = args.confidence_threshold {
        config.enrichment.confidence_threshold = threshold;
    }
    if args.incremental {
        config.library.incremental = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn parse(args: &[&str]) -> OrganizeArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Organize(args) => args,
            _ => panic!("expected organize"),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&[
            "album-organizer",
            "organize",
            "--source",
            "/in",
            "--move",
            "--parallel",
            "3",
            "--enable-electronic",
            "--confidence-threshold",
            "0.9",
            "--mode",
            "label",
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args);

        assert!(args.move_files);
        assert_eq!(args.mode, Some(crate::model::OrganizationMode::Label));
        assert_eq!(config.workers.count, Some(3));
        assert!(config.decision.electronic);
        assert_eq!(config.enrichment.confidence_threshold, 0.9);
    }

    #[test]
    fn test_move_and_dry_run_conflict() {
        assert!(
            Cli::try_parse_from(["album-organizer", "organize", "--source", "/in", "--move", "--dry-run"]).is_err()
        );
    }
}
