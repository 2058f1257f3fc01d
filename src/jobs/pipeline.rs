//! The per-album pipeline: classify, enrich, decide, move.
//!
//! Stages run strictly in order. The job's cancel flag is checked before each
//! stage and never inside one, so a cancelled album never leaves a half
//! finished move behind.

use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Job, JobId, JobStatus};
use crate::classifier::classify;
use crate::db::albums::{self, NewAlbum};
use crate::decision::{DecisionEngine, DecisionInput, select_record};
use crate::enrichment::{EnrichmentClient, EnrichmentError, ReleaseQuery};
use crate::error::AlbumError;
use crate::metadata::MetadataReader;
use crate::model::{AlbumDirectory, MetadataRecord, QualityClass, RuleTrace, format_trace};
use crate::organizer::{MoveExecutor, MoveOutcome, PlannedMove};
use crate::scanner::{ScanError, directory_content_hash, scan_album};

/// Pipeline stage, as reported when a job is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Classify,
    Enrich,
    Decide,
    Move,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Classify => "classify",
            Self::Enrich => "enrich",
            Self::Decide => "decide",
            Self::Move => "move",
        };
        f.write_str(name)
    }
}

/// Everything a worker needs to process albums of one batch.
pub struct PipelineContext {
    pub pool: SqlitePool,
    /// Journal batch id
    pub batch_id: String,
    pub reader: Arc<dyn MetadataReader>,
    /// `None` when enrichment is disabled for this batch
    pub enrichment: Option<EnrichmentClient>,
    pub engine: DecisionEngine,
    pub executor: MoveExecutor,
    pub confidence_threshold: f32,
    pub dry_run: bool,
    pub incremental: bool,
}

/// How an album job ended, when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum AlbumOutcome {
    Organized {
        destination: PathBuf,
        /// Organization mode, or `unsorted`
        mode: String,
        rule_trace: String,
        files: usize,
    },
    /// Dry run: what would have been moved
    Planned {
        destination: PathBuf,
        mode: String,
        rule_trace: String,
        planned: Vec<PlannedMove>,
    },
    /// Same directory with the same content was processed before
    AlreadyProcessed,
    SkippedDuplicate {
        existing: PathBuf,
        rule_trace: String,
    },
    Cancelled {
        /// The stage that did not run
        stage: Stage,
    },
}

/// Result of one album job.
#[derive(Debug)]
pub struct AlbumReport {
    pub job_id: JobId,
    pub album: PathBuf,
    pub result: Result<AlbumOutcome, AlbumError>,
    pub warnings: Vec<String>,
}

impl AlbumReport {
    pub fn status(&self) -> JobStatus {
        match &self.result {
            Ok(AlbumOutcome::Cancelled { .. }) => JobStatus::Cancelled,
            Ok(AlbumOutcome::AlreadyProcessed | AlbumOutcome::SkippedDuplicate { .. }) => JobStatus::Skipped,
            Ok(_) => JobStatus::Completed,
            Err(AlbumError::Scan(_)) => JobStatus::Skipped,
            Err(_) => JobStatus::Failed,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.result.as_ref().is_err_and(AlbumError::is_fatal)
    }

    pub fn cancelled(job: &Job, stage: Stage) -> Self {
        Self {
            job_id: job.id,
            album: job.album_directory.clone(),
            result: Ok(AlbumOutcome::Cancelled { stage }),
            warnings: Vec::new(),
        }
    }
}

/// Run one album through the pipeline. Never panics on album errors; they
/// are returned in the report.
pub async fn process_album(ctx: &PipelineContext, job: &Job) -> AlbumReport {
    let mut warnings = Vec::new();
    let result = run_stages(ctx, job, &mut warnings).await;

    match &result {
        Ok(outcome) => tracing::debug!(
            target: "jobs::pipeline",
            job_id = %job.id,
            album = %job.album_directory.display(),
            ?outcome,
            "Album finished"
        ),
        Err(e) => tracing::warn!(
            target: "jobs::pipeline",
            job_id = %job.id,
            album = %job.album_directory.display(),
            error = %e,
            kind = e.kind(),
            "Album failed"
        ),
    }

    AlbumReport {
        job_id: job.id,
        album: job.album_directory.clone(),
        result,
        warnings,
    }
}

async fn run_stages(
    ctx: &PipelineContext,
    job: &Job,
    warnings: &mut Vec<String>,
) -> Result<AlbumOutcome, AlbumError> {
    let cancelled = |stage| job.cancel.is_cancelled().then_some(AlbumOutcome::Cancelled { stage });

    if let Some(outcome) = cancelled(Stage::Classify) {
        return Ok(outcome);
    }

    let path = job.album_directory.clone();
    let (album, content_hash) = blocking(&job.album_directory, move || {
        let album = scan_album(&path)?;
        let hash = directory_content_hash(&album).map_err(|source| ScanError::Unreadable {
            path: path.clone(),
            source,
        })?;
        Ok::<_, ScanError>((album, hash))
    })
    .await?;

    if ctx.incremental && albums::is_processed(&ctx.pool, &album.path, &content_hash).await? {
        tracing::debug!(target: "jobs::pipeline", album = %album.path.display(), "Already processed, skipping");
        return Ok(AlbumOutcome::AlreadyProcessed);
    }

    let reader = ctx.reader.clone();
    let listing = album.clone();
    let tags = blocking(&album.path, move || Ok::<_, AlbumError>(reader.read_album(&listing))).await?;
    let album_name = album.name();

    let (album, quality, record, routing) = match classify(&album, tags) {
        Ok(classification) => {
            for path in &classification.unreadable {
                warnings.push(format!("Unreadable tags: {}", path.display()));
            }

            if let Some(outcome) = cancelled(Stage::Enrich) {
                return Ok(outcome);
            }
            let enriched = enrich(ctx, &classification.local, warnings).await;
            let record = select_record(&classification.local, enriched, ctx.confidence_threshold);

            if let Some(outcome) = cancelled(Stage::Decide) {
                return Ok(outcome);
            }
            let counts = albums::counts_for(&ctx.pool, &record).await?;
            let routing = ctx.engine.decide(&DecisionInput {
                album_name: &album_name,
                quality: classification.quality,
                record: &record,
                counts,
            });
            (classification.album, classification.quality, Some(record), routing)
        }
        Err(e) => {
            tracing::info!(target: "jobs::pipeline", album = %album.path.display(), error = %e, "Routing to unsorted");
            let quality = album.quality().unwrap_or(QualityClass::Lossy);
            let routing = ctx.engine.unsorted(&album_name, &e, RuleTrace::new());
            (album, quality, None, routing)
        }
    };

    if let crate::decision::Routing::Unsorted { reason, .. } = &routing {
        warnings.push(format!("Routed to unsorted: {reason}"));
    }

    if let Some(outcome) = cancelled(Stage::Move) {
        return Ok(outcome);
    }
    let outcome = ctx
        .executor
        .execute(&ctx.batch_id, &album, quality, routing.destination_path(), ctx.dry_run)
        .await?;

    let mut trace = routing.rule_trace().clone();
    if let Some(note) = outcome.trace_note() {
        trace.push(note);
    }
    let rule_trace = format_trace(&trace);
    let mode = routing.mode_name().to_string();

    match outcome {
        MoveOutcome::SkippedDuplicate { existing } => Ok(AlbumOutcome::SkippedDuplicate { existing, rule_trace }),
        MoveOutcome::DryRun { planned, destination } => Ok(AlbumOutcome::Planned {
            destination,
            mode,
            rule_trace,
            planned,
        }),
        MoveOutcome::Moved {
            operations,
            destination,
            ..
        } => {
            record_outcome(ctx, &album, quality, record.as_ref(), &routing, &destination, &rule_trace, &content_hash)
                .await?;
            Ok(AlbumOutcome::Organized {
                destination,
                mode,
                rule_trace,
                files: operations.len(),
            })
        }
    }
}

/// Store the album and its processed markers. Unsorted albums only get the
/// marker; they do not count towards any release counter.
#[allow(clippy::too_many_arguments)]
async fn record_outcome(
    ctx: &PipelineContext,
    album: &AlbumDirectory,
    quality: QualityClass,
    record: Option<&MetadataRecord>,
    routing: &crate::decision::Routing,
    destination: &Path,
    rule_trace: &str,
    content_hash: &str,
) -> sqlx::Result<()> {
    match (routing.mode(), record) {
        (Some(mode), Some(record)) => {
            albums::record_album(
                &ctx.pool,
                &NewAlbum {
                    batch_id: &ctx.batch_id,
                    source_path: &album.path,
                    destination_path: destination,
                    record,
                    quality,
                    mode,
                    rule_trace: rule_trace.to_string(),
                    content_hash,
                },
            )
            .await?;
        }
        _ => {
            albums::mark_processed(&ctx.pool, &album.path, content_hash, Some(destination), Some(&ctx.batch_id))
                .await?;
        }
    }
    Ok(())
}

async fn enrich(ctx: &PipelineContext, local: &MetadataRecord, warnings: &mut Vec<String>) -> Option<MetadataRecord> {
    let client = ctx.enrichment.as_ref()?;
    let query = ReleaseQuery::from_record(local)?;
    match client.enrich(&query).await {
        Ok(record) => Some(record),
        Err(EnrichmentError::NoMatch) => None,
        Err(e) => {
            warnings.push(format!("Enrichment failed: {e}"));
            None
        }
    }
}

/// Run blocking filesystem work off the async workers.
async fn blocking<T, E, F>(album: &Path, f: F) -> Result<T, AlbumError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<AlbumError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(Into::into),
        Err(e) => Err(AlbumError::Worker {
            album: album.to_path_buf(),
            message: e.to_string(),
        }),
    }
}
