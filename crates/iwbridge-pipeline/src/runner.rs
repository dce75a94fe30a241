//! Batch runner: drives every asset through parse, convert and commit

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use iwbridge_catalog::{AssetCatalog, CatalogEntry, CommitMode, CommitOutcome, SqliteCatalog};
use iwbridge_core::{AssetId, ContentHash, Error, ErrorKind, Result};
use iwbridge_export::{format_version, Converter};
use iwbridge_parsers::logging::{batch_span, instrument_parse, BatchProgress};
use iwbridge_parsers::{log_parse_complete, log_parse_error, ParseError, ParseOptions, SourceAsset};

use crate::config::{MismatchPolicy, TargetConfig};
use crate::control::{with_retry, CancellationToken, KeyedLocks};
use crate::discovery::{discover, DiscoveredSource, DiscoveryFailure};
use crate::events::{AssetState, NullSink, ProgressEvent, ProgressSink, SkipReason, TracingSink};
use crate::report::{AssetReport, BatchResult};

/// Summary written next to the artifacts when `write_report` is set
pub const REPORT_FILE: &str = "report.json";

/// Convert `paths` into the catalog described by `config`
///
/// Per-asset failures are reported in the result; only problems with the
/// batch itself (bad configuration, unopenable catalog) return `Err`.
pub fn convert_batch(paths: &[PathBuf], config: &TargetConfig) -> Result<BatchResult> {
    Pipeline::new(config.clone())?.run(paths)
}

/// [`convert_batch`] with a progress sink and a cancellation token
pub fn convert_batch_with(
    paths: &[PathBuf],
    config: &TargetConfig,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
) -> Result<BatchResult> {
    Pipeline::new(config.clone())?
        .with_sink(sink)
        .with_cancellation(cancel)
        .run(paths)
}

/// What to do with an asset after comparing it with the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    Skip(SkipReason),
    Convert(CommitMode),
}

/// Owns one batch's catalog, converter and worker settings
pub struct Pipeline {
    config: TargetConfig,
    catalog: Arc<dyn AssetCatalog>,
    converter: Converter,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    locks: KeyedLocks,
}

impl Pipeline {
    /// Open the SQLite catalog named by `config`
    pub fn new(config: TargetConfig) -> Result<Self> {
        config.validate()?;
        let catalog = SqliteCatalog::open(config.catalog_path(), config.output_dir.clone())?;
        Self::with_catalog(config, Arc::new(catalog))
    }

    pub fn with_catalog(config: TargetConfig, catalog: Arc<dyn AssetCatalog>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            converter: Converter::new(config.export_settings()),
            config,
            catalog,
            sink: Arc::new(TracingSink),
            cancel: CancellationToken::new(),
            locks: KeyedLocks::new(),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Drop progress events entirely
    pub fn quiet(self) -> Self {
        self.with_sink(Arc::new(NullSink))
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn catalog(&self) -> &Arc<dyn AssetCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    /// Convert every source found under `paths`
    pub fn run(&self, paths: &[PathBuf]) -> Result<BatchResult> {
        let start = Instant::now();
        let options = self.config.parse_options();
        let discovery = discover(paths, &options);
        let total = discovery.total();

        self.sink.emit(&ProgressEvent::BatchStarted { total });
        let workers = self.config.worker_count();
        let span = batch_span(total, workers);
        let _enter = span.enter();

        let mut reports: Vec<AssetReport> = discovery
            .failures
            .into_iter()
            .map(|failure| self.reject(failure))
            .collect();
        let progress = BatchProgress::starting_at(reports.len(), total);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("iwbridge-worker-{i}"))
            .build()
            .map_err(|e| Error::internal(format!("failed to start worker pool: {e}")))?;

        let processed: Vec<AssetReport> = pool.install(|| {
            discovery
                .sources
                .par_iter()
                .map(|source| {
                    let report = self.process(source, &options);
                    progress.finish_one();
                    report
                })
                .collect()
        });
        reports.extend(processed);

        let result = BatchResult::from_reports(reports, start.elapsed().as_millis() as u64);
        self.sink.emit(&ProgressEvent::BatchFinished {
            succeeded: result.succeeded,
            failed: result.failed,
            skipped: result.skipped,
            cancelled: result.cancelled,
        });

        if self.config.write_report {
            std::fs::create_dir_all(&self.config.output_dir)?;
            result.write_json(&self.config.output_dir.join(REPORT_FILE))?;
        }
        Ok(result)
    }

    fn reject(&self, failure: DiscoveryFailure) -> AssetReport {
        let mut run = AssetRun::new(self.sink.as_ref(), failure.id, failure.location);
        run.advance(AssetReport::failed_state(&failure.error));
        run.report
    }

    fn process(&self, source: &DiscoveredSource, options: &ParseOptions) -> AssetReport {
        let started = Instant::now();
        let mut run = AssetRun::new(self.sink.as_ref(), source.id.clone(), source.location());

        if let Err(e) = self.drive(source, options, &mut run) {
            if e.kind() == ErrorKind::Cancelled {
                run.advance(AssetState::Cancelled);
            } else {
                let e = e.with_context(format!("asset '{}'", source.id));
                run.advance(AssetReport::failed_state(&e));
            }
        }

        run.report.elapsed_ms = started.elapsed().as_millis() as u64;
        run.report
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn drive(&self, source: &DiscoveredSource, options: &ParseOptions, run: &mut AssetRun<'_>) -> Result<()> {
        self.checkpoint()?;
        let bytes = source.load(options)?;
        let hash = ContentHash::of(&bytes);

        // Held from lookup through commit
        let lock = self.locks.handle(&source.id);
        let _held = lock.lock();

        let recorded = self.catalog.lookup(&source.id)?;
        let mode = match self.plan(&source.id, recorded.as_ref(), &hash) {
            Plan::Convert(mode) => mode,
            Plan::Skip(reason) => {
                if let Some(recorded) = recorded {
                    run.report.kind = Some(recorded.kind);
                    run.report.artifacts = recorded.artifacts;
                }
                run.advance(AssetState::Skipped { reason });
                return Ok(());
            }
        };

        self.checkpoint()?;
        run.advance(AssetState::Parsing);
        let parse_start = Instant::now();
        let (asset, record, up_axis) = instrument_parse("container", source.id.as_str(), || {
            let asset = SourceAsset::read(source.id.clone(), bytes, options)?;
            let record = asset.parse_record()?;
            let up_axis = asset.container.meta()?.up_axis;
            Ok::<_, ParseError>((asset, record, up_axis))
        })
        .map_err(|e| {
            log_parse_error!("container", e);
            Error::from(e)
        })?;
        log_parse_complete!("container", parse_start.elapsed(), asset.container.entries().len());
        run.report.kind = Some(asset.kind);

        self.checkpoint()?;
        run.advance(AssetState::Converting);
        let converted = self.converter.convert(&source.id, record, up_axis)?;
        for warning in &converted.warnings {
            warn!(asset = %source.id, %warning, "Conversion warning");
        }
        run.report.warnings = converted.warnings.clone();

        self.checkpoint()?;
        run.advance(AssetState::Committing);
        let entry = CatalogEntry {
            source_id: source.id.clone(),
            kind: asset.kind,
            artifact_path: converted
                .primary()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| iwbridge_export::artifact_path(&source.id, asset.kind)),
            artifacts: converted.files.iter().map(|f| f.relative_path.clone()).collect(),
            content_hash: hash,
            converted_at: chrono::Utc::now(),
            format_version: format_version(asset.kind),
            bytes: converted.total_bytes() as u64,
        };
        let files: Vec<(PathBuf, Vec<u8>)> = converted
            .files
            .into_iter()
            .map(|f| (f.relative_path, f.bytes))
            .collect();

        let (outcome, attempts) = with_retry(
            &self.config.retry,
            || {
                let staged = self.catalog.stage(files.clone())?;
                Ok(self.catalog.commit(&entry, staged, mode)?)
            },
            |attempt, delay, error| {
                self.sink.emit(&ProgressEvent::Retrying {
                    asset: source.id.clone(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    message: error.to_string(),
                })
            },
        );
        run.report.attempts = attempts;
        let outcome = outcome?;
        run.report.artifacts = entry.artifacts;

        match outcome {
            CommitOutcome::Unchanged => run.advance(AssetState::Skipped {
                reason: SkipReason::Unchanged,
            }),
            CommitOutcome::Inserted | CommitOutcome::Replaced => run.advance(AssetState::Done),
        }
        Ok(())
    }

    /// Compare the source with the catalog's record
    fn plan(&self, id: &AssetId, recorded: Option<&CatalogEntry>, hash: &ContentHash) -> Plan {
        let Some(recorded) = recorded else {
            return Plan::Convert(CommitMode::Normal);
        };
        if self.config.force {
            debug!(asset = %id, "Forced reconversion");
            return Plan::Convert(CommitMode::Replace);
        }
        if &recorded.content_hash == hash {
            let current = format_version(recorded.kind);
            if recorded.format_version == current {
                return Plan::Skip(SkipReason::Unchanged);
            }
            info!(
                asset = %id,
                recorded = recorded.format_version,
                current,
                "Artifact format changed, reconverting"
            );
            return Plan::Convert(CommitMode::Replace);
        }

        match self.config.on_hash_mismatch {
            MismatchPolicy::Keep => {
                warn!(
                    asset = %id,
                    recorded = %recorded.content_hash.short(12),
                    incoming = %hash.short(12),
                    "Source changed since last conversion, keeping recorded artifacts"
                );
                Plan::Skip(SkipReason::KeptOnMismatch)
            }
            MismatchPolicy::Reconvert => {
                warn!(
                    asset = %id,
                    recorded = %recorded.content_hash.short(12),
                    incoming = %hash.short(12),
                    "Source changed since last conversion, reconverting"
                );
                Plan::Convert(CommitMode::Replace)
            }
        }
    }
}

/// One asset's report plus the sink its transitions go to
struct AssetRun<'a> {
    sink: &'a dyn ProgressSink,
    report: AssetReport,
}

impl<'a> AssetRun<'a> {
    fn new(sink: &'a dyn ProgressSink, id: AssetId, source: String) -> Self {
        Self {
            sink,
            report: AssetReport::new(id, source),
        }
    }

    fn advance(&mut self, to: AssetState) {
        let from = std::mem::replace(&mut self.report.state, to.clone());
        self.sink.emit(&ProgressEvent::Transition {
            asset: self.report.id.clone(),
            from,
            to,
        });
    }
}
