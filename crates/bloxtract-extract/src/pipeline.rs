//! Extraction pipeline orchestrator.
//!
//! The orchestrator is the only component that spawns workers. One
//! [`Extractor::extract`] call scans the cache, pushes every entry through
//! a shared work queue, and drains it with `num_workers` tasks. Each task
//! decodes the RBXH frame, identifies the payload and hands matching kinds
//! to the run's processor; every per-entry failure is contained and
//! charged to a counter. Per entry:
//!
//! ```text
//! New -> Parsed -> Identified -> { Processed | Duplicate | AlreadyKnown | Errored | Ignored }
//! ```
//!
//! In the threaded model workers share history, hash cache and counters;
//! in the process-pool model each worker runs against an immutable history
//! snapshot and its deltas and counters are folded back after the pool
//! drains, so the hot loop takes no shared locks.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use bloxtract_formats::{AssetKind, IdentifyOptions, RbxhError, RbxhParser, identify};
use bloxtract_history::{
    ContentHashCache, Counter, ExtractionHistory, HistoryDeltas, ProcessingStats, StatsSnapshot,
};
use bloxtract_storage::{CacheEntry, CacheLocation, CacheScanner, EntryPayload, ScanBackend};

use crate::assembler::HlsAssembler;
use crate::cancel::CancelToken;
use crate::config::{ExtractOptions, ExtractTarget, ParallelModel};
use crate::fonts::FontResolver;
use crate::media_tool::MediaTool;
use crate::processors::{
    AssetProcessor, AudioProcessor, EntryContext, FontProcessor, ImageProcessor,
    TranslationProcessor, VideoProcessor, WorkerContext,
};
use crate::progress::{LogLevel, NullSink, ProgressReporter, ProgressSink};
use crate::report::ExtractionReport;
use crate::{ExtractError, Result};

/// Append-only error log under `{output}/logs/`.
struct ErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ErrorLog {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Best-effort append; a failing log write never fails the run.
    fn append(&self, source: &str, message: &str) {
        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            let _ = writeln!(file, "[{timestamp}] {source}: {message}");
        }
    }
}

/// Default output base: `extracted/` next to (or inside) the cache input.
fn default_output_base(location: &CacheLocation) -> PathBuf {
    match location.backend {
        ScanBackend::Database => location
            .path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
            .join("extracted"),
        ScanBackend::FileSystem => location.path.join("extracted"),
    }
}

/// One-call extraction engine over a scanner, a history store and options.
pub struct Extractor {
    scanner: Arc<CacheScanner>,
    history: Arc<ExtractionHistory>,
    options: ExtractOptions,
    parser: Arc<RbxhParser>,
    cancel: CancelToken,
}

impl Extractor {
    /// Build an engine. The history is borrowed shared so callers can keep
    /// querying it between runs.
    pub fn new(
        scanner: CacheScanner,
        history: Arc<ExtractionHistory>,
        options: ExtractOptions,
    ) -> Self {
        Self {
            scanner: Arc::new(scanner),
            history,
            options,
            parser: Arc::new(RbxhParser::new()),
            cancel: CancelToken::new(),
        }
    }

    /// Token observed by all workers of this engine.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The scanner this engine reads from.
    pub fn scanner(&self) -> &CacheScanner {
        &self.scanner
    }

    /// Run one extraction pass without progress reporting.
    pub async fn extract(&self, target: ExtractTarget) -> Result<ExtractionReport> {
        self.extract_with_sink(target, Arc::new(NullSink)).await
    }

    /// Run one extraction pass, reporting progress and log events to `sink`.
    pub async fn extract_with_sink(
        &self,
        target: ExtractTarget,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<ExtractionReport> {
        let started = Instant::now();
        let location = self.scanner.location();

        let output_base = self
            .options
            .output_dir
            .clone()
            .unwrap_or_else(|| default_output_base(&location));
        let kind_dir = output_base.join(target.folder());
        std::fs::create_dir_all(&kind_dir).map_err(|source| ExtractError::OutputUnavailable {
            path: kind_dir.clone(),
            source,
        })?;

        // Fresh per-run state
        self.parser.reset();
        let hash_cache = Arc::new(ContentHashCache::new());
        let stats = Arc::new(ProcessingStats::new());
        let error_log = Arc::new(ErrorLog::new(
            output_base.join("logs").join("extraction_errors.log"),
        ));

        sink.on_log(LogLevel::Info, "scanning cache");
        let scanner = Arc::clone(&self.scanner);
        let entries = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(|err| ExtractError::Write(std::io::Error::other(err)))?;

        if entries.is_empty() {
            sink.on_log(LogLevel::Warning, "no new cache entries found");
            return Ok(ExtractionReport::new(
                target,
                kind_dir,
                stats.snapshot(),
                self.cancel.is_cancelled(),
                started.elapsed(),
                0,
            ));
        }
        sink.on_log(
            LogLevel::Info,
            &format!("found {} cache entries", entries.len()),
        );

        let processor = self.build_processor(target, &kind_dir, &output_base)?;
        let total = entries.len() as u64;
        let queue = Arc::new(Mutex::new(VecDeque::from(entries)));
        let reporter = Arc::new(ProgressReporter::new(Arc::clone(&sink), total));
        let identify_options = IdentifyOptions {
            block_avatar_images: self.options.block_avatar_images,
        };

        let workers = self.options.num_workers.max(1);
        sink.on_log(
            LogLevel::Info,
            &format!("processing with {workers} workers"),
        );

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let ctx = match self.options.parallel {
                ParallelModel::Threaded => WorkerContext::shared(
                    Arc::clone(&self.history),
                    Arc::clone(&hash_cache),
                    Arc::clone(&stats),
                    self.cancel.clone(),
                ),
                ParallelModel::ProcessPool => WorkerContext::isolated(
                    Arc::new(self.history.snapshot()),
                    Arc::clone(&hash_cache),
                    self.cancel.clone(),
                ),
            };
            handles.push(tokio::spawn(worker_loop(
                Arc::clone(&queue),
                Arc::clone(&self.parser),
                Arc::clone(&processor),
                ctx,
                Arc::clone(&reporter),
                Arc::clone(&error_log),
                identify_options,
            )));
        }

        for handle in handles {
            match handle.await {
                Ok((deltas, worker_stats)) => {
                    if self.options.parallel == ParallelModel::ProcessPool {
                        self.history.merge(deltas);
                        stats.merge(&worker_stats);
                    }
                }
                Err(err) => {
                    tracing::error!(%err, "worker task failed");
                    stats.increment(Counter::ErrorFiles);
                }
            }
        }
        reporter.finish();

        if let Err(err) = self.history.save() {
            tracing::error!(%err, "failed to persist extraction history");
            sink.on_log(LogLevel::Error, &format!("history save failed: {err}"));
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            sink.on_log(LogLevel::Warning, "extraction cancelled");
        }

        let report = ExtractionReport::new(
            target,
            kind_dir,
            stats.snapshot(),
            cancelled,
            started.elapsed(),
            reporter.done_count(),
        );
        sink.on_log(LogLevel::Success, &report.summary());
        Ok(report)
    }

    fn media_tool(&self) -> MediaTool {
        self.options
            .media_tool
            .clone()
            .unwrap_or_else(MediaTool::locate)
    }

    fn build_processor(
        &self,
        target: ExtractTarget,
        kind_dir: &Path,
        output_base: &Path,
    ) -> Result<Arc<dyn AssetProcessor>> {
        let options = &self.options;
        Ok(match target {
            ExtractTarget::Audio => Arc::new(AudioProcessor::new(
                kind_dir.to_path_buf(),
                options.classification.audio,
                self.media_tool(),
            )),
            ExtractTarget::Images => Arc::new(ImageProcessor::new(
                kind_dir.to_path_buf(),
                options.classification.image,
            )),
            ExtractTarget::Translations => Arc::new(TranslationProcessor::new(
                kind_dir.to_path_buf(),
                options.classification.translation,
            )),
            ExtractTarget::Fonts => {
                let resolver =
                    FontResolver::new(options.font_endpoint.clone(), options.retry.clone())?;
                Arc::new(FontProcessor::new(
                    kind_dir.to_path_buf(),
                    options.classification.font,
                    resolver,
                ))
            }
            ExtractTarget::Videos => {
                let assembler = HlsAssembler::new(
                    kind_dir.to_path_buf(),
                    output_base.join("temp"),
                    options.classification.video,
                    options.quality,
                    options.timestamp_repair,
                    options.auto_cleanup,
                    self.media_tool(),
                    options.retry.clone(),
                )?;
                Arc::new(VideoProcessor::new(assembler))
            }
        })
    }
}

/// One worker: pop, process, tick, until the queue drains or cancellation.
async fn worker_loop(
    queue: Arc<Mutex<VecDeque<CacheEntry>>>,
    parser: Arc<RbxhParser>,
    processor: Arc<dyn AssetProcessor>,
    mut ctx: WorkerContext,
    reporter: Arc<ProgressReporter>,
    error_log: Arc<ErrorLog>,
    identify_options: IdentifyOptions,
) -> (HistoryDeltas, StatsSnapshot) {
    loop {
        if ctx.is_cancelled() {
            break;
        }
        let entry = queue.lock().pop_front();
        let Some(entry) = entry else { break };

        process_entry(
            entry,
            &parser,
            processor.as_ref(),
            &mut ctx,
            &error_log,
            identify_options,
        )
        .await;
        reporter.tick();
    }

    let worker_stats = ctx.stats.snapshot();
    (ctx.take_deltas(), worker_stats)
}

/// Drive one entry through parse, identify and consume.
async fn process_entry(
    entry: CacheEntry,
    parser: &RbxhParser,
    processor: &dyn AssetProcessor,
    ctx: &mut WorkerContext,
    error_log: &ErrorLog,
    identify_options: IdentifyOptions,
) {
    let entry_ctx = EntryContext::for_entry(&entry);

    let raw = match entry.payload {
        EntryPayload::Inline(bytes) => bytes,
        EntryPayload::OnDisk(path) => match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                ctx.increment(Counter::ErrorFiles);
                error_log.append(&entry_ctx.identity, &err.to_string());
                return;
            }
        },
    };

    let frame = match parser.parse_bytes(&raw) {
        Ok(frame) => frame,
        Err(RbxhError::DuplicateLink(url)) => {
            tracing::debug!(%url, "repeated link");
            ctx.increment(Counter::DuplicateFiles);
            return;
        }
        Err(err) => {
            tracing::debug!(identity = %entry_ctx.identity, %err, "frame rejected");
            ctx.increment(Counter::ErrorFiles);
            error_log.append(&entry_ctx.identity, &err.to_string());
            return;
        }
    };

    let kind = identify(&frame.body, &identify_options);
    match kind {
        AssetKind::Ignored(reason) => {
            tracing::debug!(identity = %entry_ctx.identity, reason, "payload ignored");
            ctx.increment(Counter::IgnoredFiles);
        }
        AssetKind::Unknown => {
            ctx.increment(Counter::UnknownFiles);
        }
        kind if processor.accepts(kind) => {
            match processor.consume(&entry_ctx, frame.body, kind, ctx).await {
                Ok(_) => {}
                Err(ExtractError::Cancelled) => {
                    // The token is set; the worker loop exits on its next check.
                }
                Err(err) => {
                    tracing::error!(identity = %entry_ctx.identity, %err, "processor failed");
                    ctx.increment(Counter::ErrorFiles);
                    error_log.append(&entry_ctx.identity, &err.to_string());
                }
            }
        }
        _ => {
            // Recognized payload of a kind this run does not target.
            tracing::trace!(identity = %entry_ctx.identity, kind = kind.label(), "off-target kind");
        }
    }
}
