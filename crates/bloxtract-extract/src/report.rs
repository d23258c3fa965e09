//! Extraction report.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use bloxtract_history::StatsSnapshot;

use crate::config::ExtractTarget;

/// Final result of one extraction pass, produced only by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    /// Asset kind this pass targeted
    pub target: ExtractTarget,
    /// Kind output directory the pass wrote into
    pub output_dir: PathBuf,
    /// Counter totals
    pub stats: StatsSnapshot,
    /// Whether the pass ended through cancellation
    pub cancelled: bool,
    /// Wall-clock duration in seconds
    pub duration_secs: f64,
    /// Average entries per second over the whole run
    pub files_per_second: f64,
}

impl ExtractionReport {
    pub(crate) fn new(
        target: ExtractTarget,
        output_dir: PathBuf,
        stats: StatsSnapshot,
        cancelled: bool,
        duration: Duration,
        entries_done: u64,
    ) -> Self {
        let duration_secs = duration.as_secs_f64();
        let files_per_second = if duration_secs > 0.0 {
            entries_done as f64 / duration_secs
        } else {
            0.0
        };
        Self {
            target,
            output_dir,
            stats,
            cancelled,
            duration_secs,
            files_per_second,
        }
    }

    /// One human-readable line for the end of a run.
    pub fn summary(&self) -> String {
        let headline = match self.target {
            ExtractTarget::Audio | ExtractTarget::Images => format!(
                "{} processed, {} duplicates, {} already known, {} errors",
                self.stats.processed_files,
                self.stats.duplicate_files,
                self.stats.already_processed,
                self.stats.error_files
            ),
            ExtractTarget::Fonts => format!(
                "{} font lists, {} faces downloaded, {} already known, {} download failures",
                self.stats.fontlist_found,
                self.stats.fonts_downloaded,
                self.stats.already_processed,
                self.stats.download_failures
            ),
            ExtractTarget::Translations => format!(
                "{} found, {} saved, {} already known",
                self.stats.translation_found,
                self.stats.translation_saved,
                self.stats.already_processed
            ),
            ExtractTarget::Videos => format!(
                "{} videos assembled from {} segments, {} merge failures, {} download failures",
                self.stats.processed_videos,
                self.stats.downloaded_segments,
                self.stats.merge_failures,
                self.stats.download_failures
            ),
        };
        let state = if self.cancelled { " (cancelled)" } else { "" };
        format!(
            "{} extraction{}: {} in {:.1}s ({:.1}/s) -> {}",
            self.target,
            state,
            headline,
            self.duration_secs,
            self.files_per_second,
            self.output_dir.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_mentions_the_essentials() {
        let mut stats = StatsSnapshot::default();
        stats.processed_files = 3;
        stats.duplicate_files = 1;
        let report = ExtractionReport::new(
            ExtractTarget::Audio,
            PathBuf::from("/out/Audio"),
            stats,
            false,
            Duration::from_secs(2),
            4,
        );
        let summary = report.summary();
        assert!(summary.contains("3 processed"));
        assert!(summary.contains("1 duplicates"));
        assert!(summary.contains("/out/Audio"));
        assert!((report.files_per_second - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cancelled_runs_say_so() {
        let report = ExtractionReport::new(
            ExtractTarget::Videos,
            PathBuf::from("/out/Videos"),
            StatsSnapshot::default(),
            true,
            Duration::from_secs(1),
            0,
        );
        assert!(report.summary().contains("(cancelled)"));
    }
}
