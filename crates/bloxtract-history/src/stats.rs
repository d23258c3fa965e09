//! Processing counters.
//!
//! Counters are plain atomics incremented from the worker hot path without
//! any lock; the aggregate is only read back as a [`StatsSnapshot`] when a
//! run finishes (intermediate reads are advisory). Snapshot-isolated
//! workers accumulate into their own [`ProcessingStats`] and the deltas are
//! folded back with [`ProcessingStats::merge`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// The named counters tracked during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Entries fully processed into an output file
    ProcessedFiles,
    /// Entries dropped because their payload repeated within the run
    DuplicateFiles,
    /// Entries dropped because history already knew them
    AlreadyProcessed,
    /// Entries that failed to parse or write
    ErrorFiles,
    /// Entries matching a known-ignore rule
    IgnoredFiles,
    /// Entries no rule recognized
    UnknownFiles,
    /// Font-list documents discovered
    FontlistFound,
    /// Font faces downloaded
    FontsDownloaded,
    /// Translation documents discovered
    TranslationFound,
    /// Translation documents written
    TranslationSaved,
    /// Videos fully assembled
    ProcessedVideos,
    /// HLS segments fetched
    DownloadedSegments,
    /// Videos concatenated by the media tool
    MergedVideos,
    /// Network fetches that exhausted their retry budget
    DownloadFailures,
    /// Repair or concat invocations that failed
    MergeFailures,
}

impl Counter {
    /// Every counter, in snapshot order.
    pub const ALL: [Self; 15] = [
        Self::ProcessedFiles,
        Self::DuplicateFiles,
        Self::AlreadyProcessed,
        Self::ErrorFiles,
        Self::IgnoredFiles,
        Self::UnknownFiles,
        Self::FontlistFound,
        Self::FontsDownloaded,
        Self::TranslationFound,
        Self::TranslationSaved,
        Self::ProcessedVideos,
        Self::DownloadedSegments,
        Self::MergedVideos,
        Self::DownloadFailures,
        Self::MergeFailures,
    ];

    /// Report name of the counter.
    pub fn name(self) -> &'static str {
        match self {
            Self::ProcessedFiles => "processed_files",
            Self::DuplicateFiles => "duplicate_files",
            Self::AlreadyProcessed => "already_processed",
            Self::ErrorFiles => "error_files",
            Self::IgnoredFiles => "ignored_files",
            Self::UnknownFiles => "unknown_files",
            Self::FontlistFound => "fontlist_found",
            Self::FontsDownloaded => "fonts_downloaded",
            Self::TranslationFound => "translation_found",
            Self::TranslationSaved => "translation_saved",
            Self::ProcessedVideos => "processed_videos",
            Self::DownloadedSegments => "downloaded_segments",
            Self::MergedVideos => "merged_videos",
            Self::DownloadFailures => "download_failures",
            Self::MergeFailures => "merge_failures",
        }
    }

    fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|c| *c == self)
            .unwrap_or_default()
    }
}

/// Thread-safe counter set.
#[derive(Debug, Default)]
pub struct ProcessingStats {
    counters: [AtomicU64; 15],
}

impl ProcessingStats {
    /// Create a zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment `counter` by one.
    #[inline]
    pub fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }

    /// Increment `counter` by `amount`.
    #[inline]
    pub fn add(&self, counter: Counter, amount: u64) {
        self.counters[counter.index()].fetch_add(amount, Ordering::Relaxed);
    }

    /// Current value of `counter` (advisory while workers run).
    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Fold another counter set's values into this one.
    pub fn merge(&self, other: &StatsSnapshot) {
        for counter in Counter::ALL {
            self.add(counter, other.get(counter));
        }
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed_files: self.get(Counter::ProcessedFiles),
            duplicate_files: self.get(Counter::DuplicateFiles),
            already_processed: self.get(Counter::AlreadyProcessed),
            error_files: self.get(Counter::ErrorFiles),
            ignored_files: self.get(Counter::IgnoredFiles),
            unknown_files: self.get(Counter::UnknownFiles),
            fontlist_found: self.get(Counter::FontlistFound),
            fonts_downloaded: self.get(Counter::FontsDownloaded),
            translation_found: self.get(Counter::TranslationFound),
            translation_saved: self.get(Counter::TranslationSaved),
            processed_videos: self.get(Counter::ProcessedVideos),
            downloaded_segments: self.get(Counter::DownloadedSegments),
            merged_videos: self.get(Counter::MergedVideos),
            download_failures: self.get(Counter::DownloadFailures),
            merge_failures: self.get(Counter::MergeFailures),
        }
    }
}

/// Immutable counter snapshot carried by the final report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Entries fully processed into an output file
    pub processed_files: u64,
    /// Entries dropped as in-run payload duplicates
    pub duplicate_files: u64,
    /// Entries history already knew
    pub already_processed: u64,
    /// Entries that failed to parse or write
    pub error_files: u64,
    /// Entries matching a known-ignore rule
    pub ignored_files: u64,
    /// Entries no rule recognized
    pub unknown_files: u64,
    /// Font-list documents discovered
    pub fontlist_found: u64,
    /// Font faces downloaded
    pub fonts_downloaded: u64,
    /// Translation documents discovered
    pub translation_found: u64,
    /// Translation documents written
    pub translation_saved: u64,
    /// Videos fully assembled
    pub processed_videos: u64,
    /// HLS segments fetched
    pub downloaded_segments: u64,
    /// Videos concatenated
    pub merged_videos: u64,
    /// Exhausted network retries
    pub download_failures: u64,
    /// Failed repair/concat invocations
    pub merge_failures: u64,
}

impl StatsSnapshot {
    /// Value of `counter` within this snapshot.
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::ProcessedFiles => self.processed_files,
            Counter::DuplicateFiles => self.duplicate_files,
            Counter::AlreadyProcessed => self.already_processed,
            Counter::ErrorFiles => self.error_files,
            Counter::IgnoredFiles => self.ignored_files,
            Counter::UnknownFiles => self.unknown_files,
            Counter::FontlistFound => self.fontlist_found,
            Counter::FontsDownloaded => self.fonts_downloaded,
            Counter::TranslationFound => self.translation_found,
            Counter::TranslationSaved => self.translation_saved,
            Counter::ProcessedVideos => self.processed_videos,
            Counter::DownloadedSegments => self.downloaded_segments,
            Counter::MergedVideos => self.merged_videos,
            Counter::DownloadFailures => self.download_failures,
            Counter::MergeFailures => self.merge_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn increments_are_visible_in_snapshots() {
        let stats = ProcessingStats::new();
        stats.increment(Counter::ProcessedFiles);
        stats.increment(Counter::ProcessedFiles);
        stats.add(Counter::DownloadedSegments, 3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.processed_files, 2);
        assert_eq!(snapshot.downloaded_segments, 3);
        assert_eq!(snapshot.error_files, 0);
    }

    #[test]
    fn merge_folds_worker_deltas() {
        let main = ProcessingStats::new();
        main.increment(Counter::ProcessedFiles);

        let worker = ProcessingStats::new();
        worker.increment(Counter::ProcessedFiles);
        worker.increment(Counter::DuplicateFiles);

        main.merge(&worker.snapshot());
        assert_eq!(main.get(Counter::ProcessedFiles), 2);
        assert_eq!(main.get(Counter::DuplicateFiles), 1);
    }

    #[test]
    fn reset_zeroes_everything() {
        let stats = ProcessingStats::new();
        for counter in Counter::ALL {
            stats.increment(counter);
        }
        stats.reset();
        for counter in Counter::ALL {
            assert_eq!(stats.get(counter), 0);
        }
    }

    #[test]
    fn counter_names_match_report_keys() {
        assert_eq!(Counter::ProcessedFiles.name(), "processed_files");
        assert_eq!(Counter::MergeFailures.name(), "merge_failures");
    }
}
