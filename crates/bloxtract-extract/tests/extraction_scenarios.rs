//! End-to-end extraction runs over synthetic caches.
//!
//! Each test builds a flat cache directory of RBXH-framed payloads, runs
//! one extraction pass and asserts on outputs, counters and history.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bloxtract_extract::{
    AudioClassification, CancelToken, Classification, ExtractOptions, ExtractTarget, Extractor,
    LogLevel, MediaTool, ParallelModel, ProgressSink, ProgressUpdate, RetryPolicy,
};
use bloxtract_history::{AssetClass, ExtractionHistory};
use bloxtract_storage::CacheScanner;

/// Wrap a payload in a well-formed RBXH frame.
fn rbxh_frame(url: &str, body: &[u8]) -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(b"RBXH");
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(&(url.len() as u32).to_le_bytes());
    raw.extend_from_slice(url.as_bytes());
    raw.push(0);
    raw.extend_from_slice(&200u32.to_le_bytes());
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(&(body.len() as u32).to_le_bytes());
    raw.extend_from_slice(&[0u8; 8]);
    raw.extend_from_slice(body);
    raw
}

struct Fixture {
    _root: TempDir,
    cache_dir: PathBuf,
    output_dir: PathBuf,
    history: Arc<ExtractionHistory>,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let cache_dir = root.path().join("cache");
        let output_dir = root.path().join("out");
        std::fs::create_dir_all(&cache_dir).unwrap();
        let history =
            Arc::new(ExtractionHistory::open(root.path().join("history.json")).unwrap());
        Self {
            _root: root,
            cache_dir,
            output_dir,
            history,
        }
    }

    fn add_entry(&self, name: &str, url: &str, body: &[u8]) {
        std::fs::write(self.cache_dir.join(name), rbxh_frame(url, body)).unwrap();
    }

    fn options(&self) -> ExtractOptions {
        ExtractOptions {
            output_dir: Some(self.output_dir.clone()),
            num_workers: 2,
            retry: RetryPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                multiplier: 1.0,
            },
            ..ExtractOptions::default()
        }
    }

    fn extractor(&self, options: ExtractOptions) -> Extractor {
        Extractor::new(
            CacheScanner::at_path(&self.cache_dir),
            Arc::clone(&self.history),
            options,
        )
    }

    fn files_under(&self, relative: &str) -> Vec<String> {
        let dir = self.output_dir.join(relative);
        match std::fs::read_dir(&dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Stub standing in for the external media tool on unix test hosts: copies
/// for repair, concatenates list entries for merge, prints a duration for
/// probe-shaped invocations.
#[cfg(unix)]
fn stub_media_tool(dir: &Path) -> MediaTool {
    use std::os::unix::fs::PermissionsExt;

    let tool = dir.join("fake-ffmpeg.sh");
    std::fs::write(
        &tool,
        r#"#!/bin/sh
if [ "$1" = "-f" ]; then
    # concat mode: -f concat -safe 0 -i LIST -c copy OUT -y
    list="$6"; out="$9"
    : > "$out"
    dir=$(dirname "$list")
    while IFS= read -r line; do
        f=${line#file \'}; f=${f%\'}
        cat "$dir/$f" >> "$out"
    done < "$list"
else
    # repair mode: -i SEG -c copy -bsf:v ... OUT -y
    cp "$2" "$7"
fi
"#,
    )
    .unwrap();

    let probe = dir.join("fake-ffprobe.sh");
    std::fs::write(&probe, "#!/bin/sh\necho 2.5\n").unwrap();

    for path in [&tool, &probe] {
        let mut permissions = std::fs::metadata(path).unwrap().permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(path, permissions).unwrap();
    }

    MediaTool::with_paths(tool, probe)
}

#[tokio::test]
async fn audio_size_classification_writes_one_banded_file() {
    let fixture = Fixture::new();
    let mut body = b"OggS".to_vec();
    body.resize(73 * 1024, 0x11);
    fixture.add_entry("entry-a", "https://c0.rbxcdn.com/a", &body);

    let options = ExtractOptions {
        classification: Classification {
            audio: AudioClassification::Size,
            ..Classification::default()
        },
        ..fixture.options()
    };
    let report = fixture
        .extractor(options)
        .extract(ExtractTarget::Audio)
        .await
        .unwrap();

    let files = fixture.files_under("Audio/small_50-200KB");
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with(".ogg"));

    assert_eq!(report.stats.processed_files, 1);
    assert_eq!(report.stats.duplicate_files, 0);
    assert_eq!(report.stats.already_processed, 0);
    assert_eq!(report.stats.error_files, 0);
    assert!(!report.cancelled);
    assert_eq!(fixture.history.size(Some(AssetClass::Audio)), 1);
}

#[tokio::test]
async fn identical_bodies_under_different_identities_deduplicate() {
    let fixture = Fixture::new();
    let body = b"OggS identical content".to_vec();
    fixture.add_entry("entry-a", "https://c0.rbxcdn.com/a", &body);
    fixture.add_entry("entry-b", "https://c0.rbxcdn.com/b", &body);

    let options = ExtractOptions {
        classification: Classification {
            audio: AudioClassification::Size,
            ..Classification::default()
        },
        num_workers: 1,
        ..fixture.options()
    };
    let report = fixture
        .extractor(options)
        .extract(ExtractTarget::Audio)
        .await
        .unwrap();

    assert_eq!(report.stats.processed_files, 1);
    assert_eq!(report.stats.duplicate_files, 1);
    assert_eq!(fixture.files_under("Audio/ultra_small_0-50KB").len(), 1);
}

#[tokio::test]
async fn font_list_resolves_both_faces() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/asset"))
        .and(query_param("id", "12345"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"TTF-0001--".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/asset"))
        .and(query_param("id", "67890"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"TTF-0002--".to_vec()))
        .mount(&server)
        .await;

    let fixture = Fixture::new();
    let list = br#"{"name": "Roboto", "faces": [
        {"name": "Regular", "assetId": "rbxassetid://12345"},
        {"name": "Bold", "assetId": "rbxassetid://67890"}
    ]}"#;
    fixture.add_entry("fontlist-1", "https://fonts.rbxcdn.com/list", list);

    let options = ExtractOptions {
        font_endpoint: format!("{}/v1/asset", server.uri()),
        ..fixture.options()
    };
    let report = fixture
        .extractor(options)
        .extract(ExtractTarget::Fonts)
        .await
        .unwrap();

    assert_eq!(report.stats.fontlist_found, 1);
    assert_eq!(report.stats.fonts_downloaded, 2);
    assert_eq!(report.stats.download_failures, 0);

    let family = fixture.files_under("Fonts/Roboto");
    assert!(family.contains(&"Roboto-Regular.ttf".to_string()));
    assert!(family.contains(&"Roboto-Bold.ttf".to_string()));
    assert!(fixture
        .history
        .is_processed("font_asset_12345", AssetClass::Font));
    assert!(fixture
        .history
        .is_processed("font_asset_67890", AssetClass::Font));
}

#[cfg(unix)]
#[tokio::test]
async fn hls_video_assembles_highest_bandwidth_stream() {
    let server = MockServer::start().await;

    let media_playlist = "#EXTM3U\n\
        #EXT-X-TARGETDURATION:4\n\
        #EXTINF:4.0,\nseg-000.webm\n\
        #EXTINF:4.0,\nseg-001.webm\n\
        #EXTINF:4.0,\nseg-002.webm\n\
        #EXT-X-ENDLIST\n";
    Mock::given(method("GET"))
        .and(path("/cdn/1080/playlist.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(media_playlist))
        .mount(&server)
        .await;
    for (index, content) in [b"AAAA", b"BBBB", b"CCCC"].iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(format!("/cdn/1080/seg-00{index}.webm")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
            .mount(&server)
            .await;
    }

    let master = format!(
        "#EXTM3U\n\
         #EXT-X-DEFINE:NAME=\"RBX-BASE-URI\" VALUE=\"{}/cdn/\"\n\
         #EXT-X-STREAM-INF:BANDWIDTH=500000,RESOLUTION=640x360\n\
         {{$RBX-BASE-URI}}360/playlist.m3u8\n\
         #EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1920x1080\n\
         {{$RBX-BASE-URI}}1080/playlist.m3u8\n",
        server.uri()
    );

    let fixture = Fixture::new();
    fixture.add_entry("playlist-1", "https://video.rbxcdn.com/master", master.as_bytes());
    let video_hash = format!("{:x}", md5::compute(master.as_bytes()));

    let tool_dir = TempDir::new().unwrap();
    let options = ExtractOptions {
        media_tool: Some(stub_media_tool(tool_dir.path())),
        ..fixture.options()
    };
    let report = fixture
        .extractor(options)
        .extract(ExtractTarget::Videos)
        .await
        .unwrap();

    assert_eq!(report.stats.processed_videos, 1);
    assert_eq!(report.stats.downloaded_segments, 3);
    assert_eq!(report.stats.merged_videos, 1);
    assert_eq!(report.stats.merge_failures, 0);

    let merged = fixture
        .output_dir
        .join("Videos")
        .join("1080p")
        .join(format!("{video_hash}.webm"));
    assert!(merged.is_file());
    // Concat order follows the playlist
    assert_eq!(std::fs::read(&merged).unwrap(), b"AAAABBBBCCCC");

    // Scratch directory is gone
    let temp = fixture
        .output_dir
        .join("temp")
        .join(format!("VideoFrame-{video_hash}"));
    assert!(!temp.exists());
    assert!(fixture
        .history
        .is_processed(&video_hash, AssetClass::Video));
}

#[tokio::test]
async fn second_run_over_unchanged_cache_writes_nothing() {
    let fixture = Fixture::new();
    let mut body = b"OggS".to_vec();
    body.resize(1024, 0x22);
    fixture.add_entry("entry-a", "https://c0.rbxcdn.com/a", &body);

    let options = ExtractOptions {
        classification: Classification {
            audio: AudioClassification::Size,
            ..Classification::default()
        },
        ..fixture.options()
    };

    let first = fixture
        .extractor(options.clone())
        .extract(ExtractTarget::Audio)
        .await
        .unwrap();
    assert_eq!(first.stats.processed_files, 1);

    // Fresh scanner and parser, shared history: everything is already known.
    let second = fixture
        .extractor(options)
        .extract(ExtractTarget::Audio)
        .await
        .unwrap();
    assert_eq!(second.stats.processed_files, 0);
    assert_eq!(second.stats.error_files, 0);
    assert_eq!(second.stats.duplicate_files, 0);
    assert_eq!(second.stats.already_processed, 1);
    assert_eq!(fixture.files_under("Audio/ultra_small_0-50KB").len(), 1);
}

#[tokio::test]
async fn snapshot_workers_merge_their_deltas_back() {
    let fixture = Fixture::new();
    for index in 0..8 {
        let mut body = format!("OggS-{index:04}").into_bytes();
        body.resize(512 + index, 0x33);
        fixture.add_entry(
            &format!("entry-{index}"),
            &format!("https://c0.rbxcdn.com/{index}"),
            &body,
        );
    }

    let options = ExtractOptions {
        parallel: ParallelModel::ProcessPool,
        num_workers: 4,
        classification: Classification {
            audio: AudioClassification::Size,
            ..Classification::default()
        },
        ..fixture.options()
    };
    let report = fixture
        .extractor(options)
        .extract(ExtractTarget::Audio)
        .await
        .unwrap();

    assert_eq!(report.stats.processed_files, 8);
    // Deltas from every isolated worker landed in the shared history
    assert_eq!(fixture.history.size(Some(AssetClass::Audio)), 8);
}

#[tokio::test]
async fn mixed_payloads_only_feed_the_targeted_processor() {
    let fixture = Fixture::new();
    fixture.add_entry("audio-1", "https://c/1", b"OggS audio bytes");
    fixture.add_entry(
        "translation-1",
        "https://c/2",
        br#"{"locale":"en-us","entries":{"ui.ok":"OK"}}"#,
    );
    fixture.add_entry("flags-1", "https://c/3", br#"{"applicationSettings":{}}"#);
    fixture.add_entry("junk-1", "https://c/4", b"\x00\x01\x02\x03 junk");
    fixture.add_entry("broken-1", "https://c/5", b"not an rbxh frame at all");

    let options = ExtractOptions {
        classification: Classification {
            audio: AudioClassification::Size,
            ..Classification::default()
        },
        num_workers: 1,
        ..fixture.options()
    };
    let report = fixture
        .extractor(options)
        .extract(ExtractTarget::Audio)
        .await
        .unwrap();

    assert_eq!(report.stats.processed_files, 1);
    assert_eq!(report.stats.ignored_files, 1);
    assert_eq!(report.stats.unknown_files, 1);
    assert_eq!(report.stats.error_files, 1);
    // The translation entry is recognized but off-target: no counter moves
    assert_eq!(report.stats.translation_found, 0);
}

/// Sink that flips the cancel token once enough entries completed.
struct CancelAfter {
    token: CancelToken,
    threshold: u64,
}

impl ProgressSink for CancelAfter {
    fn on_progress(&self, update: ProgressUpdate) {
        if update.done >= self.threshold {
            self.token.cancel();
        }
    }
    fn on_log(&self, _level: LogLevel, _message: &str) {}
}

#[cfg(unix)]
#[tokio::test]
async fn cancellation_drains_in_flight_work_and_persists_history() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::new();
    for index in 0..100 {
        let mut body = format!("OggS-{index:04}").into_bytes();
        body.resize(256 + index, 0x44);
        fixture.add_entry(
            &format!("entry-{index:03}"),
            &format!("https://c0.rbxcdn.com/{index}"),
            &body,
        );
    }

    // A slow probe paces the workers so cancellation lands mid-run.
    let tool_dir = TempDir::new().unwrap();
    let probe = tool_dir.path().join("slow-probe.sh");
    std::fs::write(&probe, "#!/bin/sh\nsleep 0.05\necho 1.0\n").unwrap();
    let mut permissions = std::fs::metadata(&probe).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&probe, permissions).unwrap();

    let options = ExtractOptions {
        classification: Classification {
            audio: AudioClassification::Duration,
            ..Classification::default()
        },
        num_workers: 4,
        media_tool: Some(MediaTool::with_paths(probe.clone(), probe.clone())),
        ..fixture.options()
    };
    let extractor = fixture.extractor(options);
    let sink = Arc::new(CancelAfter {
        token: extractor.cancel_token(),
        threshold: 10,
    });

    let report = extractor
        .extract_with_sink(ExtractTarget::Audio, sink)
        .await
        .unwrap();

    assert!(report.cancelled);
    // In-flight units finish; nothing close to the full queue runs.
    assert!(report.stats.processed_files >= 10);
    assert!(report.stats.processed_files < 60);
    // History on disk matches what was actually processed.
    assert_eq!(
        fixture.history.size(Some(AssetClass::Audio)),
        report.stats.processed_files as usize
    );
    let reloaded = ExtractionHistory::open(fixture.history.path()).unwrap();
    assert_eq!(
        reloaded.size(Some(AssetClass::Audio)),
        report.stats.processed_files as usize
    );
}

#[tokio::test]
async fn clear_then_reextract_matches_a_fresh_install() {
    let fixture = Fixture::new();
    let mut body = b"OggS".to_vec();
    body.resize(2048, 0x55);
    fixture.add_entry("entry-a", "https://c0.rbxcdn.com/a", &body);

    let options = ExtractOptions {
        classification: Classification {
            audio: AudioClassification::Size,
            ..Classification::default()
        },
        ..fixture.options()
    };

    fixture
        .extractor(options.clone())
        .extract(ExtractTarget::Audio)
        .await
        .unwrap();
    fixture.history.clear(None).unwrap();

    let rerun = fixture
        .extractor(options)
        .extract(ExtractTarget::Audio)
        .await
        .unwrap();
    assert_eq!(rerun.stats.processed_files, 1);
    assert_eq!(rerun.stats.already_processed, 0);
    assert_eq!(fixture.history.size(Some(AssetClass::Audio)), 1);
}
