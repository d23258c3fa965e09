//! `bloxtract` — batch extraction driver for the Roblox client cache.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

use bloxtract_extract::{
    AudioClassification, Classification, ExtractOptions, ExtractTarget, Extractor,
    FontClassification, ImageClassification, LogLevel, ParallelModel, ProgressSink,
    ProgressUpdate, TranslationClassification, VideoClassification,
};
use bloxtract_formats::QualityPreference;
use bloxtract_history::{AssetClass, ExtractionHistory};
use bloxtract_storage::CacheScanner;

#[derive(Parser)]
#[command(
    name = "bloxtract",
    about = "Extract audio, fonts, images, translations and videos from the Roblox client cache",
    version,
    author
)]
struct Cli {
    /// Set the logging level
    #[arg(short, long, value_enum, default_value = "warn")]
    log_level: CliLogLevel,

    /// Output format for the final report
    #[arg(short = 'o', long, value_enum, global = true, default_value = "text")]
    format: OutputFormat,

    /// Path to the extraction history file
    #[arg(long, global = true)]
    history: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Trace => Level::TRACE,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one extraction pass over the cache
    Extract(ExtractArgs),

    /// Inspect or clear the extraction history
    #[command(subcommand)]
    History(HistoryCommands),
}

#[derive(clap::Args)]
struct ExtractArgs {
    /// Asset kind to extract
    #[arg(value_enum)]
    target: TargetArg,

    /// Cache input: a rbx-storage.db file, a rbx-storage folder or any
    /// flat cache directory (auto-detected when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output root (defaults to `extracted/` next to the input)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Worker count (defaults to the CPU core count)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Run workers against an immutable history snapshot instead of
    /// sharing the history behind a lock
    #[arg(long)]
    process_pool: bool,

    /// Audio categorization scheme
    #[arg(long, value_enum, default_value = "duration")]
    classify_audio: AudioClassArg,

    /// Font categorization scheme
    #[arg(long, value_enum, default_value = "family")]
    classify_font: FontClassArg,

    /// Translation categorization scheme
    #[arg(long, value_enum, default_value = "locale")]
    classify_translation: TranslationClassArg,

    /// Video categorization scheme
    #[arg(long, value_enum, default_value = "resolution")]
    classify_video: VideoClassArg,

    /// Image categorization scheme
    #[arg(long, value_enum, default_value = "format")]
    classify_image: ImageClassArg,

    /// Stream quality for HLS assembly
    #[arg(long, value_enum, default_value = "auto")]
    quality: QualityArg,

    /// Skip the per-segment timestamp rewrite before merging
    #[arg(long)]
    no_timestamp_repair: bool,

    /// Keep per-video temporary directories
    #[arg(long)]
    keep_temp: bool,

    /// Keep WEBP payloads that look like avatar renders
    #[arg(long)]
    allow_avatar_images: bool,
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// Print identity and content counts per asset class
    Show,
    /// Wipe one asset class (or everything) from the history
    Clear {
        /// Asset class to clear; clears everything when omitted
        #[arg(long)]
        kind: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TargetArg {
    Audio,
    Fonts,
    Images,
    Translations,
    Videos,
}

impl From<TargetArg> for ExtractTarget {
    fn from(value: TargetArg) -> Self {
        match value {
            TargetArg::Audio => Self::Audio,
            TargetArg::Fonts => Self::Fonts,
            TargetArg::Images => Self::Images,
            TargetArg::Translations => Self::Translations,
            TargetArg::Videos => Self::Videos,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AudioClassArg {
    Duration,
    Size,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FontClassArg {
    Family,
    Style,
    Size,
    None,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TranslationClassArg {
    Locale,
    ContentType,
    Combined,
    None,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum VideoClassArg {
    Resolution,
    None,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ImageClassArg {
    Format,
    Size,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum QualityArg {
    Auto,
    #[value(name = "1080p")]
    P1080,
    #[value(name = "720p")]
    P720,
    #[value(name = "480p")]
    P480,
    Lowest,
}

impl From<QualityArg> for QualityPreference {
    fn from(value: QualityArg) -> Self {
        match value {
            QualityArg::Auto => Self::Auto,
            QualityArg::P1080 => Self::P1080,
            QualityArg::P720 => Self::P720,
            QualityArg::P480 => Self::P480,
            QualityArg::Lowest => Self::Lowest,
        }
    }
}

/// Progress sink printing log events and a live progress line to stderr.
struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn on_progress(&self, update: ProgressUpdate) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(
            stderr,
            "\r{}/{} entries ({:.1}/s)   ",
            update.done, update.total, update.rate
        );
        let _ = stderr.flush();
    }

    fn on_log(&self, level: LogLevel, message: &str) {
        let prefix = match level {
            LogLevel::Info => "* ",
            LogLevel::Success => "ok ",
            LogLevel::Warning => "!! ",
            LogLevel::Error => "xx ",
        };
        eprintln!("\n{prefix}{message}");
    }
}

fn open_history(path: Option<PathBuf>) -> anyhow::Result<Arc<ExtractionHistory>> {
    let path = match path {
        Some(path) => path,
        None => ExtractionHistory::default_path()
            .context("cannot determine the user home directory; pass --history")?,
    };
    let history = ExtractionHistory::open(&path)
        .with_context(|| format!("failed to load history at {}", path.display()))?;
    Ok(Arc::new(history))
}

async fn run_extract(
    args: ExtractArgs,
    history: Arc<ExtractionHistory>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let scanner = match &args.input {
        Some(path) => CacheScanner::at_path(path),
        None => CacheScanner::detect(),
    };

    let options = ExtractOptions {
        output_dir: args.output.clone(),
        num_workers: args
            .workers
            .unwrap_or(ExtractOptions::default().num_workers),
        parallel: if args.process_pool {
            ParallelModel::ProcessPool
        } else {
            ParallelModel::Threaded
        },
        classification: Classification {
            audio: match args.classify_audio {
                AudioClassArg::Duration => AudioClassification::Duration,
                AudioClassArg::Size => AudioClassification::Size,
            },
            font: match args.classify_font {
                FontClassArg::Family => FontClassification::Family,
                FontClassArg::Style => FontClassification::Style,
                FontClassArg::Size => FontClassification::Size,
                FontClassArg::None => FontClassification::None,
            },
            translation: match args.classify_translation {
                TranslationClassArg::Locale => TranslationClassification::Locale,
                TranslationClassArg::ContentType => TranslationClassification::ContentType,
                TranslationClassArg::Combined => TranslationClassification::Combined,
                TranslationClassArg::None => TranslationClassification::None,
            },
            video: match args.classify_video {
                VideoClassArg::Resolution => VideoClassification::Resolution,
                VideoClassArg::None => VideoClassification::None,
            },
            image: match args.classify_image {
                ImageClassArg::Format => ImageClassification::Format,
                ImageClassArg::Size => ImageClassification::Size,
            },
        },
        block_avatar_images: !args.allow_avatar_images,
        quality: args.quality.into(),
        timestamp_repair: !args.no_timestamp_repair,
        auto_cleanup: !args.keep_temp,
        ..ExtractOptions::default()
    };

    let extractor = Extractor::new(scanner, history, options);

    // Ctrl-C flips the cancel token; workers drain and the report still
    // lands, so an interrupted run exits cleanly.
    let cancel = extractor.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });

    let report = extractor
        .extract_with_sink(args.target.into(), Arc::new(ConsoleSink))
        .await?;

    match format {
        OutputFormat::Text => println!("{}", report.summary()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn run_history(command: HistoryCommands, history: &ExtractionHistory) -> anyhow::Result<()> {
    match command {
        HistoryCommands::Show => {
            println!("history file: {}", history.path().display());
            for class in AssetClass::ALL {
                let identities = history.size(Some(class));
                let contents = history.content_size(Some(class));
                if identities > 0 || contents > 0 {
                    println!("  {class:<12} {identities:>8} identities, {contents:>8} content hashes");
                }
            }
            println!("  {:<12} {:>8} identities", "total", history.size(None));
        }
        HistoryCommands::Clear { kind } => {
            let class = match kind {
                Some(name) => Some(
                    name.parse::<AssetClass>()
                        .map_err(|err| anyhow::anyhow!("{err}"))?,
                ),
                None => None,
            };
            history.clear(class)?;
            match class {
                Some(class) => println!("cleared {class} history"),
                None => println!("cleared all history"),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(Level::from(cli.log_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let history = open_history(cli.history.clone())?;

    match cli.command {
        Commands::Extract(args) => run_extract(args, history, cli.format).await?,
        Commands::History(command) => run_history(command, &history)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_an_extract_invocation() {
        let cli = Cli::try_parse_from([
            "bloxtract",
            "extract",
            "audio",
            "--classify-audio",
            "size",
            "--workers",
            "2",
        ]);
        assert!(cli.is_ok());
    }

    #[test]
    fn cli_rejects_unknown_targets() {
        let cli = Cli::try_parse_from(["bloxtract", "extract", "shaders"]);
        assert!(cli.is_err());
    }

    #[test]
    fn quality_values_use_resolution_names() {
        let cli = Cli::try_parse_from([
            "bloxtract",
            "extract",
            "videos",
            "--quality",
            "720p",
        ]);
        assert!(cli.is_ok());
    }
}
