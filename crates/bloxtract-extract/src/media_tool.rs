//! External media tool invocation.
//!
//! One command-line tool family (ffmpeg and its probe companion) covers
//! everything the engine needs: duration probing for audio classification,
//! per-segment timestamp repair, and concat-copy merging of repaired
//! segments. Every invocation runs under a timeout; a timed-out or
//! non-zero exit fails only the compound asset that invoked it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::{ExtractError, Result};

/// Timeout for per-segment timestamp repair.
const REPAIR_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for concat-copy merges.
const CONCAT_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for duration probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Locator and runner for the external media tool.
#[derive(Debug, Clone, Default)]
pub struct MediaTool {
    tool: Option<PathBuf>,
    probe: Option<PathBuf>,
}

impl MediaTool {
    /// Locate `ffmpeg`/`ffprobe` on `PATH`; absent binaries leave the
    /// corresponding operations unavailable rather than failing.
    pub fn locate() -> Self {
        Self {
            tool: which::which("ffmpeg").ok(),
            probe: which::which("ffprobe").ok(),
        }
    }

    /// Use explicit binaries (tests point this at a stub).
    pub fn with_paths(tool: impl Into<PathBuf>, probe: impl Into<PathBuf>) -> Self {
        Self {
            tool: Some(tool.into()),
            probe: Some(probe.into()),
        }
    }

    /// Whether the main tool is available.
    pub fn available(&self) -> bool {
        self.tool.is_some()
    }

    /// Whether the probe companion is available.
    pub fn probe_available(&self) -> bool {
        self.probe.is_some()
    }

    /// Probe a file's duration in seconds.
    ///
    /// Every failure mode (missing probe, timeout, unparseable output)
    /// reports 0.0, which classification maps to the shortest band.
    pub async fn probe_duration(&self, file: &Path) -> f64 {
        let Some(probe) = &self.probe else {
            return 0.0;
        };

        let output = Command::new(probe)
            .args(["-v", "quiet", "-show_entries", "format=duration", "-of", "csv=p=0"])
            .arg(file)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output();

        match tokio::time::timeout(PROBE_TIMEOUT, output).await {
            Ok(Ok(output)) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout)
                    .trim()
                    .parse()
                    .unwrap_or(0.0)
            }
            Ok(Ok(_)) | Ok(Err(_)) => 0.0,
            Err(_) => {
                tracing::warn!(file = %file.display(), "duration probe timed out");
                0.0
            }
        }
    }

    /// Rewrite a segment's timestamps to start at zero.
    pub async fn repair_segment(&self, input: &Path, output: &Path) -> Result<()> {
        let tool = self.tool.as_ref().ok_or(ExtractError::ToolMissing)?;
        let mut command = Command::new(tool);
        command
            .arg("-i")
            .arg(input)
            .args(["-c", "copy", "-bsf:v", "setts=ts=PTS-STARTPTS"])
            .arg(output)
            .arg("-y");
        self.run(command, output, REPAIR_TIMEOUT, "segment repair").await
    }

    /// Concatenate repaired segments (listed in `list_file`) into `output`
    /// without re-encoding.
    pub async fn concat(&self, list_file: &Path, output: &Path) -> Result<()> {
        let tool = self.tool.as_ref().ok_or(ExtractError::ToolMissing)?;
        let mut command = Command::new(tool);
        command
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(list_file)
            .args(["-c", "copy"])
            .arg(output)
            .arg("-y");
        self.run(command, output, CONCAT_TIMEOUT, "concat").await
    }

    async fn run(
        &self,
        mut command: Command,
        expected_output: &Path,
        timeout: Duration,
        what: &str,
    ) -> Result<()> {
        command.stdout(Stdio::null()).stderr(Stdio::piped());

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(ExtractError::ToolFailure(format!("{what}: {err}"))),
            Err(_) => return Err(ExtractError::ToolFailure(format!("{what} timed out"))),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::ToolFailure(format!(
                "{what} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if !expected_output.exists() {
            return Err(ExtractError::ToolFailure(format!(
                "{what} produced no output file"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_binaries_are_not_available() {
        let tool = MediaTool::default();
        assert!(!tool.available());
        assert!(!tool.probe_available());
    }

    #[tokio::test]
    async fn probe_without_binary_reports_zero() {
        let tool = MediaTool::default();
        assert_eq!(tool.probe_duration(Path::new("/nope")).await, 0.0);
    }

    #[tokio::test]
    async fn repair_without_binary_is_tool_missing() {
        let tool = MediaTool::default();
        let err = tool
            .repair_segment(Path::new("/in"), Path::new("/out"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::ToolMissing));
    }
}
