//! Packet capture of camera traffic.
//!
//! Capture itself is delegated to an external tool. [`CaptureFacility`] is
//! the seam: [`Tcpdump`] drives the real `tcpdump` binary, while
//! [`FakeCapture`] writes a fixed artifact for a fixed filter so the flow
//! can be exercised without privileges or a network.
//!
//! Artifacts are named `camera_capture_YYYYmmdd_HHMMSS.pcap` after the local
//! time the capture started.
//!
//! # Requirements
//!
//! Live capture usually needs root. [`running_as_root`] lets callers warn
//! before starting.
//!
//! # Example
//!
//! ```no_run
//! use camwire_core::capture::{capture_then_analyze, CaptureFilter, CaptureRequest, Tcpdump};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let request = CaptureRequest {
//!     interface: "any".into(),
//!     duration: Duration::from_secs(30),
//!     filter: CaptureFilter::new("192.168.1.104", vec![6123, 80]),
//!     output_dir: ".".into(),
//!     use_sudo: true,
//! };
//! let report = capture_then_analyze(&Tcpdump::default(), &request, CancellationToken::new(), true).await?;
//! if let Some(summary) = report.summary {
//!     println!("{summary}");
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const ARTIFACT_PREFIX: &str = "camera_capture_";
const ARTIFACT_EXT: &str = "pcap";

/// How long a capture process gets to exit after SIGTERM before it is killed.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Global header of an empty little-endian pcap file (Ethernet, 64 KiB snaplen).
pub const EMPTY_PCAP: [u8; 24] = [
    0xd4, 0xc3, 0xb2, 0xa1, // magic
    0x02, 0x00, 0x04, 0x00, // version 2.4
    0x00, 0x00, 0x00, 0x00, // thiszone
    0x00, 0x00, 0x00, 0x00, // sigfigs
    0xff, 0xff, 0x00, 0x00, // snaplen
    0x01, 0x00, 0x00, 0x00, // linktype
];

/// Errors from capturing or analyzing traffic.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The capture or analysis tool exited unsuccessfully.
    #[error("capture tool failed: {0}")]
    ToolFailed(String),

    /// The tool stopped cleanly but left no capture file behind.
    #[error("capture artifact not found: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// A fake capture was asked for traffic it does not have.
    #[error("no capture recorded for filter `{actual}` (expected `{expected}`)")]
    FilterMismatch { expected: String, actual: String },
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Host/port filter selecting the camera's traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFilter {
    pub host: String,
    pub ports: Vec<u16>,
}

impl CaptureFilter {
    pub fn new(host: impl Into<String>, ports: Vec<u16>) -> Self {
        Self {
            host: host.into(),
            ports,
        }
    }

    /// The filter as a pcap expression, e.g. `host 10.0.0.2 and (port 80 or port 443)`.
    pub fn expression(&self) -> String {
        if self.ports.is_empty() {
            return format!("host {}", self.host);
        }
        let ports = self
            .ports
            .iter()
            .map(|p| format!("port {p}"))
            .collect::<Vec<_>>()
            .join(" or ");
        format!("host {} and ({ports})", self.host)
    }

    /// The expression split into command-line arguments.
    pub fn to_args(&self) -> Vec<String> {
        self.expression()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

impl fmt::Display for CaptureFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}

/// Parameters for one capture run.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub interface: String,
    pub duration: Duration,
    pub filter: CaptureFilter,
    /// Directory the artifact is written to.
    pub output_dir: PathBuf,
    pub use_sudo: bool,
}

impl CaptureRequest {
    /// Where a capture started at `started` is written.
    pub fn artifact_path(&self, started: DateTime<Local>) -> PathBuf {
        self.output_dir.join(artifact_name(started))
    }
}

/// Artifact file name for a capture started at `started`.
pub fn artifact_name(started: DateTime<Local>) -> String {
    format!(
        "{ARTIFACT_PREFIX}{}.{ARTIFACT_EXT}",
        started.format("%Y%m%d_%H%M%S")
    )
}

/// The most recent capture artifact in `dir`, if any.
///
/// Names embed a sortable timestamp, so the newest artifact is the
/// lexicographically greatest file name.
pub fn latest_artifact(dir: &Path) -> Option<PathBuf> {
    let pattern = format!(
        "{}/{ARTIFACT_PREFIX}*.{ARTIFACT_EXT}",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    glob::glob(&pattern)
        .ok()?
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .max_by(|a, b| a.file_name().cmp(&b.file_name()))
}

/// Returns `true` if the current user is root.
pub async fn running_as_root() -> bool {
    Command::new("id")
        .arg("-u")
        .output()
        .await
        .map(|o| String::from_utf8_lossy(&o.stdout).trim() == "0")
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// CaptureFacility
// ---------------------------------------------------------------------------

/// How a capture run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The capture ran its full duration and wrote this artifact.
    Completed(PathBuf),
    /// The capture was cancelled before its duration elapsed.
    Interrupted,
}

/// Something that can record traffic and summarize a recording.
#[async_trait]
pub trait CaptureFacility: Send + Sync {
    /// Record traffic matching `request` until its duration elapses or
    /// `cancel` fires.
    async fn capture(
        &self,
        request: &CaptureRequest,
        cancel: CancellationToken,
    ) -> Result<CaptureOutcome, CaptureError>;

    /// Produce a textual packet summary of an artifact.
    async fn analyze(&self, artifact: &Path) -> Result<String, CaptureError>;
}

/// Result of [`capture_then_analyze`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    pub outcome: CaptureOutcome,
    /// Packet summary, present when the capture completed and analysis ran.
    pub summary: Option<String>,
}

/// Capture, then analyze the newest artifact in the output directory.
///
/// An interrupted capture is never analyzed.
pub async fn capture_then_analyze(
    facility: &dyn CaptureFacility,
    request: &CaptureRequest,
    cancel: CancellationToken,
    analyze: bool,
) -> Result<CaptureReport, CaptureError> {
    let outcome = facility.capture(request, cancel).await?;
    let summary = match &outcome {
        CaptureOutcome::Completed(artifact) if analyze => {
            let target = latest_artifact(&request.output_dir).unwrap_or_else(|| artifact.clone());
            Some(facility.analyze(&target).await?)
        }
        _ => None,
    };
    Ok(CaptureReport { outcome, summary })
}

// ---------------------------------------------------------------------------
// Tcpdump
// ---------------------------------------------------------------------------

/// [`CaptureFacility`] backed by the `tcpdump` binary.
#[derive(Debug, Clone)]
pub struct Tcpdump {
    program: String,
    grace: Duration,
}

impl Default for Tcpdump {
    fn default() -> Self {
        Self {
            program: "tcpdump".to_string(),
            grace: STOP_GRACE,
        }
    }
}

enum Waited {
    Elapsed,
    Cancelled,
    Exited(ExitStatus),
}

impl Tcpdump {
    /// Use a different binary (e.g. an absolute path to tcpdump).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Full argv for capturing `request` into `output`.
    pub fn command_line(&self, request: &CaptureRequest, output: &Path) -> Vec<String> {
        let mut argv = Vec::new();
        if request.use_sudo {
            argv.push("sudo".to_string());
        }
        argv.push(self.program.clone());
        argv.extend(["-v", "-i"].map(String::from));
        argv.push(request.interface.clone());
        argv.push("-w".to_string());
        argv.push(output.to_string_lossy().into_owned());
        argv.extend(request.filter.to_args());
        argv
    }

    /// Ask the process to stop, killing it if it lingers.
    async fn stop(&self, child: &mut Child) -> Result<(), CaptureError> {
        if let Some(pid) = child.id() {
            let signalled = Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .status()
                .await;
            if let Err(e) = signalled {
                warn!(pid, error = %e, "failed to signal capture process");
            }
        }

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(?status, "capture process exited");
            }
            Err(_) => {
                warn!(grace_ms = self.grace.as_millis() as u64, "capture process ignored SIGTERM, killing");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

async fn read_stderr(child: &mut Child) -> String {
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr).await;
    }
    stderr.trim().to_string()
}

#[async_trait]
impl CaptureFacility for Tcpdump {
    async fn capture(
        &self,
        request: &CaptureRequest,
        cancel: CancellationToken,
    ) -> Result<CaptureOutcome, CaptureError> {
        let output = request.artifact_path(Local::now());
        let argv = self.command_line(request, &output);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CaptureError::ToolFailed("empty command line".into()))?;

        info!(
            command = %argv.join(" "),
            duration_secs = request.duration.as_secs(),
            "starting capture"
        );

        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let waited = tokio::select! {
            _ = cancel.cancelled() => Waited::Cancelled,
            _ = tokio::time::sleep(request.duration) => Waited::Elapsed,
            status = child.wait() => Waited::Exited(status?),
        };

        match waited {
            Waited::Cancelled => {
                self.stop(&mut child).await?;
                info!("capture interrupted");
                return Ok(CaptureOutcome::Interrupted);
            }
            Waited::Elapsed => self.stop(&mut child).await?,
            Waited::Exited(status) => {
                let stderr = read_stderr(&mut child).await;
                if !status.success() {
                    let reason = if stderr.is_empty() {
                        format!("{program} exited with {status}")
                    } else {
                        stderr
                    };
                    return Err(CaptureError::ToolFailed(reason));
                }
                warn!("capture tool exited before the capture window closed");
            }
        }

        if !output.is_file() {
            return Err(CaptureError::ArtifactMissing(output));
        }
        info!(artifact = %output.display(), "capture completed");
        Ok(CaptureOutcome::Completed(output))
    }

    async fn analyze(&self, artifact: &Path) -> Result<String, CaptureError> {
        debug!(artifact = %artifact.display(), "analyzing capture");
        let output = Command::new(&self.program)
            .args(["-v", "-r"])
            .arg(artifact)
            .output()
            .await?;

        if !output.status.success() {
            return Err(CaptureError::ToolFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ---------------------------------------------------------------------------
// FakeCapture
// ---------------------------------------------------------------------------

/// In-process [`CaptureFacility`] that writes fixed bytes for one filter.
#[derive(Debug)]
pub struct FakeCapture {
    filter: CaptureFilter,
    contents: Vec<u8>,
    requests: Mutex<Vec<CaptureRequest>>,
}

impl FakeCapture {
    /// A fake that answers `filter` with an empty pcap file.
    pub fn new(filter: CaptureFilter) -> Self {
        Self {
            filter,
            contents: EMPTY_PCAP.to_vec(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_contents(mut self, contents: impl Into<Vec<u8>>) -> Self {
        self.contents = contents.into();
        self
    }

    /// Every request seen so far, oldest first.
    pub fn requests(&self) -> Vec<CaptureRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CaptureFacility for FakeCapture {
    async fn capture(
        &self,
        request: &CaptureRequest,
        cancel: CancellationToken,
    ) -> Result<CaptureOutcome, CaptureError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if request.filter != self.filter {
            return Err(CaptureError::FilterMismatch {
                expected: self.filter.expression(),
                actual: request.filter.expression(),
            });
        }
        if cancel.is_cancelled() {
            return Ok(CaptureOutcome::Interrupted);
        }

        let output = request.artifact_path(Local::now());
        tokio::fs::create_dir_all(&request.output_dir).await?;
        tokio::fs::write(&output, &self.contents).await?;
        Ok(CaptureOutcome::Completed(output))
    }

    async fn analyze(&self, artifact: &Path) -> Result<String, CaptureError> {
        let bytes = tokio::fs::read(artifact).await?;
        Ok(format!(
            "{}: {} bytes for `{}`",
            artifact.display(),
            bytes.len(),
            self.filter
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
