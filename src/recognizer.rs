//! Best-effort machine text for line crops
//!
//! The segmenter only depends on the [`TextRecognizer`] trait. The default
//! implementation shells out to the `tesseract` binary in single-line mode
//! and never runs longer than its configured timeout.

use image::RgbImage;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Default per-line time box
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Recognizer error types
#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("Text recognizer not available: {0}")]
    Unavailable(String),

    #[error("Text recognizer failed: {0}")]
    Failed(String),

    #[error("Text recognizer timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RecognizerError>;

/// Raster in, advisory text (or nothing) out
pub trait TextRecognizer: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Recognize one line crop; `Ok(None)` when nothing was read
    fn recognize(&self, line: &RgbImage) -> Result<Option<String>>;
}

/// Tesseract CLI (`--oem 1 --psm 7`)
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: PathBuf,
    timeout: Duration,
}

impl TesseractRecognizer {
    /// Locate `tesseract` on PATH
    pub fn locate() -> Result<Self> {
        let binary = which::which("tesseract")
            .map_err(|e| RecognizerError::Unavailable(format!("tesseract: {}", e)))?;
        Ok(Self::with_binary(binary))
    }

    /// Use an explicit binary path
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Normalize recognizer stdout: trimmed, `None` when empty
pub fn clean_output(raw: &str) -> Option<String> {
    let text = raw.trim();
    (!text.is_empty()).then(|| text.to_string())
}

impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, line: &RgbImage) -> Result<Option<String>> {
        let input = tempfile::Builder::new()
            .prefix("line-")
            .suffix(".png")
            .tempfile()?;
        line.save_with_format(input.path(), image::ImageFormat::Png)
            .map_err(|e| RecognizerError::Failed(format!("encode line crop: {}", e)))?;

        let mut child = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .args(["--oem", "1", "--psm", "7"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RecognizerError::Unavailable(format!("{}: {}", self.binary.display(), e)))?;

        // Both pipes are drained on helper threads so a chatty child cannot
        // block on a full pipe
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecognizerError::Failed("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RecognizerError::Failed("stderr not captured".into()))?;
        let out_reader = drain(stdout);
        let err_reader = drain(stderr);

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RecognizerError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let text = out_reader
            .join()
            .map_err(|_| RecognizerError::Failed("stdout reader panicked".into()))??;
        let stderr = err_reader
            .join()
            .map_err(|_| RecognizerError::Failed("stderr reader panicked".into()))?
            .unwrap_or_default();

        if !status.success() {
            return Err(RecognizerError::Failed(format!(
                "exit {}: {}",
                status,
                stderr.trim()
            )));
        }

        debug!(chars = text.len(), "Recognizer returned");
        Ok(clean_output(&text))
    }
}

/// Read a child pipe to the end on its own thread
fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<String>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}
