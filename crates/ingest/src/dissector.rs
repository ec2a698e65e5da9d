use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DissectorConfig {
    /// Executable invoked as `<program> -nlr <capture> -T json`.
    pub program: String,
    pub timeout_secs: u64,
}

impl Default for DissectorConfig {
    fn default() -> Self {
        Self {
            program: "tshark".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("capture file not found: {}", .0.display())]
    MissingCapture(PathBuf),

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed while waiting for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` failed with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("`{program}` produced no output for {}", capture.display())]
    EmptyOutput { program: String, capture: PathBuf },

    #[error("`{program}` did not finish within {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    /// Short instruction shown next to the error message.
    pub fn hint(&self) -> &'static str {
        match self {
            ConvertError::MissingCapture(_) => "Upload the capture again.",
            ConvertError::Spawn { .. } => {
                "Install Wireshark's tshark or point dissector.program at it in the config."
            }
            ConvertError::Wait { .. } => "Try the upload again.",
            ConvertError::ExitStatus { .. } | ConvertError::EmptyOutput { .. } => {
                "Check that the file is a readable pcap capture."
            }
            ConvertError::Timeout { .. } => {
                "The capture is too large to dissect in time; raise dissector.timeout_secs or trim the capture."
            }
            ConvertError::Write { .. } => "Check that the upload directory is writable.",
        }
    }
}

/// JSON sidecar written next to a capture: `<capture>.json`.
pub fn sidecar_path(capture: &Path) -> PathBuf {
    let mut name = OsString::from(capture.as_os_str());
    name.push(".json");
    PathBuf::from(name)
}

/// Runs the external packet dissector and stores its JSON output.
#[derive(Debug, Clone)]
pub struct Dissector {
    program: String,
    timeout: Duration,
}

impl Dissector {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &DissectorConfig) -> Self {
        Self::new(config.program.clone(), Duration::from_secs(config.timeout_secs))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Dissect `capture` into `json_path`.
    ///
    /// The child is spawned without a shell and killed if this future is dropped or
    /// the timeout elapses. A non-zero exit or empty stdout is an error, and no
    /// sidecar is left behind on failure.
    pub async fn convert(&self, capture: &Path, json_path: &Path) -> Result<(), ConvertError> {
        if !capture.is_file() {
            return Err(ConvertError::MissingCapture(capture.to_path_buf()));
        }

        let child = Command::new(&self.program)
            .arg("-nlr")
            .arg(capture)
            .args(["-T", "json"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConvertError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ConvertError::Timeout {
                program: self.program.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| ConvertError::Wait {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::warn!(
                program = %self.program,
                capture = %capture.display(),
                status = %output.status,
                "Dissector exited unsuccessfully"
            );
            return Err(ConvertError::ExitStatus {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr,
            });
        }

        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(ConvertError::EmptyOutput {
                program: self.program.clone(),
                capture: capture.to_path_buf(),
            });
        }

        if let Err(source) = tokio::fs::write(json_path, &output.stdout).await {
            let _ = tokio::fs::remove_file(json_path).await;
            return Err(ConvertError::Write {
                path: json_path.to_path_buf(),
                source,
            });
        }

        tracing::info!(
            capture = %capture.display(),
            json = %json_path.display(),
            bytes = output.stdout.len(),
            "Converted capture to JSON"
        );
        Ok(())
    }
}
