//! Device probes: where battery readings come from.
//!
//! The Bluetooth work happens in an external helper. [`CommandProbe`] runs
//! it with a timeout and decodes a single JSON object from its stdout:
//!
//! ```json
//! {"battery": 83, "isConnected": true, "confidence": 1.0,
//!  "sources": ["primary"], "issue": null}
//! ```
//!
//! Every failure is folded into a [`ProbeResult`] carrying a [`ProbeIssue`];
//! a probe never fails the cycle.

use async_trait::async_trait;
use kbtrack_core::{ConnectivityAssessment, ProbeIssue, ProbeResult, SignalSource};
use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ProbeCommand;

/// Environment variable carrying the keyboard address to the helper.
pub const DEVICE_ADDRESS_ENV: &str = "KBTRACK_DEVICE_ADDRESS";

/// Source of one battery reading per cycle.
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn probe(&self) -> ProbeResult;
}

/// Why the helper produced no usable result.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to run probe {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Probe exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("Invalid probe output: {0}")]
    Output(String),
}

impl ProbeError {
    /// The issue the state machine sees for this failure.
    pub fn issue(&self) -> ProbeIssue {
        match self {
            Self::Spawn { .. } => ProbeIssue::Unavailable,
            Self::Timeout(_) => ProbeIssue::Timeout,
            Self::Exit { .. } | Self::Output(_) => ProbeIssue::Unknown,
        }
    }
}

/// Helper stdout contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProbeOutput {
    #[serde(default)]
    battery: Option<i64>,
    #[serde(default)]
    is_connected: bool,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    sources: Vec<SignalSource>,
    #[serde(default)]
    issue: Option<ProbeIssue>,
}

impl RawProbeOutput {
    fn into_result(self) -> Result<ProbeResult, ProbeError> {
        let confidence = self
            .confidence
            .unwrap_or(if self.battery.is_some() { 1.0 } else { 0.0 });
        let connectivity =
            ConnectivityAssessment::new(self.is_connected, confidence, self.sources, self.issue);
        match self.battery {
            Some(battery) => ProbeResult::with_battery(battery, connectivity)
                .map_err(|e| ProbeError::Output(e.to_string())),
            None => Ok(ProbeResult::unavailable(connectivity)),
        }
    }
}

/// Decodes the helper's stdout. The last non-empty line is used so helpers
/// may print diagnostics first.
pub fn parse_probe_output(stdout: &str) -> Result<ProbeResult, ProbeError> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| ProbeError::Output("empty output".to_string()))?;
    let raw: RawProbeOutput =
        serde_json::from_str(line).map_err(|e| ProbeError::Output(e.to_string()))?;
    raw.into_result()
}

// ============================================================================
// Command Probe
// ============================================================================

/// Runs an external helper program once per cycle.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: ProbeCommand,
    timeout: Duration,
    device_address: Option<String>,
}

impl CommandProbe {
    pub fn new(command: ProbeCommand, timeout: Duration, device_address: Option<String>) -> Self {
        Self {
            command,
            timeout,
            device_address,
        }
    }

    /// Runs the helper, returning the raw failure on error.
    pub async fn run(&self) -> Result<ProbeResult, ProbeError> {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(address) = &self.device_address {
            cmd.env(DEVICE_ADDRESS_ENV, address);
        }

        let child = cmd.spawn().map_err(|source| ProbeError::Spawn {
            program: self.command.program.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ProbeError::Spawn {
                    program: self.command.program.clone(),
                    source,
                })
            }
            Err(_) => return Err(ProbeError::Timeout(self.timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_probe_output(&stdout) {
            Ok(result) => Ok(result),
            Err(parse_err) if !output.status.success() => Err(ProbeError::Exit {
                status: output.status.to_string(),
                stderr: {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    if stderr.is_empty() {
                        parse_err.to_string()
                    } else {
                        stderr
                    }
                },
            }),
            Err(parse_err) => Err(parse_err),
        }
    }
}

#[async_trait]
impl DeviceProbe for CommandProbe {
    async fn probe(&self) -> ProbeResult {
        match self.run().await {
            Ok(result) => {
                debug!(
                    battery = ?result.battery,
                    connected = result.connectivity.is_connected,
                    confidence = result.connectivity.confidence,
                    "Probe completed"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, "Probe failed");
                ProbeResult::unavailable(ConnectivityAssessment::failed(e.issue()))
            }
        }
    }
}

// ============================================================================
// Fixed Probe
// ============================================================================

/// Always returns the same result.
///
/// Backs `kbtrackd run --battery N` and stands in when no helper is
/// configured.
#[derive(Debug, Clone)]
pub struct FixedProbe(pub ProbeResult);

impl FixedProbe {
    pub fn battery(battery: u8) -> Self {
        Self(ProbeResult::reading(battery))
    }

    pub fn unavailable(issue: ProbeIssue) -> Self {
        Self(ProbeResult::unavailable(ConnectivityAssessment::failed(
            issue,
        )))
    }
}

#[async_trait]
impl DeviceProbe for FixedProbe {
    async fn probe(&self) -> ProbeResult {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_for(script: &str, timeout: Duration) -> CommandProbe {
        CommandProbe::new(
            ProbeCommand {
                program: PathBuf::from("/bin/sh"),
                args: vec!["-c".to_string(), script.to_string()],
            },
            timeout,
            Some("FC:00:72:C2:AC:AF".to_string()),
        )
    }

    #[test]
    fn test_parse_reading() {
        let result = parse_probe_output(
            r#"{"battery": 83, "isConnected": true, "confidence": 1.0, "sources": ["primary"]}"#,
        )
        .unwrap();
        assert_eq!(result.battery, Some(83));
        assert!(result.connectivity.is_connected);
        assert!(result.connectivity.sources.contains(&SignalSource::Primary));
    }

    #[test]
    fn test_parse_unavailable_with_issue() {
        let result = parse_probe_output(
            "scanning...\n{\"battery\": null, \"isConnected\": false, \"confidence\": 0.2, \"issue\": \"peripheralNotFound\"}\n",
        )
        .unwrap();
        assert_eq!(result.battery, None);
        assert_eq!(
            result.connectivity.issue,
            Some(ProbeIssue::PeripheralNotFound)
        );
        assert_eq!(result.connectivity.confidence, 0.2);
    }

    #[test]
    fn test_parse_rejects_out_of_range_battery() {
        let err = parse_probe_output(r#"{"battery": 140, "isConnected": true}"#).unwrap_err();
        assert_eq!(err.issue(), ProbeIssue::Unknown);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_probe_output("").is_err());
        assert!(parse_probe_output("battery=83").is_err());
    }

    #[test]
    fn test_error_issue_mapping() {
        let spawn = ProbeError::Spawn {
            program: PathBuf::from("/nope"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(spawn.issue(), ProbeIssue::Unavailable);
        assert_eq!(
            ProbeError::Timeout(Duration::from_secs(10)).issue(),
            ProbeIssue::Timeout
        );
        assert_eq!(
            ProbeError::Output("bad".to_string()).issue(),
            ProbeIssue::Unknown
        );
    }

    #[tokio::test]
    async fn test_command_probe_reads_stdout() {
        let probe = probe_for(
            r#"echo "{\"battery\": 61, \"isConnected\": true, \"confidence\": 0.9, \"sources\": [\"primary\", \"secondary\"]}""#,
            Duration::from_secs(5),
        );
        let result = probe.probe().await;
        assert_eq!(result.battery, Some(61));
        assert_eq!(result.connectivity.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_command_probe_passes_device_address() {
        let probe = probe_for(
            r#"echo "{\"battery\": null, \"isConnected\": false, \"issue\": \"$KBTRACK_DEVICE_ADDRESS\"}""#,
            Duration::from_secs(5),
        );
        // The address is not a known issue name, so it decodes as unknown.
        let result = probe.run().await.unwrap();
        assert_eq!(result.connectivity.issue, Some(ProbeIssue::Unknown));
    }

    #[tokio::test]
    async fn test_command_probe_timeout() {
        let probe = probe_for("sleep 5", Duration::from_millis(100));
        let err = probe.run().await.unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(_)));

        let result = probe.probe().await;
        assert_eq!(result.battery, None);
        assert_eq!(result.connectivity.issue, Some(ProbeIssue::Timeout));
    }

    #[tokio::test]
    async fn test_command_probe_missing_program() {
        let probe = CommandProbe::new(
            ProbeCommand {
                program: PathBuf::from("/nonexistent/kb-probe"),
                args: Vec::new(),
            },
            Duration::from_secs(1),
            None,
        );
        let result = probe.probe().await;
        assert_eq!(result.connectivity.issue, Some(ProbeIssue::Unavailable));
    }

    #[tokio::test]
    async fn test_command_probe_bad_output() {
        let probe = probe_for("echo not-json", Duration::from_secs(5));
        let result = probe.probe().await;
        assert_eq!(result.connectivity.issue, Some(ProbeIssue::Unknown));
    }

    #[tokio::test]
    async fn test_command_probe_failed_exit_reports_stderr() {
        let probe = probe_for("echo radio off >&2; exit 3", Duration::from_secs(5));
        match probe.run().await.unwrap_err() {
            ProbeError::Exit { stderr, .. } => assert_eq!(stderr, "radio off"),
            other => panic!("expected exit error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fixed_probe() {
        assert_eq!(FixedProbe::battery(77).probe().await.battery, Some(77));
        let result = FixedProbe::unavailable(ProbeIssue::PoweredOff).probe().await;
        assert_eq!(result.connectivity.issue, Some(ProbeIssue::PoweredOff));
    }
}
