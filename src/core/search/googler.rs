use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::SearchProvider;
use crate::core::error::ProbeError;

/// Runs a googler-compatible command (`<cmd> <keyword> -n <limit> --json`)
/// and reads the JSON array it prints.
pub struct GooglerProvider {
    command: String,
    extra_args: Vec<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    url: String,
}

impl GooglerProvider {
    pub fn new(command: String, extra_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command,
            extra_args,
            timeout,
        }
    }
}

#[async_trait]
impl SearchProvider for GooglerProvider {
    async fn search(&self, keyword: &str, limit: u32) -> Result<Vec<String>, ProbeError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.extra_args)
            .arg("-n")
            .arg(limit.to_string())
            .arg("--json")
            .arg(keyword)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out probe drops the future; the child goes with it.
            .kill_on_drop(true);

        debug!("Running {} for '{}' (limit {})", self.command, keyword, limit);
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| ProbeError::Spawn {
                command: self.command.clone(),
                source,
            })?,
            Err(_) => return Err(ProbeError::Timeout(self.timeout.as_secs())),
        };

        if !output.status.success() {
            return Err(ProbeError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let hits: Vec<SearchHit> = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProbeError::Malformed(e.to_string()))?;
        Ok(hits
            .into_iter()
            .take(limit as usize)
            .map(|h| h.url)
            .collect())
    }
}
