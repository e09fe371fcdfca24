// SPDX-License-Identifier: MIT
//! Analyzer runner — spawn the external type checker against a synchronized
//! working tree and capture its findings.
//!
//! The checker exiting non-zero is the normal "findings present" case; only
//! a failure to spawn or a timeout is an error.

pub mod diagnostic;

use std::path::Path;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::RepoOptions;

/// Maximum captured stdout size (64 KiB). Prevents OOM from runaway checker
/// output on pathological trees.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("failed to spawn `{bin}`: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{bin}` timed out after {timeout_secs}s")]
    Timeout { bin: String, timeout_secs: u64 },
}

/// Runs the configured type checker as a subprocess.
pub struct Analyzer {
    bin: String,
    timeout: Duration,
}

impl Analyzer {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    /// Run the checker against `tree` with the repository's configured
    /// starting points and extra options, returning raw stdout.
    ///
    /// The subprocess dies with the enclosing delivery (`kill_on_drop`), so
    /// a cancelled or retried webhook delivery never leaks a checker.
    pub async fn run(&self, tree: &Path, opts: &RepoOptions) -> Result<String, AnalyzerError> {
        let mut cmd = Command::new(&self.bin);
        for opt in opts.additional_opts.split_whitespace() {
            cmd.arg(opt);
        }
        for start in &opts.starting_points {
            cmd.arg(start);
        }
        cmd.current_dir(tree).kill_on_drop(true);

        debug!(bin = %self.bin, tree = %tree.display(), "running checker");
        let started = Instant::now();

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| AnalyzerError::Timeout {
                bin: self.bin.clone(),
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|source| AnalyzerError::Spawn {
                bin: self.bin.clone(),
                source,
            })?;

        // Exit 0 = clean, exit 1 = findings; anything else usually means the
        // checker itself choked — still report what it printed.
        if !matches!(output.status.code(), Some(0) | Some(1)) {
            let stderr_preview =
                String::from_utf8_lossy(&output.stderr[..output.stderr.len().min(512)]);
            warn!(bin = %self.bin, code = ?output.status.code(), stderr = %stderr_preview,
                "checker exited abnormally");
        }

        let raw = if output.stdout.len() > MAX_OUTPUT_BYTES {
            warn!(bin = %self.bin, bytes = output.stdout.len(), "truncating large checker output");
            String::from_utf8_lossy(&output.stdout[..MAX_OUTPUT_BYTES]).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = raw.len(),
            "checker finished"
        );
        Ok(raw)
    }
}
