//! Process and per-repository configuration.
//!
//! `BotConfig` is assembled once in `main` from CLI flags and environment.
//! `RepoOptions` is read fresh from each synchronized working tree, and can
//! never fail — a repository with broken configuration still gets reviewed,
//! just with defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Table looked up inside the reviewed repository's `pyproject.toml`.
const REPO_OPTIONS_TABLE: &str = "typecheckd";

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub port: u16,
    pub bind_address: String,
    /// Directory reviewed repositories are cloned under, one working tree
    /// per `owner/name`.
    pub repos_dir: PathBuf,
    /// Webhook HMAC secret shared with the GitHub App settings.
    pub webhook_secret: String,
    /// GitHub App id (the JWT `iss` claim).
    pub app_id: String,
    /// GitHub App private key, PEM.
    pub private_key: String,
    /// The bot's own user id — reviews by any other author are ignored when
    /// reconstructing prior state.
    pub bot_user_id: u64,
    pub api_base: String,
    /// Type checker binary to invoke.
    pub checker_bin: String,
    pub checker_timeout_secs: u64,
}

/// Per-repository analyzer options, from `[tool.typecheckd]` in the
/// repository's own `pyproject.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepoOptions {
    /// Paths handed to the checker as its analysis roots.
    pub starting_points: Vec<String>,
    /// Extra checker flags, whitespace-separated.
    pub additional_opts: String,
}

impl Default for RepoOptions {
    fn default() -> Self {
        Self {
            starting_points: vec![".".to_string()],
            additional_opts: String::new(),
        }
    }
}

impl RepoOptions {
    /// Read options from the working tree at `tree`.
    ///
    /// Never fails: a missing file, invalid TOML, a missing table, or bogus
    /// field values each log a warning and fall back to defaults.
    pub fn load(tree: &Path) -> Self {
        let path = tree.join("pyproject.toml");
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => {
                warn!(path = %path.display(), "no pyproject.toml — using default checker options");
                return Self::default();
            }
        };
        let value: toml::Value = match raw.parse() {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), err = %e, "invalid pyproject.toml — using default checker options");
                return Self::default();
            }
        };
        let Some(table) = value
            .get("tool")
            .and_then(|tool| tool.get(REPO_OPTIONS_TABLE))
        else {
            warn!(path = %path.display(), "no [tool.{REPO_OPTIONS_TABLE}] table — using default checker options");
            return Self::default();
        };
        match table.clone().try_into() {
            Ok(options) => options,
            Err(e) => {
                warn!(path = %path.display(), err = %e, "bad [tool.{REPO_OPTIONS_TABLE}] values — using default checker options");
                Self::default()
            }
        }
    }
}
