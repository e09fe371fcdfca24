// SPDX-License-Identifier: MIT
//! Repository synchronizer — local working trees for analysis.
//!
//! One clone per `owner/name` under the repos directory. Checkout mutates
//! shared on-disk state, so deliveries touching the same repository
//! serialize behind a per-repo lock; deliveries for different repositories
//! proceed in parallel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{BranchType, Cred, FetchOptions, RemoteCallbacks, Repository};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::github::token::TokenCache;

/// Total sync attempts per delivery. The second attempt runs against a
/// fresh clone and a fresh token; if that also fails the delivery fails.
const SYNC_ATTEMPTS: u32 = 2;

const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Clone or fetch failed — usually an expired installation token.
    #[error("fetch failed: {0}")]
    Fetch(git2::Error),
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    #[error("fetch kept failing after {attempts} attempts with refreshed credentials")]
    AuthExhausted { attempts: u32 },
    #[error("working tree io: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Internal(anyhow::Error),
}

/// Manages clones of reviewed repositories and the per-repo locks that
/// serialize access to them.
pub struct RepoManager {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RepoManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Where `owner/name` lives on disk.
    pub fn tree_path(&self, repo: &str) -> PathBuf {
        self.root.join(repo)
    }

    /// Synchronize `repo` so both refs are at their remote tips, leaving the
    /// tree checked out at `head_ref`. Returns the working tree path.
    pub async fn synchronize(
        &self,
        tokens: &TokenCache,
        installation: u64,
        repo: &str,
        base_ref: &str,
        head_ref: &str,
    ) -> Result<PathBuf, SyncError> {
        self.sync_with_refs(
            tokens,
            installation,
            repo,
            vec![base_ref.to_string(), head_ref.to_string()],
        )
        .await
    }

    /// Clone `repo` if it is not on disk yet (used when an installation is
    /// created, so first reviews start warm). No checkout.
    pub async fn ensure_cloned(
        &self,
        tokens: &TokenCache,
        installation: u64,
        repo: &str,
    ) -> Result<PathBuf, SyncError> {
        self.sync_with_refs(tokens, installation, repo, Vec::new())
            .await
    }

    async fn sync_with_refs(
        &self,
        tokens: &TokenCache,
        installation: u64,
        repo: &str,
        checkout_refs: Vec<String>,
    ) -> Result<PathBuf, SyncError> {
        let lock = self.lock_for(repo).await;
        let _guard = lock.lock().await;

        let path = self.tree_path(repo);
        for attempt in 1..=SYNC_ATTEMPTS {
            let token = tokens
                .installation_token(installation)
                .await
                .map_err(SyncError::Internal)?;

            let task_path = path.clone();
            let task_repo = repo.to_string();
            let task_refs = checkout_refs.clone();
            let result = tokio::task::spawn_blocking(move || {
                sync_tree(&task_path, &task_repo, &token, &task_refs)
            })
            .await
            .map_err(|e| SyncError::Internal(anyhow::anyhow!("sync worker crashed: {e}")))?;

            match result {
                Ok(()) => return Ok(path),
                Err(SyncError::Fetch(err)) if attempt < SYNC_ATTEMPTS => {
                    // The stored clone or the cached token has gone bad.
                    // Discard both and resync — bounded, a persistently bad
                    // credential must fail the delivery rather than loop.
                    warn!(repo, attempt, err = %err, "fetch failed — discarding clone and retrying");
                    tokens.invalidate(installation).await;
                    if path.exists() {
                        std::fs::remove_dir_all(&path)?;
                    }
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(SyncError::Fetch(err)) => {
                    warn!(repo, err = %err, "fetch still failing with fresh credentials");
                    return Err(SyncError::AuthExhausted {
                        attempts: SYNC_ATTEMPTS,
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Err(SyncError::AuthExhausted {
            attempts: SYNC_ATTEMPTS,
        })
    }

    async fn lock_for(&self, repo: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(repo.to_string())
            .or_default()
            .clone()
    }
}

// ─── Blocking git plumbing ────────────────────────────────────────────────────

fn auth_callbacks(token: &str) -> RemoteCallbacks<'static> {
    let token = token.to_string();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, _username, _allowed| {
        Cred::userpass_plaintext("x-access-token", &token)
    });
    callbacks
}

fn fetch_options(token: &str) -> FetchOptions<'static> {
    let mut options = FetchOptions::new();
    options.remote_callbacks(auth_callbacks(token));
    options
}

fn sync_tree(
    path: &std::path::Path,
    repo: &str,
    token: &str,
    checkout_refs: &[String],
) -> Result<(), SyncError> {
    let handle = if path.exists() {
        // A clone that no longer opens is treated like a failed fetch so the
        // caller discards it and starts over.
        Repository::open(path).map_err(SyncError::Fetch)?
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!(repo, "cloning repository");
        RepoBuilder::new()
            .fetch_options(fetch_options(token))
            .clone(&format!("https://github.com/{repo}.git"), path)
            .map_err(SyncError::Fetch)?
    };

    // Fetch every branch so both the base and head refs resolve.
    {
        let mut remote = handle.find_remote("origin")?;
        remote
            .fetch(
                &["+refs/heads/*:refs/remotes/origin/*"],
                Some(&mut fetch_options(token)),
                None,
            )
            .map_err(SyncError::Fetch)?;
    }

    for reference in checkout_refs {
        checkout_branch(&handle, reference)?;
        info!(repo, branch = %reference, "checked out");
    }
    Ok(())
}

/// Force the local branch to the fetched remote tip and check it out.
fn checkout_branch(repo: &Repository, name: &str) -> Result<(), git2::Error> {
    let remote_branch = repo.find_branch(&format!("origin/{name}"), BranchType::Remote)?;
    let target = remote_branch.get().peel_to_commit()?;
    // Detach HEAD first — libgit2 refuses to force-move the branch that is
    // currently checked out.
    repo.set_head_detached(target.id())?;
    repo.branch(name, &target, true)?;
    repo.set_head(&format!("refs/heads/{name}"))?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))?;
    Ok(())
}
