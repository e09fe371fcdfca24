//! GitHub REST client — the forge side of a reconciliation pass.
//!
//! The pipeline talks to the [`Forge`] trait; [`GithubClient`] is its
//! production implementation. Auth is a cached installation access token
//! (see [`token`]); a 401 invalidates the cache and replays the call once
//! with a fresh token, while rate limits and server errors retry with
//! bounded backoff.

pub mod token;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::retry::{retry_with_backoff, RetryConfig};
use token::TokenCache;

const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_DIFF: &str = "application/vnd.github.diff";

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Actor {
    pub id: u64,
    pub login: String,
}

/// A pull-request review, as much of it as reconciliation needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Review {
    pub id: u64,
    pub user: Actor,
}

/// An inline review comment.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewComment {
    pub id: u64,
    pub body: String,
}

/// One inline comment inside a review submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftComment {
    pub path: String,
    pub position: u64,
    pub body: String,
}

/// A review submission: one summary body plus its inline comments.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewSubmission {
    pub body: String,
    pub commit_id: String,
    pub event: String,
    pub comments: Vec<DraftComment>,
}

// ─── Forge trait ──────────────────────────────────────────────────────────────

/// Review-thread operations the reconciliation pipeline needs from the forge.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Unified diff of the pull request.
    async fn pr_diff(&self, installation: u64, repo: &str, pr: u64) -> Result<String>;
    /// Reviews on the pull request authored by this bot.
    async fn bot_reviews(&self, installation: u64, repo: &str, pr: u64) -> Result<Vec<Review>>;
    /// All inline review comments on the pull request.
    async fn pr_comments(&self, installation: u64, repo: &str, pr: u64)
        -> Result<Vec<ReviewComment>>;
    /// Submit one review with inline comments.
    async fn post_review(
        &self,
        installation: u64,
        repo: &str,
        pr: u64,
        review: &ReviewSubmission,
    ) -> Result<()>;
    /// Rewrite an inline comment's body.
    async fn update_comment(
        &self,
        installation: u64,
        repo: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<()>;
}

// ─── Production client ────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{url} returned {status}")]
    Status { status: StatusCode, url: String },
    #[error("token: {0}")]
    Token(anyhow::Error),
}

/// 429 and 5xx are worth another try; everything else is the caller's
/// problem. 401 never reaches this classifier — it is handled inline by the
/// token-refresh replay.
fn is_transient(err: &RequestError) -> bool {
    match err {
        RequestError::Transport(_) => true,
        RequestError::Status { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        RequestError::Token(_) => false,
    }
}

pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    bot_user_id: u64,
    tokens: Arc<TokenCache>,
    retry: RetryConfig,
}

impl GithubClient {
    pub fn new(
        http: reqwest::Client,
        api_base: String,
        bot_user_id: u64,
        tokens: Arc<TokenCache>,
    ) -> Self {
        Self {
            http,
            api_base,
            bot_user_id,
            tokens,
            retry: RetryConfig::default(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Perform one authenticated request, replaying once on 401 with a
    /// fresh token, and retrying transient failures with backoff.
    async fn send<B>(&self, installation: u64, build: B) -> Result<reqwest::Response, RequestError>
    where
        B: Fn(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    {
        let http = &self.http;
        let tokens = &self.tokens;
        let build = &build;
        retry_with_backoff(&self.retry, is_transient, move || async move {
            let token = tokens
                .installation_token(installation)
                .await
                .map_err(RequestError::Token)?;

            let response = build(http, &token).send().await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                // Expired installation token ahead of its TTL: refresh via
                // the single-flight cache and replay exactly once.
                tokens.invalidate(installation).await;
                let token = tokens
                    .installation_token(installation)
                    .await
                    .map_err(RequestError::Token)?;
                let response = build(http, &token).send().await?;
                return check(response);
            }
            check(response)
        })
        .await
    }
}

fn check(response: reqwest::Response) -> Result<reqwest::Response, RequestError> {
    if let Some(remaining) = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
    {
        debug!(remaining, "forge rate limit");
    }
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(RequestError::Status {
            status,
            url: response.url().to_string(),
        })
    }
}

#[async_trait]
impl Forge for GithubClient {
    async fn pr_diff(&self, installation: u64, repo: &str, pr: u64) -> Result<String> {
        let url = self.url(&format!("/repos/{repo}/pulls/{pr}"));
        debug!(repo, pr, "fetching pull request diff");
        let response = self
            .send(installation, |http, token| {
                http.get(&url).bearer_auth(token).header("Accept", ACCEPT_DIFF)
            })
            .await
            .with_context(|| format!("diff of {repo}#{pr}"))?;
        Ok(response.text().await.context("diff body")?)
    }

    async fn bot_reviews(&self, installation: u64, repo: &str, pr: u64) -> Result<Vec<Review>> {
        let url = self.url(&format!("/repos/{repo}/pulls/{pr}/reviews"));
        debug!(repo, pr, "fetching pull request reviews");
        let response = self
            .send(installation, |http, token| {
                http.get(&url).bearer_auth(token).header("Accept", ACCEPT_JSON)
            })
            .await
            .with_context(|| format!("reviews of {repo}#{pr}"))?;
        let reviews: Vec<Review> = response.json().await.context("reviews body")?;
        Ok(reviews
            .into_iter()
            .filter(|review| review.user.id == self.bot_user_id)
            .collect())
    }

    async fn pr_comments(
        &self,
        installation: u64,
        repo: &str,
        pr: u64,
    ) -> Result<Vec<ReviewComment>> {
        let url = self.url(&format!("/repos/{repo}/pulls/{pr}/comments"));
        debug!(repo, pr, "fetching pull request comments");
        let response = self
            .send(installation, |http, token| {
                http.get(&url).bearer_auth(token).header("Accept", ACCEPT_JSON)
            })
            .await
            .with_context(|| format!("comments of {repo}#{pr}"))?;
        Ok(response.json().await.context("comments body")?)
    }

    async fn post_review(
        &self,
        installation: u64,
        repo: &str,
        pr: u64,
        review: &ReviewSubmission,
    ) -> Result<()> {
        let url = self.url(&format!("/repos/{repo}/pulls/{pr}/reviews"));
        self.send(installation, |http, token| {
            http.post(&url)
                .bearer_auth(token)
                .header("Accept", ACCEPT_JSON)
                .json(review)
        })
        .await
        .with_context(|| format!("submitting review on {repo}#{pr}"))?;
        Ok(())
    }

    async fn update_comment(
        &self,
        installation: u64,
        repo: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<()> {
        let url = self.url(&format!("/repos/{repo}/pulls/comments/{comment_id}"));
        let payload = serde_json::json!({ "body": body });
        self.send(installation, |http, token| {
            http.patch(&url)
                .bearer_auth(token)
                .header("Accept", ACCEPT_JSON)
                .json(&payload)
        })
        .await
        .with_context(|| format!("updating comment {comment_id} in {repo}"))?;
        Ok(())
    }
}
