// SPDX-License-Identifier: MIT
//! Per-delivery pipeline: synchronize → analyze → filter to the diff →
//! reconcile → act.
//!
//! Everything here re-derives its state from the forge and the working tree,
//! so a redelivered webhook replays the whole pass and converges: resolves
//! are idempotent, and a finding already posted is never posted twice.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::analyzer::diagnostic;
use crate::config::RepoOptions;
use crate::diff::{self, PositionedDiagnostic};
use crate::github::{DraftComment, Forge, ReviewSubmission};
use crate::review::{self, PriorReviewState};
use crate::webhook::event::{InstallationEvent, PullRequestEvent};
use crate::AppContext;

/// Handle one `pull_request` (opened/synchronize) delivery end to end.
pub async fn process_pull_request(ctx: &AppContext, event: &PullRequestEvent) -> Result<()> {
    let repo = event.repository.full_name.as_str();
    let pr = event.pull_request.number;
    let installation = event.installation.id;
    info!(repo, pr, head = %event.pull_request.head.sha, "processing pull request");

    let tree = ctx
        .repos
        .synchronize(
            &ctx.tokens,
            installation,
            repo,
            &event.pull_request.base.branch,
            &event.pull_request.head.branch,
        )
        .await
        .with_context(|| format!("synchronizing {repo}"))?;

    let options = RepoOptions::load(&tree);
    let raw = ctx.analyzer.run(&tree, &options).await?;
    let diagnostics = diagnostic::parse(raw.lines(), Some(repo));

    let diff_text = ctx.forge.pr_diff(installation, repo, pr).await?;
    let hunks = diff::parse_unified_diff(&diff_text);
    let current = diff::filter_to_changed_lines(&diagnostics, &hunks);
    debug!(
        total = diagnostics.len(),
        in_diff = current.len(),
        hunks = hunks.len(),
        "diagnostics filtered to diff"
    );

    reconcile_and_act(
        ctx.forge.as_ref(),
        installation,
        repo,
        pr,
        &event.pull_request.head.sha,
        &current,
    )
    .await
}

/// Reconcile `current` against the forge's record of the pull request and
/// execute the resulting plan. Split out so tests can drive it with a fake
/// forge and a known diagnostic set.
pub async fn reconcile_and_act(
    forge: &dyn Forge,
    installation: u64,
    repo: &str,
    pr: u64,
    head_sha: &str,
    current: &[PositionedDiagnostic],
) -> Result<()> {
    let prior = prior_state(forge, installation, repo, pr).await?;
    let plan = review::plan(current, &prior);

    // Resolves first: idempotent, safe to replay if the pass dies midway.
    for stale in &plan.resolve {
        info!(repo, pr, comment = stale.id, finding = %stale.diagnostic, "resolving comment");
        forge
            .update_comment(
                installation,
                repo,
                stale.id,
                &review::resolved_body(&stale.diagnostic),
            )
            .await?;
    }

    if !plan.submit_review {
        debug!(repo, pr, "nothing new — no review submitted");
        return Ok(());
    }

    let submission = ReviewSubmission {
        body: review::review_body(plan.post.len(), review::clock_pick),
        commit_id: head_sha.to_string(),
        event: "COMMENT".to_string(),
        comments: plan
            .post
            .iter()
            .map(|positioned| DraftComment {
                path: positioned.diagnostic.file.clone(),
                position: positioned.diff_position,
                body: positioned.diagnostic.to_string(),
            })
            .collect(),
    };
    info!(repo, pr, comments = submission.comments.len(), "submitting review");
    forge.post_review(installation, repo, pr, &submission).await
}

/// Reconstruct the bot's prior state on the pull request from the forge.
async fn prior_state(
    forge: &dyn Forge,
    installation: u64,
    repo: &str,
    pr: u64,
) -> Result<PriorReviewState> {
    let reviews = forge.bot_reviews(installation, repo, pr).await?;
    if reviews.is_empty() {
        return Ok(PriorReviewState::default());
    }
    let comments = forge.pr_comments(installation, repo, pr).await?;
    Ok(PriorReviewState::from_comments(
        true,
        comments.into_iter().map(|comment| (comment.id, comment.body)),
    ))
}

/// Handle `installation.created`: clone every listed repository so first
/// reviews start from a warm tree.
pub async fn clone_installation_repos(ctx: &AppContext, event: &InstallationEvent) -> Result<()> {
    for repository in &event.repositories {
        info!(repo = %repository.full_name, "pre-cloning installed repository");
        ctx.repos
            .ensure_cloned(&ctx.tokens, event.installation.id, &repository.full_name)
            .await
            .with_context(|| format!("cloning {}", repository.full_name))?;
    }
    Ok(())
}
