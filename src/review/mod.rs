//! Review reconciliation — the delta between the current diagnostic set and
//! the comments already sitting on the pull request.
//!
//! All prior state is re-derived from the forge each pass; nothing is stored
//! locally. Planning is pure so that idempotence (an unchanged input pair
//! plans zero actions) is a unit test, not a hope.

use crate::analyzer::diagnostic::{self, Diagnostic, RESOLVED_MARKER};
use crate::diff::PositionedDiagnostic;

/// Review bodies below this finding count draw from the praise pool;
/// at or above it, the grumble pool.
pub const GRUMBLE_THRESHOLD: usize = 5;

pub const PRAISE: [&str; 4] = ["Good job!", "Good stuff!", "Nicely done.", "Awesome."];

pub const GRUMBLE: [&str; 4] = ["(╯°□°)╯︵ ┻━┻", "\\(!!˚☐˚)/", "ಥ_ಥ", "＼(｀0´)／"];

/// A live bot comment on the pull request, with its finding re-derived from
/// the comment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedComment {
    pub id: u64,
    pub diagnostic: Diagnostic,
}

/// Prior bot state on the pull request, reconstructed from the forge.
#[derive(Debug, Clone, Default)]
pub struct PriorReviewState {
    /// Whether the bot has ever submitted a review here.
    pub reviewed: bool,
    /// Unresolved bot comments. Struck-through comments are already gone by
    /// construction — see [`PriorReviewState::from_comments`].
    pub comments: Vec<PostedComment>,
}

impl PriorReviewState {
    /// Build prior state from raw `(comment id, body)` pairs.
    ///
    /// Bodies carrying the strikethrough marker parse to nothing and drop
    /// out here, which is exactly the "resolved comments stay visible but
    /// are excluded from matching" rule. Bodies that are not findings at all
    /// (review chatter) drop out the same way.
    pub fn from_comments<I>(reviewed: bool, comments: I) -> Self
    where
        I: IntoIterator<Item = (u64, String)>,
    {
        let comments = comments
            .into_iter()
            .filter_map(|(id, body)| {
                diagnostic::parse([body.as_str()], None)
                    .pop()
                    .map(|diagnostic| PostedComment { id, diagnostic })
            })
            .collect();
        Self { reviewed, comments }
    }
}

/// The actions one reconciliation pass must perform.
#[derive(Debug, Clone, Default)]
pub struct ReviewPlan {
    /// Comments whose finding is gone — to be struck through.
    pub resolve: Vec<PostedComment>,
    /// Genuinely new findings — to be posted as fresh comments.
    pub post: Vec<PositionedDiagnostic>,
    /// Whether a review is submitted this pass: whenever `post` is
    /// non-empty, and also on the very first pass even with zero findings.
    pub submit_review: bool,
}

/// Pure reconciliation over diagnostic identities.
///
/// Resolves exactly the unresolved prior comments whose identity is absent
/// from `current`, and posts exactly the current diagnostics whose identity
/// is absent from the unresolved prior comments — no more, no fewer.
pub fn plan(current: &[PositionedDiagnostic], prior: &PriorReviewState) -> ReviewPlan {
    let resolve = prior
        .comments
        .iter()
        .filter(|comment| {
            !current
                .iter()
                .any(|p| p.diagnostic.identity() == comment.diagnostic.identity())
        })
        .cloned()
        .collect();

    let post: Vec<PositionedDiagnostic> = current
        .iter()
        .filter(|p| {
            !prior
                .comments
                .iter()
                .any(|comment| comment.diagnostic.identity() == p.diagnostic.identity())
        })
        .cloned()
        .collect();

    let submit_review = !post.is_empty() || !prior.reviewed;
    ReviewPlan {
        resolve,
        post,
        submit_review,
    }
}

/// Body for a struck-through (resolved) comment.
pub fn resolved_body(diagnostic: &Diagnostic) -> String {
    format!("{RESOLVED_MARKER}{diagnostic}{RESOLVED_MARKER}")
}

/// The review's summary line, a pure function of the submission count.
///
/// `pick` chooses an index into the flavor pool; production injects
/// [`clock_pick`], tests inject a constant for deterministic output.
pub fn review_body(count: usize, pick: impl FnOnce(usize) -> usize) -> String {
    let pool: &[&str] = if count < GRUMBLE_THRESHOLD {
        &PRAISE
    } else {
        &GRUMBLE
    };
    let flavor = pool[pick(pool.len()) % pool.len()];
    format!("I found {count} type errors. {flavor}")
}

/// Clock-derived pool picker. Which flavor lands is cosmetic, so the
/// sub-second clock is plenty of entropy and saves a dependency.
pub fn clock_pick(len: usize) -> usize {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as usize)
        .unwrap_or(0);
    nanos % len.max(1)
}
