//! End-to-end reconciliation against a recording forge fake: first-review
//! behavior, steady-state delta, and idempotence.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use typecheckd::analyzer::diagnostic::Diagnostic;
use typecheckd::diff::PositionedDiagnostic;
use typecheckd::github::{Actor, DraftComment, Forge, Review, ReviewComment, ReviewSubmission};
use typecheckd::pipeline::reconcile_and_act;
use typecheckd::review::{GRUMBLE, PRAISE};

const BOT_ID: u64 = 64_769_253;
const INSTALLATION: u64 = 42;
const REPO: &str = "octo/spam";
const PR: u64 = 7;
const HEAD_SHA: &str = "abc123";

/// Forge fake: serves pre-seeded reviews/comments, records every write.
#[derive(Default)]
struct FakeForge {
    reviews: Vec<Review>,
    comments: Vec<ReviewComment>,
    patched: Mutex<Vec<(u64, String)>>,
    posted: Mutex<Vec<ReviewSubmission>>,
}

impl FakeForge {
    fn with_bot_review(comment_bodies: &[&str]) -> Self {
        Self {
            reviews: vec![Review {
                id: 900,
                user: Actor {
                    id: BOT_ID,
                    login: "typecheckd[bot]".to_string(),
                },
            }],
            comments: comment_bodies
                .iter()
                .enumerate()
                .map(|(i, body)| ReviewComment {
                    id: 100 + i as u64,
                    body: body.to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Forge for FakeForge {
    async fn pr_diff(&self, _installation: u64, _repo: &str, _pr: u64) -> Result<String> {
        Ok(String::new())
    }

    async fn bot_reviews(&self, _installation: u64, _repo: &str, _pr: u64) -> Result<Vec<Review>> {
        Ok(self.reviews.clone())
    }

    async fn pr_comments(
        &self,
        _installation: u64,
        _repo: &str,
        _pr: u64,
    ) -> Result<Vec<ReviewComment>> {
        Ok(self.comments.clone())
    }

    async fn post_review(
        &self,
        _installation: u64,
        _repo: &str,
        _pr: u64,
        review: &ReviewSubmission,
    ) -> Result<()> {
        self.posted.lock().unwrap().push(review.clone());
        Ok(())
    }

    async fn update_comment(
        &self,
        _installation: u64,
        _repo: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<()> {
        self.patched
            .lock()
            .unwrap()
            .push((comment_id, body.to_string()));
        Ok(())
    }
}

fn positioned(file: &str, line: u64, message: &str) -> PositionedDiagnostic {
    PositionedDiagnostic {
        diagnostic: Diagnostic {
            file: file.to_string(),
            line,
            severity: "error".to_string(),
            message: message.to_string(),
        },
        diff_position: line,
    }
}

#[tokio::test]
async fn first_review_posts_every_finding_with_a_grumble_at_six() {
    let forge = FakeForge::default();
    let current: Vec<_> = (1..=6)
        .map(|i| positioned("a.py", i, &format!("finding {i}")))
        .collect();

    reconcile_and_act(&forge, INSTALLATION, REPO, PR, HEAD_SHA, &current)
        .await
        .unwrap();

    let posted = forge.posted.lock().unwrap();
    assert_eq!(posted.len(), 1, "exactly one review");
    let review = &posted[0];
    assert_eq!(review.comments.len(), 6);
    assert_eq!(review.commit_id, HEAD_SHA);
    assert_eq!(review.event, "COMMENT");
    assert!(review.body.starts_with("I found 6 type errors. "));
    assert!(
        GRUMBLE.iter().any(|flavor| review.body.ends_with(flavor)),
        "six findings draw from the grumble pool: {}",
        review.body
    );
    assert!(forge.patched.lock().unwrap().is_empty());
}

#[tokio::test]
async fn first_review_with_zero_findings_still_posts_praise() {
    let forge = FakeForge::default();

    reconcile_and_act(&forge, INSTALLATION, REPO, PR, HEAD_SHA, &[])
        .await
        .unwrap();

    let posted = forge.posted.lock().unwrap();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].comments.is_empty());
    assert!(posted[0].body.starts_with("I found 0 type errors. "));
    assert!(PRAISE.iter().any(|flavor| posted[0].body.ends_with(flavor)));
}

#[tokio::test]
async fn steady_state_resolves_two_and_posts_one() {
    // Prior review carries six findings; the next push fixes two of them and
    // introduces one new one.
    let forge = FakeForge::with_bot_review(&[
        "a.py:1:error:finding 1",
        "a.py:2:error:finding 2",
        "a.py:3:error:finding 3",
        "a.py:4:error:finding 4",
        "a.py:5:error:finding 5",
        "a.py:6:error:finding 6",
    ]);
    let mut current: Vec<_> = (1..=4)
        .map(|i| positioned("a.py", i, &format!("finding {i}")))
        .collect();
    current.push(positioned("a.py", 40, "a brand new finding"));

    reconcile_and_act(&forge, INSTALLATION, REPO, PR, HEAD_SHA, &current)
        .await
        .unwrap();

    let patched = forge.patched.lock().unwrap();
    assert_eq!(patched.len(), 2, "exactly the vanished findings resolve");
    assert_eq!(patched[0], (104, "~~a.py:5:error:finding 5~~".to_string()));
    assert_eq!(patched[1], (105, "~~a.py:6:error:finding 6~~".to_string()));

    let posted = forge.posted.lock().unwrap();
    assert_eq!(posted.len(), 1);
    assert_eq!(
        posted[0].comments,
        vec![DraftComment {
            path: "a.py".to_string(),
            position: 40,
            body: "a.py:40:error:a brand new finding".to_string(),
        }]
    );
    assert!(posted[0].body.starts_with("I found 1 type errors. "));
}

#[tokio::test]
async fn unchanged_set_makes_zero_forge_writes() {
    let forge = FakeForge::with_bot_review(&[
        "a.py:1:error:finding 1",
        "b.py:9:warning:finding 2",
    ]);
    let current = vec![
        positioned("a.py", 1, "finding 1"),
        positioned("b.py", 9, "finding 2"),
    ];

    reconcile_and_act(&forge, INSTALLATION, REPO, PR, HEAD_SHA, &current)
        .await
        .unwrap();

    assert!(forge.patched.lock().unwrap().is_empty());
    assert!(forge.posted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn struck_comments_do_not_suppress_reposting() {
    // A finding that was resolved earlier and then reappears must be posted
    // again: its struck comment no longer counts as prior state.
    let forge = FakeForge::with_bot_review(&["~~a.py:3:error:it came back~~"]);
    let current = vec![positioned("a.py", 3, "it came back")];

    reconcile_and_act(&forge, INSTALLATION, REPO, PR, HEAD_SHA, &current)
        .await
        .unwrap();

    assert!(forge.patched.lock().unwrap().is_empty());
    let posted = forge.posted.lock().unwrap();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].comments.len(), 1);
}

#[tokio::test]
async fn severity_flip_alone_is_not_a_new_finding() {
    let forge = FakeForge::with_bot_review(&["a.py:3:warning:ambiguous type"]);
    let current = vec![positioned("a.py", 3, "ambiguous type")]; // now "error"

    reconcile_and_act(&forge, INSTALLATION, REPO, PR, HEAD_SHA, &current)
        .await
        .unwrap();

    assert!(forge.patched.lock().unwrap().is_empty());
    assert!(forge.posted.lock().unwrap().is_empty());
}
