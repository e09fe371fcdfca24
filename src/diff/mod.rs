//! Diff mapping — restrict diagnostics to the changed regions of a pull
//! request and compute their review-comment positions.
//!
//! Only the target side of the unified diff matters here: a hunk is "where
//! did new lines land", and a diagnostic is in-diff when its line falls
//! inside some hunk of the matching file.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::analyzer::diagnostic::Diagnostic;

/// `@@ -old_start[,old_len] +new_start[,new_len] @@` — only the target side
/// is captured.
static HUNK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -\d+(?:,\d+)? \+(\d+)(?:,(\d+))? @@").expect("hunk header regex")
});

/// A contiguous changed region of one file, target side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub path: String,
    pub target_start: u64,
    pub target_length: u64,
}

/// A diagnostic known to fall inside the diff, annotated with its offset
/// within the hunk — the `position` GitHub's review API expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedDiagnostic {
    pub diagnostic: Diagnostic,
    pub diff_position: u64,
}

/// Parse the target-side hunks out of a unified diff.
///
/// The current target path comes from the `+++ b/...` header; deleted files
/// (`+++ /dev/null`) produce no hunks. An omitted hunk length defaults to 1
/// per the unified diff format.
pub fn parse_unified_diff(diff: &str) -> Vec<DiffHunk> {
    let mut hunks = Vec::new();
    let mut current_path: Option<String> = None;

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("+++ ") {
            let target = rest.split('\t').next().unwrap_or(rest).trim();
            current_path = match target {
                "/dev/null" => None,
                path => Some(path.strip_prefix("b/").unwrap_or(path).to_string()),
            };
            continue;
        }
        if let Some(caps) = HUNK_HEADER.captures(line) {
            // No target path means a deleted file (or malformed preamble) —
            // nothing on the target side to map diagnostics onto.
            let Some(path) = current_path.clone() else {
                continue;
            };
            let target_start = caps[1].parse().unwrap_or(0);
            let target_length = caps
                .get(2)
                .map(|m| m.as_str().parse().unwrap_or(1))
                .unwrap_or(1);
            hunks.push(DiffHunk {
                path,
                target_start,
                target_length,
            });
        }
    }
    hunks
}

/// Whether `diagnostic` falls inside `hunk`.
///
/// Both bounds are strict: a diagnostic exactly on the hunk's first or last
/// target line is excluded.
pub fn in_hunk(diagnostic: &Diagnostic, hunk: &DiffHunk) -> bool {
    hunk.target_start < diagnostic.line
        && diagnostic.line < hunk.target_start + hunk.target_length
}

/// Offset of the diagnostic's line within the hunk, 1-based from the hunk
/// header as GitHub counts review positions.
pub fn diff_position(diagnostic: &Diagnostic, hunk: &DiffHunk) -> u64 {
    diagnostic.line - hunk.target_start + 1
}

/// Restrict `diagnostics` to those inside some hunk of the matching path.
///
/// O(|hunks| × |diagnostics|), which is fine at pull-request scale. Output
/// order follows hunk order then diagnostic order; nothing is re-sorted.
pub fn filter_to_changed_lines(
    diagnostics: &[Diagnostic],
    hunks: &[DiffHunk],
) -> Vec<PositionedDiagnostic> {
    let mut positioned = Vec::new();
    for hunk in hunks {
        for diagnostic in diagnostics {
            if hunk.path == diagnostic.file && in_hunk(diagnostic, hunk) {
                positioned.push(PositionedDiagnostic {
                    diagnostic: diagnostic.clone(),
                    diff_position: diff_position(diagnostic, hunk),
                });
            }
        }
    }
    positioned
}
