//! Checker output parsing.
//!
//! One finding per line, in the canonical shape `file:line:severity:message`.
//! The message may itself contain colons; only the first three separators
//! split. The same parser reads raw checker output and previously posted
//! comment bodies, which is what lets a reconciliation pass re-derive its
//! prior state from the forge alone.

use tracing::warn;

/// Marker wrapped around the body of a resolved comment (`~~...~~` renders
/// struck-through on the forge). Marked lines never parse back into findings.
pub const RESOLVED_MARKER: &str = "~~";

/// Prefix of the checker's trailing summary line ("Found N errors in ...").
const SUMMARY_PREFIX: &str = "Found";

/// A structured static-analysis finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: String,
    pub line: u64,
    pub severity: String,
    pub message: String,
}

impl Diagnostic {
    /// Identity key used when matching findings across pushes.
    ///
    /// Deliberately excludes `line` and `severity`: a finding that shifted a
    /// few lines in a follow-up push is still the same finding and must not
    /// be re-posted. Kept as an explicit function, separate from `Eq`, so
    /// the matching policy stays auditable in one place.
    pub fn identity(&self) -> (&str, &str) {
        (self.file.as_str(), self.message.as_str())
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.file, self.line, self.severity, self.message
        )
    }
}

/// Parse raw checker output into structured diagnostics.
///
/// Empty lines, summary lines, and strikethrough-marked lines contribute
/// nothing. A line that does not match the 4-field shape is skipped with a
/// warning — one mangled line must not abort the batch. Output ordering
/// matches input ordering; no deduplication happens here.
///
/// `strip_prefix` removes a leading `<prefix>/` from the file path, for
/// checkers that print paths relative to a parent of the working tree.
pub fn parse<I, S>(lines: I, strip_prefix: Option<&str>) -> Vec<Diagnostic>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed = Vec::new();
    for line in lines {
        let line = line.as_ref();
        if line.trim().is_empty()
            || line.starts_with(SUMMARY_PREFIX)
            || line.starts_with(RESOLVED_MARKER)
        {
            continue;
        }
        match parse_line(line, strip_prefix) {
            Some(diagnostic) => parsed.push(diagnostic),
            None => warn!(line, "unparseable checker line — skipping"),
        }
    }
    parsed
}

fn parse_line(line: &str, strip_prefix: Option<&str>) -> Option<Diagnostic> {
    let mut parts = line.splitn(4, ':');
    let file = parts.next()?;
    let line_no = parts.next()?.trim().parse::<u64>().ok()?;
    let severity = parts.next()?.trim();
    let message = parts.next()?.trim();

    let file = match strip_prefix {
        Some(prefix) => file
            .strip_prefix(prefix)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(file),
        None => file,
    };

    Some(Diagnostic {
        file: file.to_string(),
        line: line_no,
        severity: severity.to_string(),
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lines() {
        let lines = [
            "app/adapter.py:21: error: Skipping analyzing 'unidiff': found module but no type hints",
            "tests/test_events.py:28: error: Need type annotation for 'records'",
        ];
        let parsed = parse(lines, None);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].file, "tests/test_events.py");
        assert_eq!(parsed[1].line, 28);
        assert_eq!(parsed[1].severity, "error");
    }

    #[test]
    fn summary_line_yields_single_diagnostic() {
        let parsed = parse(["a.py:10:error:bad type", "Found 1 error"], None);
        assert_eq!(
            parsed,
            vec![Diagnostic {
                file: "a.py".to_string(),
                line: 10,
                severity: "error".to_string(),
                message: "bad type".to_string(),
            }]
        );
    }

    #[test]
    fn skips_empty_summary_and_resolved_lines() {
        let lines = [
            "",
            "Found 6 errors in 4 files (checked 5 source files)",
            "~~app/adapter.py:21: error: already resolved~~",
        ];
        assert!(parse(lines, None).is_empty());
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let lines = [
            "no colons here",
            "a.py:not_a_number:error:msg",
            "b.py:3:warning:still parsed",
        ];
        let parsed = parse(lines, None);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].file, "b.py");
    }

    #[test]
    fn strips_repository_prefix() {
        let parsed = parse(["owner/repo/app/a.py:5:error:msg"], Some("owner/repo"));
        assert_eq!(parsed[0].file, "app/a.py");
    }

    #[test]
    fn prefix_not_present_leaves_path_alone() {
        let parsed = parse(["app/a.py:5:error:msg"], Some("owner/repo"));
        assert_eq!(parsed[0].file, "app/a.py");
    }

    #[test]
    fn identity_ignores_line_and_severity() {
        let a = Diagnostic {
            file: "f.py".to_string(),
            line: 1,
            severity: "error".to_string(),
            message: "b".to_string(),
        };
        let b = Diagnostic {
            file: "f.py".to_string(),
            line: 99,
            severity: "warning".to_string(),
            message: "b".to_string(),
        };
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a, b);
    }

    #[test]
    fn message_keeps_its_own_colons() {
        let raw = "file:10:severity:body-with-colon:in:the:middle";
        let parsed = parse([raw], None);
        assert_eq!(parsed[0].to_string(), raw);
    }
}
