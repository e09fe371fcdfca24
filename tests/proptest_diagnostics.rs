//! Parser properties: canonical renderings survive a round trip, and skip
//! rules never leak findings.

use proptest::prelude::*;

use typecheckd::analyzer::diagnostic::{self, Diagnostic};

proptest! {
    #[test]
    fn canonical_rendering_round_trips(
        file in "[a-z][a-z0-9_/]{0,24}\\.py",
        line in 1u64..100_000,
        severity in "(error|warning|note)",
        message in "[a-zA-Z0-9 _.,'()\\[\\]-]{1,60}",
    ) {
        let original = Diagnostic {
            file,
            line,
            severity,
            message: message.trim().to_string(),
        };
        let reparsed = diagnostic::parse([original.to_string()], None);
        prop_assert_eq!(reparsed, vec![original]);
    }

    #[test]
    fn struck_renderings_never_parse(
        file in "[a-z][a-z0-9_/]{0,24}\\.py",
        line in 1u64..100_000,
        message in "[a-zA-Z0-9 _.,]{1,40}",
    ) {
        let struck = format!("~~{file}:{line}:error:{message}~~");
        prop_assert!(diagnostic::parse([struck.as_str()], None).is_empty());
    }

    #[test]
    fn identity_is_untouched_by_line_and_severity(
        file in "[a-z][a-z0-9_/]{0,24}\\.py",
        line_a in 1u64..100_000,
        line_b in 1u64..100_000,
        message in "[a-zA-Z0-9 _.,]{1,40}",
    ) {
        let a = Diagnostic {
            file: file.clone(),
            line: line_a,
            severity: "error".to_string(),
            message: message.clone(),
        };
        let b = Diagnostic {
            file,
            line: line_b,
            severity: "warning".to_string(),
            message,
        };
        prop_assert_eq!(a.identity(), b.identity());
    }
}
