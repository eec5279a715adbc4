//! Hidden-error detection
//!
//! Executors report `success: true` for runs whose transcript shows a thrown
//! `TypeError` or a page that never left `about:blank`. The detector finds
//! those signatures, ignores dev-server console noise, and folds the result
//! into an [`EffectiveResult`].

use once_cell::sync::Lazy;
use regex::Regex;

use playsmith_common::{EffectiveResult, ExecutionOutcome};

/// Characters of context kept before a match
const SNIPPET_BEFORE: usize = 120;
/// Characters of context kept after a match
const SNIPPET_AFTER: usize = 200;

const BLANK_PAGE_MARKER: &str = "Page URL: about:blank";

/// Message reported for a run whose page never navigated
pub const SILENT_NAVIGATION_FAILURE: &str =
    "Navigation appears to have failed – page is still at about:blank";

static ERROR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(?:TypeError|ReferenceError|SyntaxError|EvalError|RangeError|URIError|",
        r"TimeoutError|page\.evaluate|Unhandled\s+rejection|Cannot\s+read\s+propert|",
        r"is\s+not\s+a\s+function|is\s+not\s+defined|ActionError|",
        r"FAIL(?:ED)?[:\s]|CRASH|Execution\s+error|Script\s+error)"
    ))
    .expect("valid error signature regex")
});

static BENIGN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(?:WebSocket\s+connection|ERR_CONNECTION_REFUSED|failed\s+to\s+connect\s+to\s+websocket|",
        r"vite.*?client|React\s+DevTools|Download\s+the\s+React|net::ERR_|",
        r"favicon\.ico|HMR|hot\s+module|localhost:\d+/@vite)"
    ))
    .expect("valid benign noise regex")
});

/// First non-benign failure snippet in the transcript or error text.
///
/// The transcript is scanned before the error text. A transcript still
/// showing `about:blank` counts as a failure when nothing else matched.
pub fn detect_hidden_error(actions_taken: Option<&str>, error: Option<&str>) -> Option<String> {
    for text in [actions_taken, error].into_iter().flatten() {
        for m in ERROR_RE.find_iter(text) {
            let snippet = snippet_around(text, m.start(), m.end());
            if BENIGN_RE.is_match(snippet) {
                continue;
            }
            return Some(snippet.to_string());
        }
    }

    match actions_taken {
        Some(t) if t.contains(BLANK_PAGE_MARKER) => Some(SILENT_NAVIGATION_FAILURE.to_string()),
        _ => None,
    }
}

/// Context window around a match, clamped to char boundaries
fn snippet_around(text: &str, start: usize, end: usize) -> &str {
    let mut from = start.saturating_sub(SNIPPET_BEFORE);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + SNIPPET_AFTER).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].trim()
}

/// Combine the raw outcome with detection.
///
/// A detected snippet downgrades a successful run; a failed run keeps its
/// own error, or takes the snippet when it has none.
pub fn effective_result(outcome: &ExecutionOutcome, attempts: u32) -> EffectiveResult {
    let hidden = detect_hidden_error(Some(&outcome.actions_taken), outcome.error.as_deref());
    match (outcome.success, hidden) {
        (true, None) => EffectiveResult {
            success: true,
            error: None,
            attempts,
        },
        (true, Some(snippet)) => {
            tracing::warn!("Executor reported success but transcript shows an error: {}", snippet);
            EffectiveResult {
                success: false,
                error: Some(snippet),
                attempts,
            }
        }
        (false, hidden) => EffectiveResult {
            success: false,
            error: outcome
                .error
                .clone()
                .filter(|e| !e.trim().is_empty())
                .or(hidden)
                .or_else(|| Some("Execution failed".to_string())),
            attempts,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn outcome(success: bool, actions: &str, error: Option<&str>) -> ExecutionOutcome {
        ExecutionOutcome {
            success,
            actions_taken: actions.to_string(),
            error: error.map(str::to_string),
            ..Default::default()
        }
    }

    #[test_case("TypeError: x is undefined" ; "type error")]
    #[test_case("ReferenceError: foo is not defined" ; "reference error")]
    #[test_case("Unhandled rejection in handler" ; "unhandled rejection")]
    #[test_case("step FAILED: button missing" ; "fail marker")]
    #[test_case("used page.evaluate to read DOM" ; "dom introspection")]
    #[test_case("TimeoutError: locator.click: Timeout 30000ms exceeded" ; "timeout")]
    fn test_detects_signature(text: &str) {
        assert!(detect_hidden_error(Some(text), None).is_some());
    }

    #[test_case("[ERROR] WebSocket connection to 'ws://frontend:5173/' failed: ERR_CONNECTION_REFUSED" ; "vite websocket")]
    #[test_case("GET /favicon.ico 404 FAILED: not found" ; "favicon")]
    #[test_case("Download the React DevTools for a better development experience" ; "devtools")]
    #[test_case("Action: click(text=Save) - ok" ; "clean")]
    fn test_ignores_benign(text: &str) {
        assert_eq!(detect_hidden_error(Some(text), None), None);
    }

    #[test]
    fn test_error_text_scanned_after_transcript() {
        let hit = detect_hidden_error(Some("all good"), Some("Script error: boom"));
        assert_eq!(hit.as_deref(), Some("Script error: boom"));
    }

    #[test]
    fn test_blank_page_detected() {
        let hit = detect_hidden_error(Some("Page URL: about:blank\nAction: click(a) - ok"), None);
        assert_eq!(hit.as_deref(), Some(SILENT_NAVIGATION_FAILURE));
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let text = format!("{}TypeError: boom{}", "é".repeat(100), "ü".repeat(150));
        let hit = detect_hidden_error(Some(&text), None).unwrap();
        assert!(hit.contains("TypeError: boom"));
    }

    #[test]
    fn test_success_downgraded() {
        let eff = effective_result(&outcome(true, "Cannot read properties of null", None), 1);
        assert!(!eff.success);
        assert!(eff.error.unwrap().contains("Cannot read propert"));
    }

    #[test]
    fn test_benign_only_keeps_success() {
        let eff = effective_result(
            &outcome(true, "[vite] connecting...\nWebSocket connection failed: HMR", None),
            2,
        );
        assert!(eff.success);
        assert_eq!(eff.attempts, 2);
    }

    #[test]
    fn test_failure_keeps_own_error() {
        let eff = effective_result(&outcome(false, "TypeError: a", Some("timed out")), 1);
        assert!(!eff.success);
        assert_eq!(eff.error.as_deref(), Some("timed out"));

        let eff = effective_result(&outcome(false, "", None), 1);
        assert_eq!(eff.error.as_deref(), Some("Execution failed"));
    }
}
