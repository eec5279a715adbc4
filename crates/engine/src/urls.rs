//! Loopback URL rewriting
//!
//! Scripts are written against whatever the author had open locally
//! (`http://localhost:5173`, `127.0.0.1:3000`, ...). The executor runs in its
//! own network namespace, so every loopback origin is replaced by the
//! internal application origin. Paths, queries and fragments are kept.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::{EngineError, EngineResult};

static LOOPBACK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:https?://)?(?:localhost|127\.0\.0\.1|0\.0\.0\.0)(?::\d{2,5})?\b")
        .expect("valid loopback regex")
});

/// Rewrites loopback origins to the internal application origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRewriter {
    origin: String,
}

impl UrlRewriter {
    pub fn new(internal_base_url: &str) -> EngineResult<Self> {
        let parsed = Url::parse(internal_base_url.trim())?;
        if parsed.host_str().is_none() {
            return Err(EngineError::Url(url::ParseError::EmptyHost));
        }
        Ok(Self {
            origin: parsed.origin().ascii_serialization(),
        })
    }

    /// Internal origin, e.g. `http://frontend:5173`
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Rewrite every loopback origin in `text`.
    ///
    /// Idempotent: the output contains no loopback origin unless the internal
    /// origin is itself loopback, in which case it maps to itself.
    pub fn rewrite_text(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in LOOPBACK_RE.find_iter(text) {
            if !has_scheme(m.as_str()) && text[..m.start()].ends_with("://") {
                // ws://localhost and similar non-http schemes stay untouched
                continue;
            }
            out.push_str(&text[last..m.start()]);
            out.push_str(&self.origin);
            last = m.end();
        }
        out.push_str(&text[last..]);
        out
    }

    /// Rewrite a single URL. Bare loopback hosts gain the internal scheme;
    /// anything else is returned trimmed but otherwise unchanged.
    pub fn rewrite_url(&self, url: &str) -> String {
        let raw = url.trim();
        match LOOPBACK_RE.find(raw) {
            Some(m) if m.start() == 0 => self.rewrite_text(raw),
            _ => raw.to_string(),
        }
    }

    /// First bare or absolute loopback mention in free text, rewritten
    pub fn find_loopback(&self, text: &str) -> Option<String> {
        LOOPBACK_RE
            .find(text)
            .map(|m| self.rewrite_url(m.as_str()))
    }
}

fn has_scheme(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn rewriter() -> UrlRewriter {
        UrlRewriter::new("http://frontend:5173").unwrap()
    }

    #[test_case("await page.goto('http://localhost:5173/TestCases');", "await page.goto('http://frontend:5173/TestCases');" ; "absolute with path")]
    #[test_case("open 127.0.0.1:3000 now", "open http://frontend:5173 now" ; "bare with port")]
    #[test_case("https://0.0.0.0/x?y=1", "http://frontend:5173/x?y=1" ; "https any address")]
    #[test_case("ws://localhost:5173/@vite", "ws://localhost:5173/@vite" ; "websocket untouched")]
    #[test_case("http://example.com/localhostname", "http://example.com/localhostname" ; "not a host")]
    #[test_case("no urls here", "no urls here" ; "plain text")]
    fn test_rewrite_text(input: &str, expected: &str) {
        assert_eq!(rewriter().rewrite_text(input), expected);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let r = rewriter();
        let text = "goto http://localhost:5173/a then localhost:8080/b and 127.0.0.1";
        let once = r.rewrite_text(text);
        assert_eq!(r.rewrite_text(&once), once);

        let loop_internal = UrlRewriter::new("http://localhost:5173").unwrap();
        let once = loop_internal.rewrite_text(text);
        assert_eq!(loop_internal.rewrite_text(&once), once);
    }

    #[test]
    fn test_rewrite_url() {
        let r = rewriter();
        assert_eq!(r.rewrite_url(" localhost:5173/login "), "http://frontend:5173/login");
        assert_eq!(r.rewrite_url("https://example.com"), "https://example.com");
    }

    #[test]
    fn test_find_loopback() {
        let r = rewriter();
        assert_eq!(
            r.find_loopback("Open localhost:5173 and log in").as_deref(),
            Some("http://frontend:5173")
        );
        assert!(r.find_loopback("Click Save").is_none());
    }

    #[test]
    fn test_invalid_base_rejected() {
        assert!(UrlRewriter::new("not a url").is_err());
    }
}
