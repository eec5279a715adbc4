//! LLM output normalization
//!
//! The executor wraps submitted code in its own `async (page) => { ... }`,
//! so a script must be bare `await page.*` statements. Models like to add
//! markdown fences and their own wrapper functions; both are stripped here.

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum unwrap passes over nested wrappers
const MAX_UNWRAP_PASSES: usize = 3;

const BINDINGS_PRELUDE: &str = "const context = undefined;\nconst browser = undefined;\n";

/// Wrapper shapes, tried in this order on every pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    /// `(async function(page, context, browser) { ... })(page, context, browser)`
    InvokedFunction,
    /// `(async (page) => { ... })(page)`
    InvokedArrow,
    /// `const run = async (page) => { ... };`
    Arrow,
    /// `async function(page) { ... }`
    Function,
}

impl Wrapper {
    const ALL: [Wrapper; 4] = [
        Wrapper::InvokedFunction,
        Wrapper::InvokedArrow,
        Wrapper::Arrow,
        Wrapper::Function,
    ];

    fn pattern(self) -> &'static Regex {
        match self {
            Wrapper::InvokedFunction => &INVOKED_FUNCTION_RE,
            Wrapper::InvokedArrow => &INVOKED_ARROW_RE,
            Wrapper::Arrow => &ARROW_RE,
            Wrapper::Function => &FUNCTION_RE,
        }
    }

    /// Body of the wrapper if `text` has this shape
    fn unwrap(self, text: &str) -> Option<String> {
        self.pattern()
            .captures(text)
            .and_then(|c| c.name("body"))
            .map(|m| m.as_str().trim().to_string())
    }
}

static INVOKED_FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)async\s*function\s*\(\s*page\s*,\s*context\s*,\s*browser\s*\)\s*\{(?P<body>.*?)\}\s*\)\s*\(\s*page\s*,\s*context\s*,\s*browser\s*\)",
    )
    .expect("valid wrapper regex")
});

static INVOKED_ARROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)async\s*\(\s*page\s*\)\s*=>\s*\{(?P<body>.*?)\}\s*\)\s*\(\s*page\s*\)")
        .expect("valid wrapper regex")
});

static ARROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*(?:const\s+\w+\s*=\s*)?async\s*\(\s*page\s*\)\s*=>\s*\{(?P<body>.*)\}\s*;?\s*$")
        .expect("valid wrapper regex")
});

static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*async\s+function\s*\(\s*page\s*\)\s*\{(?P<body>.*)\}\s*;?\s*$")
        .expect("valid wrapper regex")
});

static CONTEXT_OR_BROWSER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bcontext\b|\bbrowser\b").expect("valid identifier regex"));

/// Drop a leading ```lang line and a trailing ``` line
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().skip(1).collect();
    if lines
        .last()
        .map(|l| l.trim_start().starts_with("```"))
        .unwrap_or(false)
    {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Normalize raw model output into bare page statements.
///
/// Returns an empty string when nothing usable is left.
pub fn normalize_script(raw: &str) -> String {
    let mut text = strip_code_fences(raw);
    if text.is_empty() {
        return text;
    }

    for _ in 0..MAX_UNWRAP_PASSES {
        match Wrapper::ALL.iter().find_map(|w| w.unwrap(&text)) {
            Some(body) => text = body,
            None => break,
        }
    }

    if !text.starts_with(BINDINGS_PRELUDE.trim_end()) && CONTEXT_OR_BROWSER_RE.is_match(&text) {
        text = format!("{}{}", BINDINGS_PRELUDE, text);
    }

    text.trim().to_string()
}

/// Which wrapper, if any, `text` currently carries
pub fn detect_wrapper(text: &str) -> Option<Wrapper> {
    Wrapper::ALL.iter().copied().find(|w| w.pattern().is_match(text))
}
