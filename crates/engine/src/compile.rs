//! Script compilers
//!
//! Turns what an executor or agent reports back (an `Action:` log, structured
//! tool calls, a chat transcript) into a replayable Playwright script.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::urls::UrlRewriter;

/// Placeholder emitted when nothing could be compiled
pub const NO_ACTIONS: &str = "// No actions captured";

static ACTION_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Action:\s*(?P<name>[a-zA-Z_][a-zA-Z0-9_-]*)\((?P<args>.*)\)\s*(?:-|$)")
        .expect("valid action regex")
});

static RAN_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)### Ran Playwright code\n(?P<code>.*?)(?:\n\n###|\z)").expect("valid transcript regex")
});

static GOTO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"page\.goto\(\s*['"](?P<url>[^'"]+)['"]\s*\)"#).expect("valid goto regex")
});

/// Render `value` as a single-quoted JS string literal.
///
/// One layer of matching outer quotes is dropped first, so `"#id"` and `#id`
/// produce the same literal.
pub fn js_single_quoted(value: &str) -> String {
    let mut v = value.trim();
    if v.len() >= 2 {
        let bytes = v.as_bytes();
        let (first, last) = (bytes[0], bytes[v.len() - 1]);
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            v = &v[1..v.len() - 1];
        }
    }
    format!("'{}'", v.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Split a comma separated argument list, respecting quotes and escapes
pub fn split_args(text: &str) -> Vec<String> {
    split_args_limited(text, usize::MAX)
}

/// Like [`split_args`] but stops after `max - 1` separators; the remainder,
/// commas included, becomes the last argument
pub fn split_args_limited(text: &str, max: usize) -> Vec<String> {
    let s = text.trim();
    let mut args = Vec::new();
    if s.is_empty() || max == 0 {
        return args;
    }

    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => {
                current.push(ch);
                escaped = true;
            }
            c if quote == Some(c) => {
                current.push(c);
                quote = None;
            }
            _ if quote.is_some() => current.push(ch),
            '\'' | '"' => {
                current.push(ch);
                quote = Some(ch);
            }
            ',' if args.len() + 1 < max => {
                let part = current.trim();
                if !part.is_empty() {
                    args.push(part.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        args.push(tail.to_string());
    }
    args
}

fn strip_quotes(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '"' || c == '\'')
}

fn wait_millis(arg: Option<&str>) -> u64 {
    arg.map(strip_quotes)
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000)
}

/// One recognized browser operation
#[derive(Debug, Clone, PartialEq, Eq)]
enum BrowserOp {
    Goto(String),
    Click(String),
    Fill(String, String),
    Press(String),
    Wait(u64),
    Select(String, String),
    Hover(String),
    RunCode(String),
    NoOp,
}

impl BrowserOp {
    fn render(&self, urls: &UrlRewriter) -> Option<String> {
        let line = match self {
            BrowserOp::Goto(url) => format!("await page.goto({});", js_single_quoted(&urls.rewrite_url(strip_quotes(url)))),
            BrowserOp::Click(sel) => format!("await page.click({});", js_single_quoted(sel)),
            BrowserOp::Fill(sel, val) => format!(
                "await page.fill({}, {});",
                js_single_quoted(sel),
                js_single_quoted(val)
            ),
            BrowserOp::Press(key) => format!("await page.keyboard.press({});", js_single_quoted(key)),
            BrowserOp::Wait(ms) => format!("await page.waitForTimeout({});", ms),
            BrowserOp::Select(sel, val) => format!(
                "await page.selectOption({}, {});",
                js_single_quoted(sel),
                js_single_quoted(val)
            ),
            BrowserOp::Hover(sel) => format!("await page.hover({});", js_single_quoted(sel)),
            BrowserOp::RunCode(code) => urls.rewrite_text(code.trim()),
            BrowserOp::NoOp => return None,
        };
        Some(line)
    }
}

/// Compile an executor `Action: name(args) - status` log.
///
/// Lines that do not parse, or name an unknown action, are skipped.
pub fn compile_action_log(actions_taken: &str, urls: &UrlRewriter) -> String {
    let lines: Vec<String> = actions_taken
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("Action:"))
        .filter_map(|l| ACTION_LINE_RE.captures(l))
        .filter_map(|caps| {
            let name = caps.name("name")?.as_str();
            let raw = caps.name("args").map(|m| m.as_str()).unwrap_or("");
            action_op(name, raw)
        })
        .filter_map(|op| op.render(urls))
        .collect();

    if lines.is_empty() {
        NO_ACTIONS.to_string()
    } else {
        lines.join("\n")
    }
}

fn action_op(name: &str, raw_args: &str) -> Option<BrowserOp> {
    let op = match name {
        "navigate" | "goto" => BrowserOp::Goto(split_args(raw_args).into_iter().next()?),
        "click" => BrowserOp::Click(split_args(raw_args).into_iter().next()?),
        "fill" | "type" => {
            let mut args = split_args_limited(raw_args, 2).into_iter();
            let selector = args.next()?;
            let value = args.next()?;
            BrowserOp::Fill(selector, value)
        }
        "press" | "press_key" => BrowserOp::Press(split_args(raw_args).into_iter().next()?),
        "wait" => {
            let args = split_args(raw_args);
            BrowserOp::Wait(wait_millis(args.first().map(String::as_str)))
        }
        _ => return None,
    };
    Some(op)
}

/// A structured tool invocation reported by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default, alias = "args", alias = "input")]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Positional arguments, whatever shape they arrived in
    fn positional(&self) -> Vec<String> {
        match &self.arguments {
            Value::Array(items) => items.iter().map(value_text).collect(),
            Value::String(s) => split_args(s),
            Value::Null => Vec::new(),
            other => vec![value_text(other)],
        }
    }

    /// First non-empty named field, else the positional argument at `index`
    fn arg(&self, keys: &[&str], index: usize) -> Option<String> {
        if let Value::Object(map) = &self.arguments {
            return keys
                .iter()
                .filter_map(|k| map.get(*k))
                .map(value_text)
                .find(|v| !v.trim().is_empty());
        }
        self.positional().into_iter().nth(index)
    }

    fn wait_millis(&self) -> u64 {
        if let Value::Object(map) = &self.arguments {
            if let Some(ms) = ["ms", "timeout", "milliseconds"]
                .iter()
                .filter_map(|k| map.get(*k))
                .find_map(value_number)
            {
                return ms as u64;
            }
            if let Some(secs) = ["time", "seconds"]
                .iter()
                .filter_map(|k| map.get(*k))
                .find_map(value_number)
            {
                return (secs * 1000.0) as u64;
            }
            return 1000;
        }
        wait_millis(self.positional().first().map(String::as_str))
    }

    fn op(&self) -> Option<BrowserOp> {
        const SELECTOR: &[&str] = &["selector", "element", "locator", "ref"];
        let name = canonical_tool_name(&self.name);
        let op = match name.as_str() {
            "navigate" | "goto" => BrowserOp::Goto(self.arg(&["url"], 0)?),
            "click" => BrowserOp::Click(self.arg(SELECTOR, 0)?),
            "fill" | "type" => BrowserOp::Fill(
                self.arg(SELECTOR, 0)?,
                self.arg(&["value", "text"], 1)?,
            ),
            "press" | "press-key" => BrowserOp::Press(self.arg(&["key"], 0)?),
            "wait" | "wait-for" => BrowserOp::Wait(self.wait_millis()),
            "select" | "select-option" => BrowserOp::Select(
                self.arg(SELECTOR, 0)?,
                self.arg(&["value", "values", "option"], 1)?,
            ),
            "hover" => BrowserOp::Hover(self.arg(SELECTOR, 0)?),
            "run-code" => BrowserOp::RunCode(self.arg(&["code", "script"], 0)?),
            "snapshot" | "close" => BrowserOp::NoOp,
            _ => return None,
        };
        Some(op)
    }

    fn unhandled_comment(&self) -> String {
        let args = match &self.arguments {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        format!("// Unhandled tool call: {}({})", self.name, args.replace('\n', " "))
    }
}

/// `browser_select_option` and `select_option` both become `select-option`
fn canonical_tool_name(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase().replace('_', "-");
    lower
        .strip_prefix("browser-")
        .map(str::to_string)
        .unwrap_or(lower)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.first().map(value_text).unwrap_or_default(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Compile structured tool calls. Unknown tools are kept as comments.
pub fn compile_tool_calls(calls: &[ToolCall], urls: &UrlRewriter) -> String {
    let lines: Vec<String> = calls
        .iter()
        .filter_map(|call| match call.op() {
            Some(op) => op.render(urls),
            None => Some(call.unhandled_comment()),
        })
        .collect();

    if lines.is_empty() {
        NO_ACTIONS.to_string()
    } else {
        lines.join("\n")
    }
}

/// One chat message of an agent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Value,
}

/// Pull the code the agent actually ran out of its tool messages
pub fn compile_agent_transcript(entries: &[TranscriptEntry], urls: &UrlRewriter) -> String {
    let blocks: Vec<String> = entries
        .iter()
        .filter(|e| e.role == "tool")
        .filter_map(|e| e.content.as_str())
        .flat_map(|content| {
            RAN_CODE_RE
                .captures_iter(content)
                .filter_map(|c| c.name("code").map(|m| m.as_str().trim().to_string()))
                .filter(|code| !code.is_empty())
                .collect::<Vec<_>>()
        })
        .map(|code| rewrite_goto_calls(&code, urls))
        .collect();

    if blocks.is_empty() {
        NO_ACTIONS.to_string()
    } else {
        blocks.join("\n")
    }
}

/// Rewrite loopback URLs inside `page.goto(...)` calls only
pub fn rewrite_goto_calls(code: &str, urls: &UrlRewriter) -> String {
    GOTO_RE
        .replace_all(code, |caps: &regex::Captures| {
            format!("page.goto({})", js_single_quoted(&urls.rewrite_url(&caps["url"])))
        })
        .into_owned()
}
