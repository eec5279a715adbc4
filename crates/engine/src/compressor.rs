//! Knowledge graph compressor
//!
//! Renders the part of a [`KnowledgeGraph`] relevant to a set of steps as a
//! compact prompt block. Pages are picked by keyword: the route itself plus
//! synonyms for the common entity names. An empty hint, or a hint matching no
//! page, includes every page.

use playsmith_common::{default_graph, KnowledgeGraph, PageInfo};

/// Common button labels listed before the ellipsis
const MAX_COMMON_LABELS: usize = 15;

/// Synonyms added when the route contains the key
const SYNONYMS: &[(&str, &[&str])] = &[
    ("requirement", &["requirement", "requirements"]),
    ("testcase", &["test case", "testcase", "test cases"]),
    ("test", &["test case", "testcase", "test cases"]),
    ("automation", &["automation", "automations"]),
    ("release", &["release", "releases"]),
    ("execution", &["execution", "executions", "execute"]),
];

/// Lowercase keywords that select `route`
pub fn page_keywords(route: &str) -> Vec<String> {
    let stem = route.to_lowercase().trim_matches('/').to_string();
    let mut keywords = vec![stem.clone(), stem.replace('/', "")];
    for (key, words) in SYNONYMS {
        if stem.contains(key) {
            for w in *words {
                if !keywords.iter().any(|k| k == w) {
                    keywords.push(w.to_string());
                }
            }
        }
    }
    keywords.retain(|k| !k.is_empty());
    keywords
}

/// Pages of `graph` that `hint` is likely to touch
pub fn relevant_pages<'a>(graph: &'a KnowledgeGraph, hint: &str) -> Vec<&'a PageInfo> {
    let hint = hint.to_lowercase();
    if hint.trim().is_empty() {
        return graph.pages.iter().collect();
    }
    let matched: Vec<&PageInfo> = graph
        .pages
        .iter()
        .filter(|p| page_keywords(&p.route).iter().any(|k| hint.contains(k.as_str())))
        .collect();
    if matched.is_empty() {
        graph.pages.iter().collect()
    } else {
        matched
    }
}

/// Render the prompt block; `None` uses the built-in graph
pub fn compress(graph: Option<&KnowledgeGraph>, hint: &str) -> String {
    match graph {
        Some(g) => render(g, hint),
        None => render(&default_graph(), hint),
    }
}

fn render(graph: &KnowledgeGraph, hint: &str) -> String {
    let mut lines = vec![
        format!("Application: {} ({})", graph.app_name, graph.framework),
        format!("Docker base URL: {}", graph.base_url),
        format!("Selector strategy: {}", graph.selector_strategy),
        String::new(),
        "Sidebar navigation links (use page.getByRole('link', {name: '<label>'}) to click):".to_string(),
    ];
    for item in &graph.nav_items {
        lines.push(format!("  - '{}' → {}", item.label, item.route));
    }
    lines.push(String::new());

    for page in relevant_pages(graph, hint) {
        lines.push(format!("Page: {}", page.route));
        lines.push(format!("  Description: {}", page.description));
        if let Some(also) = page.also.as_deref().filter(|a| !a.is_empty()) {
            lines.push(format!("  Also: {}", also));
        }
        push_list(&mut lines, "Buttons", &page.buttons);
        push_list(&mut lines, "Filters", &page.filters);
        push_list(&mut lines, "Dialogs", &page.dialogs);
        if !page.empty_state.is_empty() {
            lines.push(format!("  Empty state: {}", page.empty_state));
        }
        lines.push(String::new());
    }

    let labels: Vec<&str> = graph
        .common_button_labels
        .iter()
        .take(MAX_COMMON_LABELS)
        .map(String::as_str)
        .collect();
    lines.push(format!("Common button labels: {}...", labels.join(", ")));
    lines.push(format!("Known aria-labels: {}", graph.aria_labels.join(", ")));

    lines.join("\n")
}

fn push_list(lines: &mut Vec<String>, heading: &str, items: &[String]) {
    if !items.is_empty() {
        lines.push(format!("  {}: {}", heading, items.join(", ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes(graph: &KnowledgeGraph, hint: &str) -> Vec<String> {
        relevant_pages(graph, hint)
            .into_iter()
            .map(|p| p.route.clone())
            .collect()
    }

    #[test]
    fn test_keywords_for_test_cases() {
        let kw = page_keywords("/TestCases");
        assert!(kw.contains(&"testcases".to_string()));
        assert!(kw.contains(&"test case".to_string()));
        assert!(kw.contains(&"test cases".to_string()));
    }

    #[test]
    fn test_hint_selects_pages() {
        let graph = default_graph();
        let picked = routes(&graph, "1. Open the Releases page\n2. Click New Release");
        assert_eq!(picked, vec!["/Releases".to_string()]);
    }

    #[test]
    fn test_execute_keyword_hits_executions() {
        let graph = default_graph();
        assert_eq!(routes(&graph, "execute the run"), vec!["/Executions".to_string()]);
    }

    #[test]
    fn test_empty_or_unmatched_hint_includes_all() {
        let graph = default_graph();
        assert_eq!(routes(&graph, "").len(), graph.pages.len());
        assert_eq!(routes(&graph, "zzz qqq").len(), graph.pages.len());
    }

    #[test]
    fn test_block_layout() {
        let block = compress(None, "requirements");
        assert!(block.starts_with("Application: TestMaster (React + Vite + shadcn/ui (Tailwind))\nDocker base URL: http://frontend:5173\n"));
        assert!(block.contains("  - 'Test Cases' → /TestCases"));
        assert!(block.contains("Page: /Requirements\n  Description: "));
        assert!(block.contains("  Empty state: Text 'Create your first requirement'"));
        assert!(!block.contains("Page: /Releases"));
        assert!(block.contains("Known aria-labels: Toggle Sidebar"));

        let labels_line = block
            .lines()
            .find(|l| l.starts_with("Common button labels:"))
            .unwrap();
        assert!(labels_line.ends_with("..."));
        assert_eq!(labels_line.matches(", ").count(), MAX_COMMON_LABELS - 1);
    }

    #[test]
    fn test_compress_is_deterministic() {
        let graph = default_graph();
        assert_eq!(compress(Some(&graph), "automation"), compress(Some(&graph), "automation"));
    }
}
