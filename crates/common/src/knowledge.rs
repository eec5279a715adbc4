//! Application knowledge graph
//!
//! A static map of the target application's routes, controls and labels used
//! to ground LLM prompts. Graphs come from an external store as loosely shaped
//! documents ([`KnowledgeDocument`]) and are normalized into
//! [`KnowledgeGraph`]. The process keeps one current graph in a
//! [`KnowledgeCache`]; refreshing swaps the `Arc`, readers never see a graph
//! mutated in place.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sidebar/navigation entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavItem {
    pub label: String,
    pub route: String,
}

/// What a single route looks like
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub route: String,
    #[serde(default)]
    pub description: String,
    /// Alternate route serving the same page
    #[serde(default)]
    pub also: Option<String>,
    #[serde(default, alias = "key_buttons")]
    pub buttons: Vec<String>,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub dialogs: Vec<String>,
    #[serde(default)]
    pub empty_state: String,
}

/// Normalized knowledge graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub app_name: String,
    pub framework: String,
    pub base_url: String,
    pub selector_strategy: String,
    pub nav_items: Vec<NavItem>,
    /// Pages in authoring order
    pub pages: Vec<PageInfo>,
    pub common_button_labels: Vec<String>,
    pub aria_labels: Vec<String>,
}

impl KnowledgeGraph {
    pub fn page(&self, route: &str) -> Option<&PageInfo> {
        self.pages.iter().find(|p| p.route == route)
    }
}

/// Pages as stored: either a list of records or a route-keyed map
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PagesInput {
    List(Vec<PageInfo>),
    Map(serde_json::Map<String, serde_json::Value>),
}

impl Default for PagesInput {
    fn default() -> Self {
        PagesInput::List(Vec::new())
    }
}

/// A knowledge graph document as returned by the store
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeDocument {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub framework: String,
    #[serde(default, alias = "base_url_docker")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub selector_strategy: String,
    #[serde(default)]
    pub nav_items: Vec<serde_json::Value>,
    #[serde(default)]
    pub pages: PagesInput,
    #[serde(default)]
    pub common_button_labels: Vec<String>,
    #[serde(default)]
    pub aria_labels: Vec<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl KnowledgeDocument {
    /// Normalize a store document into a graph.
    ///
    /// Pages without a route and nav items missing a label or route are dropped.
    pub fn into_graph(self) -> KnowledgeGraph {
        let pages = match self.pages {
            PagesInput::List(list) => list.into_iter().filter(|p| !p.route.is_empty()).collect(),
            PagesInput::Map(map) => map
                .into_iter()
                .filter(|(route, _)| !route.is_empty())
                .filter_map(|(route, value)| {
                    let mut page: PageInfo = match serde_json::from_value(with_route(value, &route)) {
                        Ok(page) => page,
                        Err(e) => {
                            tracing::warn!("Skipping malformed page {}: {}", route, e);
                            return None;
                        }
                    };
                    page.route = route;
                    Some(page)
                })
                .collect(),
        };

        let nav_items = self
            .nav_items
            .into_iter()
            .filter_map(|v| serde_json::from_value::<NavItem>(v).ok())
            .filter(|n| !n.label.is_empty() && !n.route.is_empty())
            .collect();

        KnowledgeGraph {
            app_name: self.app_name.unwrap_or_else(|| "Unknown".to_string()),
            framework: self.framework,
            base_url: self
                .base_url
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            selector_strategy: self.selector_strategy,
            nav_items,
            pages,
            common_button_labels: self.common_button_labels,
            aria_labels: self.aria_labels,
        }
    }

    /// Pick a document: exact app name (case-insensitive), then the default, then the first
    pub fn select(docs: Vec<Self>, app_name: Option<&str>) -> Option<Self> {
        let wanted = app_name.map(str::trim).filter(|n| !n.is_empty());
        if let Some(name) = wanted {
            if let Some(pos) = docs.iter().position(|d| {
                d.app_name
                    .as_deref()
                    .map(|a| a.eq_ignore_ascii_case(name))
                    .unwrap_or(false)
            }) {
                return docs.into_iter().nth(pos);
            }
        }
        if let Some(pos) = docs.iter().position(|d| d.is_default) {
            return docs.into_iter().nth(pos);
        }
        docs.into_iter().next()
    }
}

fn with_route(mut value: serde_json::Value, route: &str) -> serde_json::Value {
    if let Some(obj) = value.as_object_mut() {
        obj.entry("route")
            .or_insert_with(|| serde_json::Value::String(route.to_string()));
    }
    value
}

/// Process-wide current knowledge graph.
///
/// `get` falls back to the built-in graph until something is loaded.
#[derive(Debug, Default)]
pub struct KnowledgeCache {
    current: RwLock<Option<Arc<KnowledgeGraph>>>,
}

impl KnowledgeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current graph, or the built-in default when nothing has been loaded
    pub fn get(&self) -> Arc<KnowledgeGraph> {
        self.loaded().unwrap_or_else(default_graph)
    }

    /// Current graph only if one was loaded
    pub fn loaded(&self) -> Option<Arc<KnowledgeGraph>> {
        self.current.read().clone()
    }

    /// Swap in a new graph, returning the previous one
    pub fn replace(&self, graph: KnowledgeGraph) -> Option<Arc<KnowledgeGraph>> {
        let next = Arc::new(graph);
        std::mem::replace(&mut *self.current.write(), Some(next))
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }
}

static GLOBAL_CACHE: Lazy<KnowledgeCache> = Lazy::new(KnowledgeCache::new);

/// The cache shared by every request in this process
pub fn global_cache() -> &'static KnowledgeCache {
    &GLOBAL_CACHE
}

static DEFAULT_GRAPH: Lazy<Arc<KnowledgeGraph>> = Lazy::new(|| Arc::new(build_default_graph()));

/// Built-in graph used whenever the store is empty or unreachable
pub fn default_graph() -> Arc<KnowledgeGraph> {
    DEFAULT_GRAPH.clone()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn page(route: &str, description: &str) -> PageInfo {
    PageInfo {
        route: route.to_string(),
        description: description.to_string(),
        ..Default::default()
    }
}

fn build_default_graph() -> KnowledgeGraph {
    let nav = [
        ("Test Plan", "/TestPlan"),
        ("AI Insights", "/AIInsights"),
        ("Releases", "/Releases"),
        ("TOAB/RK/IA", "/toab-rk-ia"),
        ("Requirements", "/Requirements"),
        ("Test Cases", "/TestCases"),
        ("Testcase Migration", "/testcase-migration"),
        ("Automations", "/Automations"),
        ("Executions", "/Executions"),
        ("Admin", "/admin"),
    ];

    let pages = vec![
        PageInfo {
            also: Some("/ (default route)".to_string()),
            buttons: strings(&["New Requirement", "New Test Case"]),
            filters: strings(&["Release filter (popover + checkboxes)", "View mode: list/board"]),
            ..page("/TestPlan", "Dashboard overview: stats, charts, requirement/testcase lists")
        },
        PageInfo {
            buttons: strings(&["New Requirement", "AI Test Suite", "Quick Test", "Delete (trash icon per card)"]),
            filters: strings(&["Filter by Release (Select dropdown)"]),
            dialogs: strings(&[
                "RequirementDialog (create/edit)",
                "AdvancedAITestDialog (AI Test Suite)",
                "TestCaseDialog (Quick Test)",
                "Delete AlertDialog",
            ]),
            empty_state: "Text 'Create your first requirement'".to_string(),
            ..page("/Requirements", "List/manage requirements. Create, edit, delete, AI-generate test suites.")
        },
        PageInfo {
            buttons: strings(&[
                "New Test Case",
                "Generate Automation (sparkles icon)",
                "Execute",
                "AI Generate",
                "Delete (trash icon)",
            ]),
            filters: strings(&[
                "Filter by Requirement (Select)",
                "Filter by Release (Select)",
                "Tabs: All / Draft / Ready / Passed / Failed",
            ]),
            dialogs: strings(&["TestCaseDialog", "ManualExecutionDialog", "AutomationReviewDialog", "Delete AlertDialog"]),
            ..page("/TestCases", "List/manage test cases. Generate automations, execute tests.")
        },
        PageInfo {
            buttons: strings(&[
                "New Automation",
                "Execute",
                "View Result",
                "Watch Video",
                "View Actions",
                "Delete (trash icon)",
            ]),
            filters: strings(&["Filter by Test Case (Select)", "Tabs: All / Ready / Passing / Failing"]),
            dialogs: strings(&["AutomationDialog", "Video Dialog", "Actions Dialog", "Delete AlertDialog"]),
            ..page("/Automations", "List/manage automation scripts. Execute, view video/actions.")
        },
        PageInfo {
            buttons: strings(&["New Release", "Delete (trash icon)"]),
            dialogs: strings(&["ReleaseDialog", "Delete AlertDialog"]),
            empty_state: "Text 'Create your first release'".to_string(),
            ..page("/Releases", "Manage releases.")
        },
        PageInfo {
            buttons: strings(&["API Documentation", "View Steps", "Edit"]),
            filters: strings(&[
                "Filter by Release (Select)",
                "Tabs: All / Passed / Failed / Blocked",
                "View: all / manual / automated",
            ]),
            dialogs: strings(&["ExecutionDialog", "ExecutionDetailsDialog", "ApiInfoDialog"]),
            ..page("/Executions", "View execution results. Filter by release, status.")
        },
        PageInfo {
            buttons: strings(&["Generate AI Insights", "Get Started", "Refresh Analysis"]),
            ..page("/AIInsights", "AI-powered test analytics dashboard (mock data).")
        },
        PageInfo {
            buttons: strings(&["Create", "Delete (trash icon)"]),
            filters: strings(&["Filter by Release (Select)"]),
            dialogs: strings(&["ToabRkIaDialog", "Delete AlertDialog"]),
            ..page("/toab-rk-ia", "TOAB/RK/IA assessment management linked to releases.")
        },
        PageInfo {
            buttons: strings(&["Analyze", "Generate automation draft", "Execute", "Save", "Back", "Reset"]),
            ..page(
                "/testcase-migration",
                "4-step wizard: paste legacy code, testcase draft, automation draft, save.",
            )
        },
        PageInfo {
            buttons: strings(&["Save token", "Connect", "Add user", "Save", "Delete (per-row)"]),
            ..page("/admin", "Administration: tokens, repos, users, health, AI settings.")
        },
    ];

    KnowledgeGraph {
        app_name: "TestMaster".to_string(),
        framework: "React + Vite + shadcn/ui (Tailwind)".to_string(),
        base_url: "http://frontend:5173".to_string(),
        selector_strategy: concat!(
            "No data-testid attributes exist. ",
            "Use role-based selectors: page.getByRole('button', {name:'...'}), ",
            "page.getByRole('link', {name:'...'}), page.getByRole('heading', {name:'...'}). ",
            "Use text selectors: page.getByText('exact text'). ",
            "Use CSS when roles are ambiguous: page.locator('.class-name'), ",
            "page.locator('input[placeholder=\"...\"]')."
        )
        .to_string(),
        nav_items: nav
            .iter()
            .map(|(label, route)| NavItem {
                label: label.to_string(),
                route: route.to_string(),
            })
            .collect(),
        pages,
        common_button_labels: strings(&[
            "New Requirement",
            "New Test Case",
            "New Automation",
            "New Release",
            "Create",
            "AI Test Suite",
            "Quick Test",
            "Generate Automation",
            "Execute",
            "View Result",
            "Watch Video",
            "View Actions",
            "View Steps",
            "Edit",
            "Delete",
            "Cancel",
            "Generate AI Insights",
            "Get Started",
            "Refresh Analysis",
            "API Documentation",
            "Save token",
            "Connect",
            "Save",
            "Analyze",
            "Back",
            "Reset",
        ]),
        aria_labels: strings(&[
            "Toggle Sidebar",
            "Move step up",
            "Move step down",
            "Remove step",
            "breadcrumb",
            "pagination",
            "Go to previous page",
            "Go to next page",
        ]),
    }
}
