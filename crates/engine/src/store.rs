//! Knowledge graph stores
//!
//! A store lists raw [`KnowledgeDocument`]s; [`KnowledgeLoader`] picks one,
//! normalizes it and keeps the result in a [`KnowledgeCache`]. An empty or
//! unreachable store yields the built-in graph.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use playsmith_common::config::KnowledgeConfig;
use playsmith_common::{default_graph, global_cache, KnowledgeCache, KnowledgeDocument, KnowledgeGraph};

use crate::cancel::with_cancel;
use crate::error::{EngineError, EngineResult};

/// Source of knowledge graph documents
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn list(&self) -> EngineResult<Vec<KnowledgeDocument>>;
}

/// Reads `GET {url}/knowledge-graphs`
pub struct HttpKnowledgeStore {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpKnowledgeStore {
    pub fn new(base_url: &str) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            endpoint: format!("{}/knowledge-graphs", base_url.trim_end_matches('/')),
            client,
        })
    }
}

#[async_trait]
impl KnowledgeStore for HttpKnowledgeStore {
    async fn list(&self) -> EngineResult<Vec<KnowledgeDocument>> {
        let resp = self.client.get(&self.endpoint).send().await?;
        if !resp.status().is_success() {
            return Err(EngineError::HttpStatus {
                url: self.endpoint.clone(),
                status: resp.status().as_u16(),
            });
        }
        Ok(resp.json().await?)
    }
}

/// A JSON or YAML file holding one document or a list of them
pub struct FileKnowledgeStore {
    path: PathBuf,
}

impl FileKnowledgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl KnowledgeStore for FileKnowledgeStore {
    async fn list(&self) -> EngineResult<Vec<KnowledgeDocument>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| EngineError::Knowledge(format!("{}: {}", self.path.display(), e)))?;

        let value: serde_json::Value = match self.path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)
                .map_err(|e| EngineError::Knowledge(format!("{}: {}", self.path.display(), e)))?,
        };

        match value {
            serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
            other => Ok(vec![serde_json::from_value(other)?]),
        }
    }
}

/// Fixed in-memory documents
#[derive(Default)]
pub struct StaticKnowledgeStore {
    docs: Vec<KnowledgeDocument>,
}

impl StaticKnowledgeStore {
    pub fn new(docs: Vec<KnowledgeDocument>) -> Self {
        Self { docs }
    }
}

#[async_trait]
impl KnowledgeStore for StaticKnowledgeStore {
    async fn list(&self) -> EngineResult<Vec<KnowledgeDocument>> {
        Ok(self.docs.clone())
    }
}

/// Store chosen by `[knowledge]`: URL first, then file, else none
pub fn store_from_config(config: &KnowledgeConfig) -> EngineResult<Option<Arc<dyn KnowledgeStore>>> {
    if let Some(url) = config.store_url.as_deref().filter(|u| !u.trim().is_empty()) {
        return Ok(Some(Arc::new(HttpKnowledgeStore::new(url)?)));
    }
    if let Some(path) = &config.file {
        return Ok(Some(Arc::new(FileKnowledgeStore::new(path.clone()))));
    }
    Ok(None)
}

/// Loads graphs from a store into a cache
#[derive(Clone)]
pub struct KnowledgeLoader {
    store: Option<Arc<dyn KnowledgeStore>>,
    cache: &'static KnowledgeCache,
}

impl KnowledgeLoader {
    /// Loader sharing the process-wide cache
    pub fn new(store: Option<Arc<dyn KnowledgeStore>>) -> Self {
        Self::with_cache(store, global_cache())
    }

    pub fn with_cache(store: Option<Arc<dyn KnowledgeStore>>, cache: &'static KnowledgeCache) -> Self {
        Self { store, cache }
    }

    /// Cached graph when it answers `app_name`, otherwise a fresh load.
    ///
    /// `None` accepts whatever graph is cached.
    pub async fn current(&self, app_name: Option<&str>, cancel: &CancellationToken) -> EngineResult<Arc<KnowledgeGraph>> {
        if let Some(graph) = self.cache.loaded() {
            let matches = app_name
                .map(|name| graph.app_name.eq_ignore_ascii_case(name.trim()))
                .unwrap_or(true);
            if matches {
                return Ok(graph);
            }
            debug!("Cached graph is {}, loading {:?}", graph.app_name, app_name);
        }
        self.refresh(app_name, cancel).await
    }

    /// Fetch from the store and swap the cached graph.
    ///
    /// Store errors are logged and answered with the built-in graph.
    pub async fn refresh(&self, app_name: Option<&str>, cancel: &CancellationToken) -> EngineResult<Arc<KnowledgeGraph>> {
        let graph = match &self.store {
            None => (*default_graph()).clone(),
            Some(store) => match with_cancel(cancel, store.list()).await {
                Ok(docs) => match KnowledgeDocument::select(docs, app_name) {
                    Some(doc) => doc.into_graph(),
                    None => {
                        info!("Knowledge store is empty, using built-in graph");
                        (*default_graph()).clone()
                    }
                },
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    warn!("Knowledge store unavailable, using built-in graph: {}", e);
                    (*default_graph()).clone()
                }
            },
        };

        info!("Knowledge graph loaded: {} ({} pages)", graph.app_name, graph.pages.len());
        self.cache.replace(graph);
        Ok(self.cache.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    fn leak_cache() -> &'static KnowledgeCache {
        Box::leak(Box::new(KnowledgeCache::new()))
    }

    fn doc(name: &str, default: bool) -> KnowledgeDocument {
        serde_json::from_value(serde_json::json!({
            "app_name": name,
            "is_default": default,
            "pages": [{"route": "/home"}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_static_store_selection() {
        let store = Arc::new(StaticKnowledgeStore::new(vec![doc("a", false), doc("b", true)]));
        let loader = KnowledgeLoader::with_cache(Some(store), leak_cache());
        let token = CancellationToken::new();

        assert_eq!(loader.refresh(None, &token).await.unwrap().app_name, "b");
        assert_eq!(loader.refresh(Some("A"), &token).await.unwrap().app_name, "a");
    }

    #[tokio::test]
    async fn test_empty_store_uses_default() {
        let loader = KnowledgeLoader::with_cache(Some(Arc::new(StaticKnowledgeStore::default())), leak_cache());
        let graph = loader.current(None, &CancellationToken::new()).await.unwrap();
        assert_eq!(graph.app_name, "TestMaster");
    }

    #[tokio::test]
    async fn test_current_loads_once() {
        static CACHE: Lazy<KnowledgeCache> = Lazy::new(KnowledgeCache::new);
        let token = CancellationToken::new();
        let first = KnowledgeLoader::with_cache(Some(Arc::new(StaticKnowledgeStore::new(vec![doc("one", false)]))), &CACHE);
        assert_eq!(first.current(None, &token).await.unwrap().app_name, "one");

        let second = KnowledgeLoader::with_cache(Some(Arc::new(StaticKnowledgeStore::new(vec![doc("two", false)]))), &CACHE);
        assert_eq!(second.current(None, &token).await.unwrap().app_name, "one");
        assert_eq!(second.refresh(None, &token).await.unwrap().app_name, "two");
    }

    #[tokio::test]
    async fn test_current_reloads_for_other_app() {
        let store = Arc::new(StaticKnowledgeStore::new(vec![doc("TestMaster2", false), doc("Shop", false)]));
        let loader = KnowledgeLoader::with_cache(Some(store), leak_cache());
        let token = CancellationToken::new();

        assert_eq!(loader.current(None, &token).await.unwrap().app_name, "TestMaster2");
        assert_eq!(loader.current(Some("Shop"), &token).await.unwrap().app_name, "Shop");
        assert_eq!(loader.current(Some("shop"), &token).await.unwrap().app_name, "Shop");
        assert_eq!(loader.current(None, &token).await.unwrap().app_name, "Shop");
        assert_eq!(loader.current(Some("TestMaster2"), &token).await.unwrap().app_name, "TestMaster2");
    }

    #[tokio::test]
    async fn test_unreachable_http_store_falls_back() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/knowledge-graphs")
            .with_status(503)
            .create_async()
            .await;

        let store = Arc::new(HttpKnowledgeStore::new(&server.url()).unwrap());
        let loader = KnowledgeLoader::with_cache(Some(store), leak_cache());
        let graph = loader.refresh(None, &CancellationToken::new()).await.unwrap();
        assert_eq!(graph.app_name, "TestMaster");
    }

    #[tokio::test]
    async fn test_http_store_lists_documents() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/knowledge-graphs")
            .with_status(200)
            .with_body(r#"[{"app_name": "Shop", "pages": {"/cart": {"description": "Cart"}}}]"#)
            .create_async()
            .await;

        let store = HttpKnowledgeStore::new(&server.url()).unwrap();
        let docs = store.list().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].clone().into_graph().pages[0].route, "/cart");
    }

    #[tokio::test]
    async fn test_file_store_reads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("kg.yaml");
        std::fs::write(&yaml, "app_name: Yaml\npages:\n  - route: /a\n").unwrap();
        let docs = FileKnowledgeStore::new(&yaml).list().await.unwrap();
        assert_eq!(docs[0].app_name.as_deref(), Some("Yaml"));

        let json = dir.path().join("kg.json");
        std::fs::write(&json, r#"[{"app_name": "J1"}, {"app_name": "J2"}]"#).unwrap();
        assert_eq!(FileKnowledgeStore::new(&json).list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_knowledge_error() {
        let err = FileKnowledgeStore::new("/nonexistent/kg.json").list().await.unwrap_err();
        assert!(matches!(err, EngineError::Knowledge(_)));
    }
}
