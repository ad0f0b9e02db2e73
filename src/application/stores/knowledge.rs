//! Knowledge bases, their documents and retrieval.

use std::collections::HashMap;

use serde_json::json;
use tracing::{debug, info};

use super::{prepend, Loadable, StoreCell};
use crate::domain::{ApiFailure, Backend, KnowledgeBase, KnowledgeDocument, RetrievalResult};
use crate::infrastructure::RequestClient;

/// Hits requested per search.
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct KnowledgeState {
    pub bases: Vec<KnowledgeBase>,
    /// Documents keyed by base id, newest first.
    pub documents: HashMap<String, Vec<KnowledgeDocument>>,
    /// Hits of the last search.
    pub results: Vec<RetrievalResult>,
    pub loading: bool,
}

impl Loadable for KnowledgeState {
    fn loading_mut(&mut self) -> &mut bool {
        &mut self.loading
    }
}

pub struct KnowledgeStore {
    client: RequestClient,
    state: StoreCell<KnowledgeState>,
}

impl KnowledgeStore {
    pub fn new(client: RequestClient) -> Self {
        Self {
            client,
            state: StoreCell::new(KnowledgeState::default()),
        }
    }

    pub fn snapshot(&self) -> KnowledgeState {
        self.state.snapshot()
    }

    pub async fn hydrate(&self) -> Result<(), ApiFailure> {
        let _loading = self.state.begin_loading();
        let bases = self
            .client
            .get::<Vec<KnowledgeBase>>(Backend::Engine, "/knowledge/bases")
            .await
            .into_result()?;
        self.state.update(|s| s.bases = bases);
        Ok(())
    }

    pub async fn create_base(
        &self,
        name: &str,
        description: Option<&str>,
        tags: &[String],
    ) -> Result<KnowledgeBase, ApiFailure> {
        let base = self
            .client
            .post::<KnowledgeBase>(
                Backend::Engine,
                "/knowledge/bases",
                &json!({ "name": name, "description": description, "tags": tags }),
            )
            .await
            .into_result()?;
        info!(base = %base.id, "Knowledge base created");
        self.state.update(|s| prepend(&mut s.bases, base.clone()));
        Ok(base)
    }

    pub async fn load_documents(&self, base_id: &str) -> Result<(), ApiFailure> {
        let documents = self
            .client
            .get::<Vec<KnowledgeDocument>>(
                Backend::Engine,
                &format!("/knowledge/bases/{base_id}/documents"),
            )
            .await
            .into_result()?;
        debug!(base = %base_id, count = documents.len(), "Documents loaded");
        self.state.update(|s| {
            s.documents.insert(base_id.to_string(), documents);
        });
        Ok(())
    }

    pub async fn upload_document(
        &self,
        base_id: &str,
        name: &str,
        content: &str,
        mime: Option<&str>,
    ) -> Result<KnowledgeDocument, ApiFailure> {
        let document = self
            .client
            .post::<KnowledgeDocument>(
                Backend::Engine,
                &format!("/knowledge/bases/{base_id}/documents"),
                &json!({ "name": name, "content": content, "mime": mime.unwrap_or("text/plain") }),
            )
            .await
            .into_result()?;
        self.state.update(|s| {
            prepend(
                s.documents.entry(base_id.to_string()).or_default(),
                document.clone(),
            );
        });
        Ok(document)
    }

    /// Search the given bases. The hits replace the previous results.
    pub async fn search(
        &self,
        base_ids: &[String],
        query: &str,
    ) -> Result<Vec<RetrievalResult>, ApiFailure> {
        let results = self
            .client
            .post::<Vec<RetrievalResult>>(
                Backend::Engine,
                "/knowledge/search",
                &json!({ "base_ids": base_ids, "query": query, "top_k": DEFAULT_TOP_K }),
            )
            .await
            .into_result()?;
        self.state.update(|s| s.results.clone_from(&results));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{client, respond};
    use super::*;
    use wiremock::MockServer;

    #[tokio::test]
    async fn test_upload_prepends_into_its_base() {
        let server = MockServer::start().await;
        respond(&server, "GET", "/engine/knowledge/bases/kb1/documents", 200, json!([
            {"id": "d1", "base_id": "kb1", "name": "old.md", "status": "indexed"}
        ])).await;
        respond(&server, "POST", "/engine/knowledge/bases/kb1/documents", 200,
            json!({"id": "d2", "base_id": "kb1", "name": "new.md", "status": "processing"})).await;
        let store = KnowledgeStore::new(client(&server));

        store.load_documents("kb1").await.unwrap();
        store.upload_document("kb1", "new.md", "# hi", None).await.unwrap();
        let docs = &store.snapshot().documents["kb1"];
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "d2");
    }

    #[tokio::test]
    async fn test_failed_search_keeps_previous_results() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/engine/knowledge/search", 422, json!({"detail": "query too short"})).await;
        let store = KnowledgeStore::new(client(&server));

        let err = store.search(&["kb1".to_string()], "a").await.unwrap_err();
        assert_eq!(err.message, "query too short");
        assert!(store.snapshot().results.is_empty());
    }

    #[tokio::test]
    async fn test_hydrate_and_create_base() {
        let server = MockServer::start().await;
        respond(&server, "GET", "/engine/knowledge/bases", 200, json!([{"id": "kb1", "name": "Docs"}])).await;
        respond(&server, "POST", "/engine/knowledge/bases", 200, json!({"id": "kb2", "name": "Notes"})).await;
        let store = KnowledgeStore::new(client(&server));

        store.hydrate().await.unwrap();
        store.create_base("Notes", None, &[]).await.unwrap();
        let bases = store.snapshot().bases;
        assert_eq!(bases.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(), vec!["kb2", "kb1"]);
    }
}
