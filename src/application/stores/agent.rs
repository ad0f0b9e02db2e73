//! Agent configurations.

use tracing::{debug, info};

use super::{append, replace_by_id, Loadable, StoreCell};
use crate::domain::{Agent, AgentDraft, ApiFailure, Backend};
use crate::infrastructure::RequestClient;

#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub agents: Vec<Agent>,
    /// Agent opened for viewing or editing.
    pub current: Option<Agent>,
    pub loading: bool,
    /// Message of the last failed action.
    pub error: Option<String>,
}

impl Loadable for AgentState {
    fn loading_mut(&mut self) -> &mut bool {
        &mut self.loading
    }
}

pub struct AgentStore {
    client: RequestClient,
    state: StoreCell<AgentState>,
}

impl AgentStore {
    pub fn new(client: RequestClient) -> Self {
        Self {
            client,
            state: StoreCell::new(AgentState::default()),
        }
    }

    pub fn snapshot(&self) -> AgentState {
        self.state.snapshot()
    }

    /// Record the outcome of an action in `error`.
    fn settle<T>(&self, result: Result<T, ApiFailure>) -> Result<T, ApiFailure> {
        self.state
            .update(|s| s.error = result.as_ref().err().map(|e| e.message.clone()));
        result
    }

    /// Replace the agent list.
    pub async fn hydrate(&self) -> Result<(), ApiFailure> {
        let _loading = self.state.begin_loading();
        let agents = self
            .client
            .get::<Vec<Agent>>(Backend::Engine, "/agent")
            .await
            .into_result();
        let agents = self.settle(agents)?;
        debug!(count = agents.len(), "Agents loaded");
        self.state.update(|s| s.agents = agents);
        Ok(())
    }

    /// Fetch one agent and make it current.
    pub async fn load(&self, id: &str) -> Result<Agent, ApiFailure> {
        let _loading = self.state.begin_loading();
        let agent = self
            .client
            .get::<Agent>(Backend::Engine, &format!("/agent/{id}"))
            .await
            .into_result();
        let agent = self.settle(agent)?;
        self.state.update(|s| s.current = Some(agent.clone()));
        Ok(agent)
    }

    pub async fn create(&self, draft: &AgentDraft) -> Result<Agent, ApiFailure> {
        let _loading = self.state.begin_loading();
        let agent = self
            .client
            .post::<Agent>(Backend::Engine, "/agent", draft)
            .await
            .into_result();
        let agent = self.settle(agent)?;
        self.state.update(|s| append(&mut s.agents, agent.clone()));
        info!(agent = %agent.id, "Agent created");
        Ok(agent)
    }

    /// Apply `draft` to agent `id`; the current agent follows the update.
    pub async fn update(&self, id: &str, draft: &AgentDraft) -> Result<Agent, ApiFailure> {
        let _loading = self.state.begin_loading();
        let agent = self
            .client
            .put::<Agent>(Backend::Engine, &format!("/agent/{id}"), draft)
            .await
            .into_result();
        let agent = self.settle(agent)?;
        self.state.update(|s| {
            replace_by_id(&mut s.agents, agent.clone());
            if s.current.as_ref().is_some_and(|c| c.id == id) {
                s.current = Some(agent.clone());
            }
        });
        Ok(agent)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiFailure> {
        let _loading = self.state.begin_loading();
        let ack = self
            .client
            .delete::<serde_json::Value>(Backend::Engine, &format!("/agent/{id}"))
            .await
            .into_ack();
        self.settle(ack)?;
        self.state.update(|s| {
            s.agents.retain(|a| a.id != id);
            if s.current.as_ref().is_some_and(|c| c.id == id) {
                s.current = None;
            }
        });
        info!(agent = %id, "Agent deleted");
        Ok(())
    }

    pub fn set_current(&self, agent: Option<Agent>) {
        self.state.update(|s| s.current = agent);
    }

    pub fn clear_error(&self) {
        self.state.update(|s| s.error = None);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{client, respond};
    use super::*;
    use serde_json::json;
    use wiremock::MockServer;

    fn agent_json(id: &str, name: &str) -> serde_json::Value {
        json!({"id": id, "name": name, "type": "basic", "system_prompt": "be brief"})
    }

    async fn hydrated(server: &MockServer) -> AgentStore {
        respond(
            server,
            "GET",
            "/engine/agent",
            200,
            json!({"success": true, "data": [agent_json("a1", "Writer"), agent_json("a2", "Coder")]}),
        )
        .await;
        let store = AgentStore::new(client(server));
        store.hydrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_hydrate_and_load_current() {
        let server = MockServer::start().await;
        respond(&server, "GET", "/engine/agent/a2", 200, agent_json("a2", "Coder")).await;
        let store = hydrated(&server).await;

        let agent = store.load("a2").await.unwrap();
        assert_eq!(agent.kind, "basic");
        let state = store.snapshot();
        assert_eq!(state.agents.len(), 2);
        assert_eq!(state.current.map(|a| a.name).as_deref(), Some("Coder"));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_create_appends() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/engine/agent", 200, agent_json("a3", "Planner")).await;
        let store = hydrated(&server).await;

        let draft = AgentDraft {
            name: Some("Planner".into()),
            ..AgentDraft::default()
        };
        store.create(&draft).await.unwrap();
        let ids: Vec<_> = store.snapshot().agents.into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a1", "a2", "a3"]);
    }

    #[tokio::test]
    async fn test_update_replaces_list_entry_and_current() {
        let server = MockServer::start().await;
        respond(&server, "PUT", "/engine/agent/a1", 200, agent_json("a1", "Editor")).await;
        let store = hydrated(&server).await;
        store.set_current(store.snapshot().agents.first().cloned());

        let draft = AgentDraft {
            name: Some("Editor".into()),
            ..AgentDraft::default()
        };
        store.update("a1", &draft).await.unwrap();
        let state = store.snapshot();
        assert_eq!(state.agents[0].name, "Editor");
        assert_eq!(state.current.unwrap().name, "Editor");
    }

    #[tokio::test]
    async fn test_delete_removes_and_clears_current() {
        let server = MockServer::start().await;
        respond(&server, "DELETE", "/engine/agent/a1", 200, json!({"success": true})).await;
        let store = hydrated(&server).await;
        store.set_current(store.snapshot().agents.first().cloned());

        store.delete("a1").await.unwrap();
        let state = store.snapshot();
        assert_eq!(state.agents.len(), 1);
        assert!(state.current.is_none());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_agent_and_records_error() {
        let server = MockServer::start().await;
        respond(&server, "DELETE", "/engine/agent/a1", 409, json!({"error": "agent in use"})).await;
        let store = hydrated(&server).await;

        let err = store.delete("a1").await.unwrap_err();
        assert_eq!(err.message, "agent in use");
        let state = store.snapshot();
        assert_eq!(state.agents.len(), 2);
        assert_eq!(state.error.as_deref(), Some("agent in use"));
        assert!(!state.loading);

        store.clear_error();
        assert!(store.snapshot().error.is_none());
    }
}
