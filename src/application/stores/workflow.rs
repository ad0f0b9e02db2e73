//! Workflow list, per-workflow triggers, and the locally edited workflow
//! with undo/redo history.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info};

use super::{append, replace_by_id, upsert, Loadable, StoreCell};
use crate::domain::{
    ApiFailure, Backend, TriggerDraft, Workflow, WorkflowEdge, WorkflowNode, WorkflowTrigger,
};
use crate::infrastructure::RequestClient;

/// Snapshot of the workflow store.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub workflows: Vec<Workflow>,
    /// Workflow open in the editor.
    pub current: Option<Workflow>,
    pub selected_node: Option<String>,
    pub history: Vec<Workflow>,
    /// Position of `current` in `history`.
    pub history_index: Option<usize>,
    /// Triggers by workflow id, filled on demand.
    pub triggers: HashMap<String, Vec<WorkflowTrigger>>,
    pub loading: bool,
}

impl Loadable for WorkflowState {
    fn loading_mut(&mut self) -> &mut bool {
        &mut self.loading
    }
}

impl WorkflowState {
    fn reset_history(&mut self, workflow: Option<&Workflow>) {
        self.history = workflow.cloned().into_iter().collect();
        self.history_index = workflow.map(|_| 0);
    }

    /// Drop any redo branch and record `workflow` as the newest entry.
    fn push_history(&mut self, workflow: Workflow) {
        let keep = self.history_index.map_or(0, |i| i + 1);
        self.history.truncate(keep);
        self.history.push(workflow);
        self.history_index = Some(self.history.len() - 1);
    }

    fn jump_to(&mut self, index: usize) -> bool {
        let Some(snapshot) = self.history.get(index).cloned() else {
            return false;
        };
        self.history_index = Some(index);
        upsert(&mut self.workflows, snapshot.clone());
        self.current = Some(snapshot);
        true
    }
}

fn empty_workflow() -> Workflow {
    let now = Utc::now().to_rfc3339();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    Workflow {
        id: format!("workflow-{}", &suffix[..8]),
        name: "Untitled workflow".to_string(),
        description: Some("Draft created by the editor".to_string()),
        version: "1.0.0".to_string(),
        nodes: Vec::new(),
        edges: Vec::new(),
        variables: HashMap::new(),
        created_at: now.clone(),
        updated_at: now,
    }
}

/// Workflow store.
pub struct WorkflowStore {
    client: RequestClient,
    state: StoreCell<WorkflowState>,
}

impl WorkflowStore {
    pub fn new(client: RequestClient) -> Self {
        Self {
            client,
            state: StoreCell::new(WorkflowState::default()),
        }
    }

    pub fn snapshot(&self) -> WorkflowState {
        self.state.snapshot()
    }

    /// Replace the workflow list from the engine.
    pub async fn hydrate(&self) -> Result<(), ApiFailure> {
        let _loading = self.state.begin_loading();
        let workflows = self
            .client
            .get::<Vec<Workflow>>(Backend::Engine, "/workflows")
            .await
            .into_result()?;
        debug!(count = workflows.len(), "Workflows loaded");
        self.state.update(|s| s.workflows = workflows);
        Ok(())
    }

    /// Create the workflow, or update it when the list already holds its id.
    pub async fn save(&self, workflow: &Workflow) -> Result<Workflow, ApiFailure> {
        let exists = self
            .state
            .read()
            .workflows
            .iter()
            .any(|w| w.id == workflow.id);

        let response = if exists {
            self.client
                .put::<Workflow>(Backend::Engine, &format!("/workflows/{}", workflow.id), workflow)
                .await
        } else {
            self.client
                .post::<Workflow>(Backend::Engine, "/workflows", workflow)
                .await
        };
        let saved = response.into_result()?;

        self.state.update(|s| {
            if exists {
                replace_by_id(&mut s.workflows, saved.clone());
            } else {
                append(&mut s.workflows, saved.clone());
            }
            if s.current.as_ref().is_some_and(|c| c.id == saved.id) {
                s.current = Some(saved.clone());
            }
        });
        info!(workflow = %saved.id, created = !exists, "Workflow saved");
        Ok(saved)
    }

    /// Delete a workflow on the engine and locally.
    pub async fn delete(&self, id: &str) -> Result<(), ApiFailure> {
        self.client
            .delete::<serde_json::Value>(Backend::Engine, &format!("/workflows/{id}"))
            .await
            .into_ack()?;

        self.state.update(|s| {
            s.workflows.retain(|w| w.id != id);
            if s.current.as_ref().is_some_and(|c| c.id == id) {
                s.current = None;
                s.selected_node = None;
                s.reset_history(None);
            }
            s.triggers.remove(id);
        });
        Ok(())
    }

    /// Replace the cached triggers of `workflow_id`.
    pub async fn load_triggers(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowTrigger>, ApiFailure> {
        let path = format!("/workflow/{workflow_id}/triggers");
        let triggers = self
            .client
            .get::<Vec<WorkflowTrigger>>(Backend::Engine, &path)
            .await
            .into_result()?;
        debug!(workflow = %workflow_id, count = triggers.len(), "Triggers loaded");
        self.state.update(|s| {
            s.triggers.insert(workflow_id.to_string(), triggers.clone());
        });
        Ok(triggers)
    }

    pub async fn create_trigger(
        &self,
        workflow_id: &str,
        draft: &TriggerDraft,
    ) -> Result<WorkflowTrigger, ApiFailure> {
        let trigger = self
            .client
            .post::<WorkflowTrigger>(
                Backend::Engine,
                &format!("/workflow/{workflow_id}/triggers"),
                draft,
            )
            .await
            .into_result()?;
        self.state.update(|s| {
            append(
                s.triggers.entry(workflow_id.to_string()).or_default(),
                trigger.clone(),
            );
        });
        info!(workflow = %workflow_id, trigger = %trigger.id, kind = %trigger.kind, "Trigger created");
        Ok(trigger)
    }

    /// Open `workflow` in the editor, restarting the history.
    pub fn set_current(&self, workflow: Option<Workflow>) {
        self.state.update(|s| {
            s.selected_node = None;
            s.reset_history(workflow.as_ref());
            if let Some(workflow) = &workflow {
                upsert(&mut s.workflows, workflow.clone());
            }
            s.current = workflow;
        });
    }

    /// The open workflow, creating an empty draft when none is open.
    pub fn ensure_workflow(&self) -> Workflow {
        self.state.update(|s| {
            if let Some(current) = &s.current {
                return current.clone();
            }
            let workflow = empty_workflow();
            s.workflows = vec![workflow.clone()];
            s.reset_history(Some(&workflow));
            s.current = Some(workflow.clone());
            workflow
        })
    }

    pub fn select_node(&self, id: Option<String>) {
        self.state.update(|s| s.selected_node = id);
    }

    /// Apply `f` to the open workflow and record a history entry.
    /// Returns `false` when no workflow is open.
    fn edit(&self, f: impl FnOnce(&mut WorkflowState)) -> bool {
        self.state.update(|s| {
            if s.current.is_none() {
                return false;
            }
            f(s);
            let Some(current) = s.current.as_mut() else {
                return false;
            };
            current.updated_at = Utc::now().to_rfc3339();
            let updated = current.clone();
            upsert(&mut s.workflows, updated.clone());
            s.push_history(updated);
            true
        })
    }

    pub fn add_node(&self, node: WorkflowNode) -> bool {
        self.edit(|s| {
            if let Some(current) = s.current.as_mut() {
                current.nodes.push(node);
            }
        })
    }

    pub fn update_node(&self, id: &str, patch: impl FnOnce(&mut WorkflowNode)) -> bool {
        self.edit(|s| {
            if let Some(node) = s
                .current
                .as_mut()
                .and_then(|c| c.nodes.iter_mut().find(|n| n.id == id))
            {
                patch(node);
            }
        })
    }

    /// Remove a node together with its edges.
    pub fn delete_node(&self, id: &str) -> bool {
        self.edit(|s| {
            if let Some(current) = s.current.as_mut() {
                current.nodes.retain(|n| n.id != id);
                current.edges.retain(|e| e.source != id && e.target != id);
            }
            if s.selected_node.as_deref() == Some(id) {
                s.selected_node = None;
            }
        })
    }

    pub fn add_edge(&self, edge: WorkflowEdge) -> bool {
        self.edit(|s| {
            if let Some(current) = s.current.as_mut() {
                current.edges.push(edge);
            }
        })
    }

    pub fn delete_edge(&self, id: &str) -> bool {
        self.edit(|s| {
            if let Some(current) = s.current.as_mut() {
                current.edges.retain(|e| e.id != id);
            }
        })
    }

    /// Step back in the history. Returns `false` at the oldest entry.
    pub fn undo(&self) -> bool {
        self.state.update(|s| match s.history_index {
            Some(i) if i > 0 => s.jump_to(i - 1),
            _ => false,
        })
    }

    /// Step forward in the history. Returns `false` at the newest entry.
    pub fn redo(&self) -> bool {
        self.state.update(|s| match s.history_index {
            Some(i) if i + 1 < s.history.len() => s.jump_to(i + 1),
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{client, respond};
    use super::*;
    use crate::domain::Position;
    use serde_json::json;
    use wiremock::MockServer;

    fn node(id: &str) -> WorkflowNode {
        WorkflowNode {
            id: id.into(),
            kind: "action".into(),
            label: id.into(),
            config: HashMap::new(),
            position: Position { x: 0.0, y: 0.0 },
        }
    }

    fn edge(id: &str, source: &str, target: &str) -> WorkflowEdge {
        WorkflowEdge {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    async fn offline_store() -> (WorkflowStore, MockServer) {
        let server = MockServer::start().await;
        (WorkflowStore::new(client(&server)), server)
    }

    #[tokio::test]
    async fn test_undo_redo_history() {
        let (store, _server) = offline_store().await;
        store.ensure_workflow();
        assert!(!store.undo());

        store.add_node(node("a"));
        store.add_node(node("b"));
        assert_eq!(store.snapshot().current.unwrap().nodes.len(), 2);

        assert!(store.undo());
        assert_eq!(store.snapshot().current.unwrap().nodes.len(), 1);
        assert!(store.redo());
        assert_eq!(store.snapshot().current.unwrap().nodes.len(), 2);
        assert!(!store.redo());

        store.undo();
        store.add_node(node("c"));
        assert!(!store.redo());
        let ids: Vec<_> = store
            .snapshot()
            .current
            .unwrap()
            .nodes
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_delete_node_drops_edges_and_selection() {
        let (store, _server) = offline_store().await;
        store.ensure_workflow();
        store.add_node(node("a"));
        store.add_node(node("b"));
        store.add_edge(edge("e1", "a", "b"));
        store.select_node(Some("a".into()));

        assert!(store.delete_node("a"));
        let state = store.snapshot();
        let current = state.current.unwrap();
        assert!(current.edges.is_empty());
        assert_eq!(current.nodes.len(), 1);
        assert!(state.selected_node.is_none());
        assert_eq!(state.workflows[0].nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_edit_without_open_workflow_is_rejected() {
        let (store, _server) = offline_store().await;
        assert!(!store.add_node(node("a")));
        assert!(store.snapshot().history.is_empty());
    }

    #[tokio::test]
    async fn test_failed_create_leaves_list_unchanged() {
        let server = MockServer::start().await;
        respond(
            &server,
            "POST",
            "/engine/workflows",
            200,
            json!({"success": false, "error": "quota exceeded"}),
        )
        .await;
        let store = WorkflowStore::new(client(&server));
        let draft = store.ensure_workflow();
        let before = store.snapshot().workflows;

        let mut other = draft.clone();
        other.id = "workflow-new".into();
        let err = store.save(&other).await.unwrap_err();
        assert_eq!(err.message, "quota exceeded");
        assert_eq!(store.snapshot().workflows, before);
    }

    #[tokio::test]
    async fn test_hydrate_failure_clears_loading() {
        let server = MockServer::start().await;
        respond(&server, "GET", "/engine/workflows", 500, json!({})).await;
        let store = WorkflowStore::new(client(&server));

        assert!(store.hydrate().await.is_err());
        assert!(!store.snapshot().loading);
    }

    #[tokio::test]
    async fn test_save_existing_replaces() {
        let server = MockServer::start().await;
        let store = WorkflowStore::new(client(&server));
        let mut draft = store.ensure_workflow();
        draft.name = "Renamed".into();
        respond(
            &server,
            "PUT",
            &format!("/engine/workflows/{}", draft.id),
            200,
            serde_json::to_value(&draft).unwrap(),
        )
        .await;

        store.save(&draft).await.unwrap();
        let state = store.snapshot();
        assert_eq!(state.workflows.len(), 1);
        assert_eq!(state.workflows[0].name, "Renamed");
        assert_eq!(state.current.unwrap().name, "Renamed");
    }

    #[tokio::test]
    async fn test_triggers_load_and_create() {
        let server = MockServer::start().await;
        respond(
            &server,
            "GET",
            "/engine/workflow/w1/triggers",
            200,
            json!([{"id": "t1", "workflow_id": "w1", "type": "schedule", "config": {"cron": "0 9 * * 1"}}]),
        )
        .await;
        respond(
            &server,
            "POST",
            "/engine/workflow/w1/triggers",
            200,
            json!({"id": "t2", "workflow_id": "w1", "type": "webhook", "enabled": false}),
        )
        .await;
        let store = WorkflowStore::new(client(&server));

        let loaded = store.load_triggers("w1").await.unwrap();
        assert_eq!(loaded[0].config["cron"], "0 9 * * 1");

        let draft = TriggerDraft {
            kind: "webhook".into(),
            config: HashMap::new(),
            enabled: Some(false),
        };
        let created = store.create_trigger("w1", &draft).await.unwrap();
        assert!(!created.enabled);

        let kinds: Vec<_> = store.snapshot().triggers["w1"]
            .iter()
            .map(|t| t.kind.clone())
            .collect();
        assert_eq!(kinds, vec!["schedule", "webhook"]);
    }

    #[tokio::test]
    async fn test_failed_trigger_create_leaves_cache() {
        let server = MockServer::start().await;
        respond(
            &server,
            "POST",
            "/engine/workflow/w1/triggers",
            422,
            json!({"detail": "unknown trigger type"}),
        )
        .await;
        let store = WorkflowStore::new(client(&server));

        let draft = TriggerDraft {
            kind: "telepathy".into(),
            config: HashMap::new(),
            enabled: None,
        };
        let err = store.create_trigger("w1", &draft).await.unwrap_err();
        assert_eq!(err.message, "unknown trigger type");
        assert!(store.snapshot().triggers.is_empty());
    }
}
