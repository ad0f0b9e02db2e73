//! Assistant tasks and plans.

use serde_json::{json, Value};
use tracing::info;

use super::{prepend, replace_by_id, Loadable, StoreCell};
use crate::domain::{ApiFailure, AssistantTask, Backend, TaskStatus};
use crate::infrastructure::RequestClient;

#[derive(Debug, Clone, Default)]
pub struct AssistantState {
    /// Newest first.
    pub tasks: Vec<AssistantTask>,
    /// Task the user is working on.
    pub active_task: Option<AssistantTask>,
    pub loading: bool,
}

impl Loadable for AssistantState {
    fn loading_mut(&mut self) -> &mut bool {
        &mut self.loading
    }
}

impl AssistantState {
    fn replace(&mut self, task: AssistantTask) {
        if self.active_task.as_ref().is_some_and(|t| t.id == task.id) {
            self.active_task = Some(task.clone());
        }
        replace_by_id(&mut self.tasks, task);
    }
}

pub struct AssistantStore {
    client: RequestClient,
    state: StoreCell<AssistantState>,
}

impl AssistantStore {
    pub fn new(client: RequestClient) -> Self {
        Self {
            client,
            state: StoreCell::new(AssistantState::default()),
        }
    }

    pub fn snapshot(&self) -> AssistantState {
        self.state.snapshot()
    }

    pub async fn hydrate(&self) -> Result<(), ApiFailure> {
        let _loading = self.state.begin_loading();
        let tasks = self
            .client
            .get::<Vec<AssistantTask>>(Backend::Engine, "/assistant/tasks")
            .await
            .into_result()?;
        self.state.update(|s| s.tasks = tasks);
        Ok(())
    }

    /// Plan a new task from a natural-language query; it becomes the active task.
    pub async fn plan(&self, query: &str) -> Result<AssistantTask, ApiFailure> {
        let _loading = self.state.begin_loading();
        let task = self
            .client
            .post::<AssistantTask>(Backend::Engine, "/assistant/plan", &json!({ "query": query }))
            .await
            .into_result()?;

        info!(task = %task.id, intent = %task.intent, "Task planned");
        self.state.update(|s| {
            prepend(&mut s.tasks, task.clone());
            s.active_task = Some(task.clone());
        });
        Ok(task)
    }

    /// Report progress on one plan step.
    pub async fn update_step(
        &self,
        task_id: &str,
        step_id: &str,
        payload: &Value,
    ) -> Result<Option<AssistantTask>, ApiFailure> {
        let data = self
            .client
            .post::<Value>(
                Backend::Engine,
                &format!("/assistant/tasks/{task_id}/steps/{step_id}"),
                payload,
            )
            .await
            .into_optional()?;

        let task = data.and_then(|v| serde_json::from_value::<AssistantTask>(v).ok());
        if let Some(task) = &task {
            self.state.update(|s| s.replace(task.clone()));
        }
        Ok(task)
    }

    /// Mark a task completed with a summary.
    pub async fn complete(&self, task_id: &str, summary: &str) -> Result<(), ApiFailure> {
        let data = self
            .client
            .post::<Value>(
                Backend::Engine,
                &format!("/assistant/tasks/{task_id}/complete"),
                &json!({ "summary": summary }),
            )
            .await
            .into_optional()?;

        let returned = data.and_then(|v| serde_json::from_value::<AssistantTask>(v).ok());
        self.state.update(|s| {
            let updated = returned.or_else(|| {
                s.tasks.iter().find(|t| t.id == task_id).cloned().map(|mut t| {
                    t.status = TaskStatus::Completed;
                    t.result_summary = Some(summary.to_string());
                    t
                })
            });
            if let Some(task) = updated {
                s.replace(task);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{client, respond};
    use super::*;
    use wiremock::MockServer;

    fn task_json(id: &str) -> Value {
        json!({"id": id, "intent": "search", "query": "find invoices", "status": "planning"})
    }

    #[tokio::test]
    async fn test_plan_prepends_and_activates() {
        let server = MockServer::start().await;
        respond(&server, "GET", "/engine/assistant/tasks", 200, json!([task_json("t1")])).await;
        respond(&server, "POST", "/engine/assistant/plan", 200, task_json("t2")).await;
        let store = AssistantStore::new(client(&server));

        store.hydrate().await.unwrap();
        store.plan("find invoices").await.unwrap();
        let state = store.snapshot();
        assert_eq!(state.tasks[0].id, "t2");
        assert_eq!(state.active_task.unwrap().id, "t2");
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_complete_patches_locally_when_no_task_returned() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/engine/assistant/plan", 200, task_json("t1")).await;
        respond(&server, "POST", "/engine/assistant/tasks/t1/complete", 200, json!({"success": true})).await;
        let store = AssistantStore::new(client(&server));

        store.plan("q").await.unwrap();
        store.complete("t1", "done").await.unwrap();
        let state = store.snapshot();
        assert_eq!(state.tasks[0].status, TaskStatus::Completed);
        assert_eq!(state.active_task.unwrap().result_summary.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_failed_complete_changes_nothing() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/engine/assistant/plan", 200, task_json("t1")).await;
        respond(&server, "POST", "/engine/assistant/tasks/t1/complete", 500, json!({})).await;
        let store = AssistantStore::new(client(&server));

        store.plan("q").await.unwrap();
        assert!(store.complete("t1", "done").await.is_err());
        assert_eq!(store.snapshot().tasks[0].status, TaskStatus::Planning);
    }

    #[tokio::test]
    async fn test_update_step_replaces_returned_task() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/engine/assistant/plan", 200, task_json("t1")).await;
        let mut executing = task_json("t1");
        executing["status"] = json!("executing");
        respond(&server, "POST", "/engine/assistant/tasks/t1/steps/s1", 200, executing).await;
        let store = AssistantStore::new(client(&server));

        store.plan("q").await.unwrap();
        let task = store
            .update_step("t1", "s1", &json!({"status": "done"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.status, TaskStatus::Executing);
        assert_eq!(store.snapshot().tasks[0].status, TaskStatus::Executing);
    }
}
