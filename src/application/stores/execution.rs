//! Workflow runs, their logs and saved run templates.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{prepend, Loadable, StoreCell};
use crate::domain::{
    ApiFailure, Backend, ExecutionEvent, ExecutionLog, ExecutionRun, Priority, Result, RunStatus,
    RunTemplate, Workflow,
};
use crate::infrastructure::{connect_ws, Listener, RequestClient, StreamSignal, WORKFLOW_WS_PATH};

/// Most runs kept in memory; older ones fall off the end.
pub const MAX_RUNS: usize = 20;

/// Snapshot of the execution store.
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    /// Newest first.
    pub runs: Vec<ExecutionRun>,
    pub logs: Vec<ExecutionLog>,
    pub selected_run: Option<String>,
    /// Templates keyed by workflow id, newest first.
    pub templates: HashMap<String, Vec<RunTemplate>>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Loadable for ExecutionState {
    fn loading_mut(&mut self) -> &mut bool {
        &mut self.loading
    }
}

impl ExecutionState {
    fn apply_run(&mut self, run: ExecutionRun) {
        if let Some(slot) = self.runs.iter_mut().find(|r| r.id == run.id) {
            *slot = run;
        } else {
            self.runs.insert(0, run);
            self.runs.truncate(MAX_RUNS);
        }
    }

    fn set_status(&mut self, run_id: &str, status: RunStatus) {
        if let Some(run) = self.runs.iter_mut().find(|r| r.id == run_id) {
            run.status = status;
        }
    }
}

/// Execution store.
pub struct ExecutionStore {
    client: RequestClient,
    state: StoreCell<ExecutionState>,
}

impl ExecutionStore {
    pub fn new(client: RequestClient) -> Self {
        Self {
            client,
            state: StoreCell::new(ExecutionState::default()),
        }
    }

    pub fn snapshot(&self) -> ExecutionState {
        self.state.snapshot()
    }

    /// Load recent runs.
    pub async fn hydrate(&self) -> std::result::Result<(), ApiFailure> {
        let _loading = self.state.begin_loading();
        let result = self
            .client
            .get::<Vec<ExecutionRun>>(Backend::Engine, "/workflow/runs")
            .await
            .into_result();

        self.state.update(|s| match &result {
            Ok(runs) => {
                s.runs = runs.iter().take(MAX_RUNS).cloned().collect();
                s.error = None;
            }
            Err(failure) => s.error = Some(failure.message.clone()),
        });
        result.map(|_| ())
    }

    /// Merge a pushed run snapshot or log line.
    pub fn apply_event(&self, event: ExecutionEvent) {
        self.state.update(|s| match event {
            ExecutionEvent::Run(run) => s.apply_run(run),
            ExecutionEvent::Log(log) => s.logs.push(log),
        });
    }

    /// Select a run and load its logs.
    pub async fn select_run(&self, run_id: &str) -> std::result::Result<(), ApiFailure> {
        self.state.update(|s| {
            s.selected_run = Some(run_id.to_string());
            s.logs.clear();
        });

        let logs = self
            .client
            .get::<Vec<ExecutionLog>>(Backend::Engine, &format!("/workflow/{run_id}/logs"))
            .await
            .into_result()?;

        self.state.update(|s| {
            if s.selected_run.as_deref() == Some(run_id) {
                s.logs = logs;
            }
        });
        Ok(())
    }

    /// Ask the engine to execute `workflow`.
    pub async fn start_run(
        &self,
        workflow: &Workflow,
        params: HashMap<String, Value>,
        priority: Priority,
    ) -> std::result::Result<Option<ExecutionRun>, ApiFailure> {
        let _loading = self.state.begin_loading();
        let body = json!({ "workflow": workflow, "params": params, "priority": priority });
        let result = self
            .client
            .post::<Value>(Backend::Engine, "/workflow/execute", &body)
            .await
            .into_optional();

        match result {
            Ok(data) => {
                let run = data.and_then(|v| serde_json::from_value::<ExecutionRun>(v).ok());
                if let Some(run) = &run {
                    info!(run = %run.id, workflow = %workflow.id, "Run started");
                    self.state.update(|s| s.apply_run(run.clone()));
                }
                Ok(run)
            }
            Err(failure) => {
                self.state.update(|s| s.error = Some(failure.message.clone()));
                Err(failure)
            }
        }
    }

    async fn control(
        &self,
        run_id: &str,
        action: &str,
        status: RunStatus,
    ) -> std::result::Result<(), ApiFailure> {
        self.client
            .post::<Value>(
                Backend::Engine,
                &format!("/workflow/runs/{run_id}/{action}"),
                &json!({}),
            )
            .await
            .into_ack()?;
        self.state.update(|s| s.set_status(run_id, status));
        debug!(run = %run_id, action, "Run control applied");
        Ok(())
    }

    pub async fn pause_run(&self, run_id: &str) -> std::result::Result<(), ApiFailure> {
        self.control(run_id, "pause", RunStatus::Paused).await
    }

    pub async fn resume_run(&self, run_id: &str) -> std::result::Result<(), ApiFailure> {
        self.control(run_id, "resume", RunStatus::Running).await
    }

    pub async fn cancel_run(&self, run_id: &str) -> std::result::Result<(), ApiFailure> {
        self.control(run_id, "cancel", RunStatus::Cancelled).await
    }

    pub async fn load_templates(
        &self,
        workflow_id: &str,
    ) -> std::result::Result<Vec<RunTemplate>, ApiFailure> {
        let templates = self
            .client
            .get::<Vec<RunTemplate>>(Backend::Engine, &format!("/workflow/{workflow_id}/templates"))
            .await
            .into_result()?;
        self.state.update(|s| {
            s.templates
                .insert(workflow_id.to_string(), templates.clone());
        });
        Ok(templates)
    }

    pub async fn save_template(
        &self,
        workflow_id: &str,
        name: &str,
        params: HashMap<String, Value>,
    ) -> std::result::Result<RunTemplate, ApiFailure> {
        let template = self
            .client
            .post::<RunTemplate>(
                Backend::Engine,
                &format!("/workflow/{workflow_id}/templates"),
                &json!({ "name": name, "params": params }),
            )
            .await
            .into_result()?;
        self.state.update(|s| {
            prepend(
                s.templates.entry(workflow_id.to_string()).or_default(),
                template.clone(),
            );
        });
        Ok(template)
    }

    /// Follow the workflow channel, merging every event into this store.
    ///
    /// # Errors
    /// Returns `AppError::Transport` when the socket cannot be opened.
    pub async fn watch(self: &Arc<Self>, ws_base: &str) -> Result<Listener> {
        let subscription = connect_ws::<ExecutionEvent>(&format!("{ws_base}{WORKFLOW_WS_PATH}")).await?;
        let store = Arc::clone(self);
        Ok(Listener::spawn(subscription, move |signal| match signal {
            StreamSignal::Event(event) => store.apply_event(event),
            StreamSignal::Failed(reason) => warn!(%reason, "Workflow channel failed"),
            StreamSignal::Completed => info!("Workflow channel closed"),
        }))
    }
}
