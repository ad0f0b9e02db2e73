//! Tool registry, approvals, audits and governance metrics.

use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::{append, replace_by_id, Loadable, StoreCell};
use crate::domain::{ApiFailure, Backend, GovernanceKpi, ToolApproval, ToolAudit, ToolDefinition};
use crate::infrastructure::RequestClient;

/// Body of a tool registration.
#[derive(Debug, Clone, Serialize)]
pub struct ToolRegistration {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub tags: Vec<String>,
    pub approval_required: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ToolState {
    pub tools: Vec<ToolDefinition>,
    pub approvals: Vec<ToolApproval>,
    pub audits: Vec<ToolAudit>,
    pub kpi: Option<GovernanceKpi>,
    pub loading: bool,
}

impl Loadable for ToolState {
    fn loading_mut(&mut self) -> &mut bool {
        &mut self.loading
    }
}

pub struct ToolStore {
    client: RequestClient,
    state: StoreCell<ToolState>,
}

impl ToolStore {
    pub fn new(client: RequestClient) -> Self {
        Self {
            client,
            state: StoreCell::new(ToolState::default()),
        }
    }

    pub fn snapshot(&self) -> ToolState {
        self.state.snapshot()
    }

    /// Load tools, approvals, audits and KPIs concurrently. Failed slices
    /// keep their previous contents.
    pub async fn hydrate(&self) -> Result<(), ApiFailure> {
        let _loading = self.state.begin_loading();
        let (tools, approvals, audits, kpi) = tokio::join!(
            self.client.get::<Vec<ToolDefinition>>(Backend::Engine, "/tools"),
            self.client.get::<Vec<ToolApproval>>(Backend::Engine, "/tools/approvals"),
            self.client.get::<Vec<ToolAudit>>(Backend::Engine, "/tools/audits"),
            self.client.get::<GovernanceKpi>(Backend::Engine, "/tools/kpi"),
        );
        let tools = tools.into_result();
        let approvals = approvals.into_result();
        let audits = audits.into_result();
        let kpi = kpi.into_result();

        self.state.update(|s| {
            if let Ok(tools) = &tools {
                s.tools.clone_from(tools);
            }
            if let Ok(approvals) = &approvals {
                s.approvals.clone_from(approvals);
            }
            if let Ok(audits) = &audits {
                s.audits.clone_from(audits);
            }
            if let Ok(kpi) = &kpi {
                s.kpi = Some(*kpi);
            }
        });

        tools.and(approvals).and(audits).and(kpi).map(|_| ())
    }

    /// Register a tool; it is appended to the registry.
    pub async fn register_tool(
        &self,
        registration: &ToolRegistration,
    ) -> Result<ToolDefinition, ApiFailure> {
        let tool = self
            .client
            .post::<ToolDefinition>(Backend::Engine, "/tools", registration)
            .await
            .into_result()?;
        info!(tool = %tool.id, "Tool registered");
        self.state.update(|s| append(&mut s.tools, tool.clone()));
        Ok(tool)
    }

    /// Approve or reject a pending approval request.
    pub async fn review_approval(
        &self,
        approval_id: &str,
        approved: bool,
        reviewer: &str,
    ) -> Result<ToolApproval, ApiFailure> {
        let decision = if approved { "approved" } else { "rejected" };
        let approval = self
            .client
            .post::<ToolApproval>(
                Backend::Engine,
                &format!("/tools/approvals/{approval_id}/review"),
                &json!({ "status": decision, "reviewer": reviewer }),
            )
            .await
            .into_result()?;
        self.state.update(|s| {
            replace_by_id(&mut s.approvals, approval.clone());
        });
        Ok(approval)
    }
}
