//! Domain models for the records the engine and cloud backends return.
//!
//! Every collection entity carries a string `id`, unique within its collection,
//! and implements [`Identified`] so stores can replace records by id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record keyed by a string id.
pub trait Identified {
    /// The record id.
    fn id(&self) -> &str;
}

macro_rules! identified {
    ($($ty:ty),* $(,)?) => {
        $(impl Identified for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        })*
    };
}

identified!(
    Workflow,
    WorkflowNode,
    WorkflowEdge,
    ExecutionRun,
    RunTemplate,
    RecordedStep,
    AssistantTask,
    ToolDefinition,
    ToolApproval,
    ToolAudit,
    AudioDevice,
    CallRecord,
    Orchestration,
    Meeting,
    KnowledgeBase,
    KnowledgeDocument,
    SystemAlert,
    Agent,
    WorkflowTrigger,
);

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default, alias = "lastLoginAt")]
    pub last_login_at: Option<String>,
}

/// Login payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCredentials {
    pub identifier: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Token pair issued on login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Body of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub tokens: AuthTokens,
    pub profile: UserProfile,
}

/// Body of a successful token refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

// ---------------------------------------------------------------------------
// Workflows and execution
// ---------------------------------------------------------------------------

/// Canvas position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A step in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default)]
    pub position: Position,
}

/// A directed connection between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, rename = "sourceHandle")]
    pub source_handle: Option<String>,
    #[serde(default, rename = "targetHandle")]
    pub target_handle: Option<String>,
}

/// An automation workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Lifecycle of an execution run or log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// Scheduling priority of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// One execution of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRun {
    pub id: String,
    #[serde(alias = "workflowId")]
    pub workflow_id: String,
    #[serde(default = "default_workflow_name", alias = "workflowName")]
    pub workflow_name: String,
    pub status: RunStatus,
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default, alias = "startedAt")]
    pub started_at: String,
    #[serde(default, alias = "finishedAt")]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub progress: f64,
    #[serde(default, alias = "currentNode")]
    pub current_node: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, Value>,
}

fn default_workflow_name() -> String {
    "workflow".to_string()
}

/// A log line emitted while a run executes a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    #[serde(alias = "runId")]
    pub run_id: String,
    #[serde(alias = "nodeId")]
    pub node_id: String,
    pub status: RunStatus,
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub payload: Option<HashMap<String, Value>>,
}

/// Saved parameter set for launching a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    #[serde(default)]
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// A user action captured by the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedStep {
    pub id: String,
    pub action: String,
    pub target: String,
    pub strategy: String,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

/// Recorder lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderStatus {
    #[default]
    Idle,
    Recording,
    Paused,
    Processing,
    Error,
}

/// How the recorder chooses element locators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderMode {
    #[default]
    Auto,
    Manual,
}

/// Result of stopping a recording.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingResult {
    #[serde(default)]
    pub steps: Vec<RecordedStep>,
}

// ---------------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------------

/// One step of an assistant plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    pub target_type: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<String>,
}

/// State of an assistant task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Planning,
    AwaitingConfirmation,
    Executing,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Planning => "planning",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A planned assistant request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantTask {
    pub id: String,
    pub intent: String,
    pub query: String,
    #[serde(default)]
    pub confidence: f64,
    pub status: TaskStatus,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub result_summary: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// A registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub metadata: Option<HashMap<String, Value>>,
}

/// Approval request for a gated tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolApproval {
    pub id: String,
    pub tool_id: String,
    pub reason: String,
    pub status: String,
    pub requested_by: String,
    #[serde(default)]
    pub reviewer: Option<String>,
}

/// Audit record of a tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAudit {
    pub id: String,
    pub tool_id: String,
    pub triggered_by: String,
    #[serde(default)]
    pub duration_ms: u64,
    pub status: String,
    #[serde(default)]
    pub created_at: String,
}

/// Aggregate governance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GovernanceKpi {
    pub calls: u64,
    pub success_rate: f64,
    pub avg_duration: f64,
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

/// Audio input or output device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub selected: bool,
}

/// One line of a call transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
}

/// A voice call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: String,
    pub contact: String,
    pub channel: String,
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub duration_seconds: u64,
    pub status: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub transcript: Vec<TranscriptLine>,
}

/// Call statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VoiceStats {
    pub today: u64,
    pub total_duration: f64,
    pub avg_duration: f64,
    pub answer_rate: f64,
}

/// Body of `GET /voice/status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceStatus {
    #[serde(default)]
    pub stats: Option<VoiceStats>,
}

// ---------------------------------------------------------------------------
// Multi-agent
// ---------------------------------------------------------------------------

/// Agent taking part in an orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub agent_id: String,
    pub role: String,
}

/// A multi-agent orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orchestration {
    pub id: String,
    pub name: String,
    pub mode: String,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub graph: HashMap<String, Vec<String>>,
    pub status: String,
    #[serde(default)]
    pub updated_at: String,
}

/// A single contribution to a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingTurn {
    pub speaker_agent_id: String,
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
}

/// A meeting between agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub orchestration_id: String,
    pub topic: String,
    pub status: String,
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub max_rounds: u32,
    #[serde(default)]
    pub turns: Vec<MeetingTurn>,
}

// ---------------------------------------------------------------------------
// Knowledge
// ---------------------------------------------------------------------------

/// Usage counters of a knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KnowledgeStats {
    #[serde(default)]
    pub documents: u64,
    #[serde(default)]
    pub chunks: u64,
    #[serde(default)]
    pub queries: u64,
    #[serde(default)]
    pub avg_score: f64,
}

/// A knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stats: KnowledgeStats,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: String,
}

/// A chunk of an indexed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub content: String,
}

/// A document inside a knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub base_id: String,
    pub name: String,
    #[serde(default)]
    pub mime: String,
    pub status: String,
    #[serde(default)]
    pub chunks: Vec<DocumentChunk>,
    #[serde(default)]
    pub created_at: String,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub base_id: String,
    pub document_id: String,
    pub chunk_id: String,
    pub content: String,
    pub score: f64,
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Alert raised by the engine's system monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemAlert {
    pub id: String,
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub created_at: String,
}

/// Body of `GET /system/status`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
    #[serde(default)]
    pub disk: f64,
    #[serde(default, rename = "sidecarStatus", alias = "sidecar_status")]
    pub sidecar_status: Option<String>,
    #[serde(default)]
    pub alerts: Vec<SystemAlert>,
}

/// Installed application found by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareItem {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub install_date: Option<String>,
}

/// Severity filter for `GET /system/logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// One engine log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemLog {
    #[serde(default)]
    pub timestamp: String,
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// A configured agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// `basic`, `react` or `deep_research`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub llm_config: Value,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub knowledge_base_ids: Vec<String>,
    #[serde(default)]
    pub tool_ids: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Fields sent when creating or updating an agent. Absent fields are left
/// untouched by an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_config: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_base_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_ids: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Workflow triggers
// ---------------------------------------------------------------------------

/// Something that starts a workflow: a schedule, a webhook, a file watch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub id: String,
    #[serde(default, alias = "workflowId")]
    pub workflow_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

const fn enabled_by_default() -> bool {
    true
}

/// Body of `POST /workflow/{id}/triggers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDraft {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}
