//! Terminal output for store snapshots.
//!
//! Two formats: a table view for people and pretty JSON for scripts.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use crate::domain::{
    Agent, AssistantTask, CallRecord, ConnectionState, ExecutionRun, KnowledgeBase, RetrievalResult,
    RunStatus, Session, SystemMetrics, ToolDefinition, Workflow,
};

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// JSON for programmatic use.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {s}. Use: table, json")),
        }
    }
}

/// Pretty JSON of any serializable snapshot.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(header);
    table
}

pub fn format_connections_table(states: &[ConnectionState]) -> String {
    let mut out = table(vec!["Backend", "Status", "Last checked"]);
    for state in states {
        let status = if state.reachable {
            "reachable".green().to_string()
        } else {
            "unreachable".red().to_string()
        };
        let checked = state.last_checked_at.map_or_else(
            || "-".to_string(),
            |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        out.add_row(vec![state.id.to_string(), status, checked]);
    }
    out.to_string()
}

/// One-paragraph description of the signed-in user.
pub fn format_session(session: &Session) -> String {
    match &session.profile {
        Some(profile) if session.is_authenticated() => {
            let mut out = format!(
                "{} {} <{}>",
                "Signed in as".bold(),
                profile.name.cyan(),
                profile.email
            );
            if let Some(org) = &profile.organization {
                out.push_str(&format!("\n  Organization: {org}"));
            }
            if let Some(last) = &profile.last_login_at {
                out.push_str(&format!("\n  Last login: {last}"));
            }
            out
        }
        _ => format!("{} ({})", "Not signed in".yellow(), session.status),
    }
}

pub fn format_workflows_table(workflows: &[Workflow]) -> String {
    let mut out = table(vec!["ID", "Name", "Nodes", "Edges", "Updated"]);
    for wf in workflows {
        out.add_row(vec![
            truncate(&wf.id, 20),
            truncate(&wf.name, 35),
            wf.nodes.len().to_string(),
            wf.edges.len().to_string(),
            or_dash(&wf.updated_at),
        ]);
    }
    out.to_string()
}

fn colored_status(status: RunStatus) -> String {
    let label = status.to_string();
    match status {
        RunStatus::Completed => label.green().to_string(),
        RunStatus::Failed => label.red().to_string(),
        RunStatus::Running => label.cyan().to_string(),
        RunStatus::Paused | RunStatus::Pending => label.yellow().to_string(),
        RunStatus::Cancelled => label.dimmed().to_string(),
    }
}

pub fn format_runs_table(runs: &[ExecutionRun]) -> String {
    let mut out = table(vec!["Run", "Workflow", "Status", "Progress", "Started"]);
    for run in runs {
        out.add_row(vec![
            truncate(&run.id, 20),
            truncate(&run.workflow_name, 30),
            colored_status(run.status),
            format!("{:.0}%", run.progress),
            or_dash(&run.started_at),
        ]);
    }
    out.to_string()
}

/// Single-line rendering of a run update, for live views.
pub fn format_run_line(run: &ExecutionRun) -> String {
    format!(
        "{} {} {} {:.0}%",
        run.id.dimmed(),
        run.workflow_name,
        colored_status(run.status),
        run.progress
    )
}

pub fn format_tasks_table(tasks: &[AssistantTask]) -> String {
    let mut out = table(vec!["Task", "Intent", "Status", "Steps", "Query"]);
    for task in tasks {
        out.add_row(vec![
            truncate(&task.id, 20),
            task.intent.clone(),
            task.status.to_string(),
            task.steps.len().to_string(),
            truncate(&task.query, 40),
        ]);
    }
    out.to_string()
}

pub fn format_tools_table(tools: &[ToolDefinition]) -> String {
    let mut out = table(vec!["Tool", "Type", "Enabled", "Approval", "Description"]);
    for tool in tools {
        out.add_row(vec![
            tool.name.clone(),
            tool.kind.clone(),
            yes_no(tool.enabled),
            yes_no(tool.approval_required),
            truncate(&tool.description, 40),
        ]);
    }
    out.to_string()
}

pub fn format_agents_table(agents: &[Agent]) -> String {
    let mut out = table(vec!["Agent", "Name", "Type", "Tools", "Description"]);
    for agent in agents {
        out.add_row(vec![
            truncate(&agent.id, 20),
            truncate(&agent.name, 30),
            agent.kind.clone(),
            agent.tool_ids.len().to_string(),
            truncate(&agent.description, 40),
        ]);
    }
    out.to_string()
}

pub fn format_calls_table(calls: &[CallRecord]) -> String {
    let mut out = table(vec!["Call", "Contact", "Channel", "Status", "Duration"]);
    for call in calls {
        out.add_row(vec![
            truncate(&call.id, 20),
            call.contact.clone(),
            call.channel.clone(),
            call.status.clone(),
            format!("{}s", call.duration_seconds),
        ]);
    }
    out.to_string()
}

pub fn format_bases_table(bases: &[KnowledgeBase]) -> String {
    let mut out = table(vec!["Base", "Name", "Docs", "Chunks", "Tags"]);
    for base in bases {
        out.add_row(vec![
            truncate(&base.id, 20),
            truncate(&base.name, 30),
            base.stats.documents.to_string(),
            base.stats.chunks.to_string(),
            base.tags.join(", "),
        ]);
    }
    out.to_string()
}

pub fn format_results_table(results: &[RetrievalResult]) -> String {
    let mut out = table(vec!["Score", "Document", "Content"]);
    for hit in results {
        out.add_row(vec![
            format!("{:.3}", hit.score),
            truncate(&hit.document_id, 20),
            truncate(&hit.content, 60),
        ]);
    }
    out.to_string()
}

/// Formats host metrics for display.
pub fn format_metrics(metrics: &SystemMetrics) -> String {
    format!(
        "{}\n  CPU: {}%\n  Memory: {}%\n  Disk: {}%\n  Sidecar: {}\n  Alerts: {}",
        "System".bold(),
        format!("{:.1}", metrics.cpu).cyan(),
        format!("{:.1}", metrics.memory).cyan(),
        format!("{:.1}", metrics.disk).cyan(),
        metrics.sidecar_status.as_deref().unwrap_or("unknown"),
        metrics.alerts.len().to_string().yellow()
    )
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

fn or_dash(s: &str) -> String {
    if s.is_empty() {
        "-".to_string()
    } else {
        s.to_string()
    }
}

/// Truncates the first line of a string to `max_len` characters with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    let line = s.lines().next().unwrap_or(s);
    if line.chars().count() <= max_len {
        line.to_string()
    } else {
        let kept: String = line.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
