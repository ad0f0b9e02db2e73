//! Application layer - stores, connection health and wiring.
//!
//! Stores turn backend envelopes into in-memory state; the monitor and
//! pollers run the background loops; [`AppContext`] ties them together.

pub mod connection_monitor;
pub mod context;
pub mod formatter;
pub mod polling;
pub mod stores;

pub use connection_monitor::ConnectionMonitor;
pub use context::AppContext;
pub use formatter::{
    format_agents_table, format_bases_table, format_calls_table, format_connections_table,
    format_json, format_metrics, format_results_table, format_run_line, format_runs_table,
    format_session, format_tasks_table, format_tools_table, format_workflows_table, OutputFormat,
};
pub use polling::Poller;
