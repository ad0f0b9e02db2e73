//! Jarvis Sync - client-side state synchronization for the Jarvis assistant.
//!
//! Talks to the engine and cloud backends over HTTP, WebSocket and SSE,
//! tracks their reachability and keeps per-domain stores of the records
//! they return.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::AppContext;
pub use domain::{AppConfig, AppError, Result};
