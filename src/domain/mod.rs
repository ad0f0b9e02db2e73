//! Domain layer - core types shared by every other layer.
//!
//! This layer contains pure data types and error types
//! without any I/O.

pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod events;
pub mod models;
pub mod session;

pub use config::AppConfig;
pub use connection::{Backend, ConnectionChange, ConnectionState};
pub use envelope::{ApiFailure, Envelope};
pub use error::{AppError, Result};
pub use events::{ChatEvent, ExecutionEvent, RecorderEvent};
pub use models::*;
pub use session::{PersistedSession, Session, SessionStatus, TokenCell};
