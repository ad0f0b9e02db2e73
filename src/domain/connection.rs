//! Reachability of the monitored backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two backends the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Local automation/execution service.
    Engine,
    /// Remote account/template control plane.
    Cloud,
}

impl Backend {
    /// Every monitored backend, in check order.
    pub const ALL: [Self; 2] = [Self::Engine, Self::Cloud];

    /// Stable identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Engine => "engine",
            Self::Cloud => "cloud",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last observed reachability of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub id: Backend,
    pub reachable: bool,
    /// `None` until the first check completes.
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ConnectionState {
    /// Unchecked state, reported unreachable.
    #[must_use]
    pub const fn unchecked(id: Backend) -> Self {
        Self {
            id,
            reachable: false,
            last_checked_at: None,
        }
    }
}

/// Broadcast when a backend flips between reachable and unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionChange {
    pub id: Backend,
    pub reachable: bool,
}
