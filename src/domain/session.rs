//! Authentication session and the shared bearer-token cell.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::UserProfile;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Nothing loaded yet.
    #[default]
    Idle,
    /// Restoring tokens from secure storage.
    Hydrating,
    /// A login request is in flight.
    Authenticating,
    /// A token and profile are held.
    Authenticated,
    /// No usable credentials.
    Anonymous,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Hydrating => "hydrating",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Anonymous => "anonymous",
        };
        f.write_str(s)
    }
}

/// In-memory authentication state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub profile: Option<UserProfile>,
    pub status: SessionStatus,
    /// Message of the last failed login, cleared on the next attempt.
    pub error: Option<String>,
}

impl Session {
    /// Whether a token is held.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self.status, SessionStatus::Authenticated) && self.token.is_some()
    }

    /// Drop credentials and fall back to anonymous.
    #[must_use]
    pub fn signed_out(self) -> Self {
        Self {
            status: SessionStatus::Anonymous,
            ..Self::default()
        }
    }
}

/// Non-secret part of the session written to local storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub profile: Option<UserProfile>,
    pub status: SessionStatus,
    pub saved_at: DateTime<Utc>,
}

impl PersistedSession {
    /// Snapshot a session.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            profile: session.profile.clone(),
            status: session.status,
            saved_at: Utc::now(),
        }
    }
}

/// Bearer token shared between the auth store (writer) and the request client (reader).
#[derive(Debug, Clone, Default)]
pub struct TokenCell(Arc<RwLock<Option<String>>>);

impl TokenCell {
    /// Current token, if any.
    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the token.
    pub fn set(&self, token: Option<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cell_is_shared() {
        let cell = TokenCell::default();
        let reader = cell.clone();
        cell.set(Some("abc".into()));
        assert_eq!(reader.get().as_deref(), Some("abc"));
        cell.set(None);
        assert!(reader.get().is_none());
    }

    #[test]
    fn test_signed_out_clears_everything() {
        let session = Session {
            token: Some("t".into()),
            refresh_token: Some("r".into()),
            profile: None,
            status: SessionStatus::Authenticated,
            error: None,
        };
        assert!(session.is_authenticated());
        let out = session.signed_out();
        assert_eq!(out.status, SessionStatus::Anonymous);
        assert!(out.token.is_none() && out.refresh_token.is_none());
    }
}
