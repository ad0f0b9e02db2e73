//! The uniform result shape of every backend call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `{ success, data, error, error_code }` wrapper returned by every backend call.
///
/// Constructors keep the invariant that a successful envelope for a payload
/// endpoint carries `data` and a failed one carries `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Whether the call succeeded.
    pub success: bool,
    /// Payload, present on success for endpoints that return one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Human-readable failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable failure code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T> Envelope<T> {
    /// Successful envelope carrying `data`.
    #[must_use]
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }

    /// Failed envelope with a message.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            error_code: None,
        }
    }

    /// Failed envelope with a message and a machine-readable code.
    #[must_use]
    pub fn fail_with_code(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error_code: Some(code.into()),
            ..Self::fail(error)
        }
    }

    /// Whether the call succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Transform the payload, keeping success/error fields.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            error_code: self.error_code,
        }
    }

    /// Convert into a `Result`, requiring a payload on success.
    ///
    /// # Errors
    /// Returns the failure carried by the envelope, or an "empty response"
    /// failure when a successful envelope has no `data`.
    pub fn into_result(self) -> Result<T, ApiFailure> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(ApiFailure::new("empty response")),
            (false, _) => Err(ApiFailure::from_parts(self.error, self.error_code)),
        }
    }

    /// Convert into a `Result` whose payload may be absent.
    ///
    /// # Errors
    /// Returns the failure carried by the envelope.
    pub fn into_optional(self) -> Result<Option<T>, ApiFailure> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ApiFailure::from_parts(self.error, self.error_code))
        }
    }

    /// Convert into a `Result`, ignoring any payload.
    ///
    /// # Errors
    /// Returns the failure carried by the envelope.
    pub fn into_ack(self) -> Result<(), ApiFailure> {
        if self.success {
            Ok(())
        } else {
            Err(ApiFailure::from_parts(self.error, self.error_code))
        }
    }
}

/// A failed backend call, as returned by store actions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiFailure {
    /// Human-readable message, never empty.
    pub message: String,
    /// Machine-readable code, if the backend or transport supplied one.
    pub code: Option<String>,
}

impl ApiFailure {
    /// Failure with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    fn from_parts(error: Option<String>, code: Option<String>) -> Self {
        let message = error
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "Unknown error".to_string());
        Self { message, code }
    }

    /// Whether the failure came from the transport (timeout, unreachable).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self.code.as_deref(), Some("timeout" | "network"))
    }
}
