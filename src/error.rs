//! Error taxonomy for the orchestration engine.
//!
//! Mirrors the manual `Display` + `std::error::Error` style used throughout this
//! codebase's own orchestration types rather than pulling in a derive-macro error
//! crate: every variant is a plain enum member, matched explicitly in `fmt`.

use std::error::Error;
use std::fmt;

/// Failure classification for a single [`crate::model::ModelClient`] call.
///
/// Callers (the [`Worker`](crate::worker::Worker) and
/// [`Supervisor`](crate::supervisor::Supervisor)) treat the two variants
/// differently: `Transient` failures are retried with backoff, `Permanent`
/// failures are not.
#[derive(Debug, Clone)]
pub enum ModelError {
    /// Safe to retry: network failure, HTTP 5xx, or rate-limiting (429).
    Transient(String),
    /// Not safe to retry: bad auth, malformed request, or any other 4xx.
    Permanent(String),
}

impl ModelError {
    /// Human-readable message regardless of variant.
    pub fn message(&self) -> &str {
        match self {
            ModelError::Transient(m) => m,
            ModelError::Permanent(m) => m,
        }
    }

    /// `true` for [`ModelError::Transient`].
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelError::Transient(_))
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Transient(msg) => write!(f, "transient model error: {}", msg),
            ModelError::Permanent(msg) => write!(f, "permanent model error: {}", msg),
        }
    }
}

impl Error for ModelError {}

/// Scope a [`OrchestratorError::Timeout`] fired at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutScope {
    Worker,
    Team,
    Run,
}

impl fmt::Display for TimeoutScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutScope::Worker => write!(f, "worker"),
            TimeoutScope::Team => write!(f, "team"),
            TimeoutScope::Run => write!(f, "run"),
        }
    }
}

/// Top-level error taxonomy for the orchestration engine (§7).
#[derive(Debug, Clone)]
pub enum OrchestratorError {
    /// A `HierarchyConfig` failed validation; the run never starts.
    /// Surfaced as HTTP 400 at the API boundary.
    InvalidConfig { field: String, reason: String },

    /// A model call failed after exhausting retries.
    ModelPermanent(String),

    /// A worker/team/run exceeded its configured deadline.
    Timeout { scope: TimeoutScope },

    /// A supervisor could not resolve a selection even after retries.
    /// Non-fatal: callers convert this into a `supervisor_fallback` event.
    SelectionFailure(String),

    /// An invariant was violated that the scheduler cannot recover from.
    /// Fatal to the run.
    Internal(String),

    /// The run was cancelled cooperatively (explicit cancel or timeout).
    Cancelled,
}

impl From<ModelError> for OrchestratorError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Transient(msg) => OrchestratorError::ModelPermanent(msg),
            ModelError::Permanent(msg) => OrchestratorError::ModelPermanent(msg),
        }
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::InvalidConfig { field, reason } => {
                write!(f, "invalid config field '{}': {}", field, reason)
            }
            OrchestratorError::ModelPermanent(msg) => write!(f, "model error: {}", msg),
            OrchestratorError::Timeout { scope } => write!(f, "{} timed out", scope),
            OrchestratorError::SelectionFailure(msg) => write!(f, "selection failed: {}", msg),
            OrchestratorError::Internal(msg) => write!(f, "internal error: {}", msg),
            OrchestratorError::Cancelled => write!(f, "run cancelled"),
        }
    }
}

impl Error for OrchestratorError {}
