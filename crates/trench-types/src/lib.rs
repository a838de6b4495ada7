//! Shared types and errors for the Torrent Trench engine.
//!
//! This crate provides the foundational types used across the other trench crates:
//! - `TrenchError`: unified error taxonomy
//! - `ConfigIssue`: a path-addressed configuration problem
//! - `Torrent`: read-only snapshot of one torrent as reported by a client

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unified error type for all trench subsystems.
#[derive(Debug, thiserror::Error)]
pub enum TrenchError {
    // === Config Errors ===
    #[error("Config validation failed with {} issue(s):\n{}", .0.len(), format_issues(.0))]
    Validation(Vec<ConfigIssue>),

    // === Client Errors ===
    #[error("Client {client} request failed: {message}")]
    Client { client: String, message: String },

    #[error("Authentication failed for client {client}")]
    Auth { client: String },

    #[error("Action '{action}' failed for torrent {torrent_id} on {client}: {message}")]
    Action {
        client: String,
        action: String,
        torrent_id: String,
        message: String,
    },

    // === Engine Errors ===
    #[error("Trench invariant violated: {0}")]
    Invariant(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrenchError {
    /// Returns `true` for errors raised while talking to a torrent client.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TrenchError::Client { .. } | TrenchError::Auth { .. } | TrenchError::Action { .. }
        )
    }

    /// The client identity carried by the error, if any.
    pub fn client(&self) -> Option<&str> {
        match self {
            TrenchError::Client { client, .. }
            | TrenchError::Auth { client }
            | TrenchError::Action { client, .. } => Some(client),
            _ => None,
        }
    }

    /// Issues carried by a validation failure, empty for every other variant.
    pub fn issues(&self) -> &[ConfigIssue] {
        match self {
            TrenchError::Validation(issues) => issues,
            _ => &[],
        }
    }
}

/// A convenience alias for `Result<T, TrenchError>`.
pub type Result<T> = std::result::Result<T, TrenchError>;

fn format_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  {issue}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// ConfigIssue: a path-addressed problem in the config document
// ---------------------------------------------------------------------------

/// One segment of a JSON path: an array index or an object key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(index) => write!(f, "{index}"),
            PathSegment::Key(key) => f.write_str(key),
        }
    }
}

/// A single validation problem with the path of the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigIssue {
    pub path: Vec<PathSegment>,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(path: Vec<PathSegment>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }

    /// The path joined with `.`, e.g. `trenches.0.trench.0.fork`.
    pub fn dotted_path(&self) -> String {
        self.path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.dotted_path(), self.message)
        }
    }
}

/// Build a `Vec<PathSegment>` from a mix of indices and keys.
///
/// ```
/// use trench_types::{issue_path, PathSegment};
/// let path = issue_path![0, "trench", 2, "fork"];
/// assert_eq!(path[1], PathSegment::Key("trench".into()));
/// ```
#[macro_export]
macro_rules! issue_path {
    ($($segment:expr),* $(,)?) => {
        vec![$($crate::PathSegment::from($segment)),*]
    };
}

// ---------------------------------------------------------------------------
// Torrent: read-only snapshot from a client
// ---------------------------------------------------------------------------

/// One torrent as reported by a client on a single fetch.
///
/// `raw` carries the client-specific payload. Fields such as the tracker or
/// seeding time are read from it and may be missing for some clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Torrent {
    pub id: String,
    pub name: String,
    pub label: Option<String>,
    pub save_path: Option<String>,
    /// Fraction complete in `0.0..=1.0`.
    pub progress: f64,
    pub ratio: f64,
    pub is_completed: bool,
    pub raw: serde_json::Map<String, serde_json::Value>,
}

impl Torrent {
    /// Read a string field from the raw client payload.
    pub fn raw_str(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(serde_json::Value::as_str)
    }

    /// Read a numeric field from the raw client payload.
    pub fn raw_f64(&self, key: &str) -> Option<f64> {
        self.raw.get(key).and_then(serde_json::Value::as_f64)
    }
}
