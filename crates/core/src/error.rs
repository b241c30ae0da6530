//! Error taxonomy for the pipeline
//!
//! Collector failures are aggregated as [`PartialError`]s and never cross
//! the orchestrator; only input errors, the subject going missing, a dead
//! cluster connection, and cancellation abort a run.

use std::time::Duration;

use thiserror::Error;

/// Structured errors from the cluster boundary.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("timed out after {0:.1?}")]
    Timeout(Duration),
    #[error("cluster unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Other(String),
}

/// Fatal pipeline errors. Everything here exits with code 2.
#[derive(Debug, Error)]
pub enum SmartError {
    #[error("invalid input: {0}")]
    Input(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("cluster unavailable: {0}")]
    Unavailable(String),
    #[error("cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

impl SmartError {
    /// A one-line remediation hint for the CLI, when one exists.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Unavailable(_) => {
                Some("check the cluster connection: kubectl cluster-info")
            }
            Self::NotFound(_) => Some("verify the name and namespace: kubectl get <kind> -n <ns>"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SmartError>;

/// Non-fatal failure of one collection source, surfaced into `notes[]`.
#[derive(Debug, Clone)]
pub struct PartialError {
    pub source: String,
    pub kind: PartialErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialErrorKind {
    Forbidden,
    Timeout,
    Unavailable,
    Parse,
    Other,
}

impl PartialError {
    pub fn from_client(source: impl Into<String>, err: &ClientError) -> Self {
        let (kind, message) = match err {
            ClientError::Forbidden(m) => (PartialErrorKind::Forbidden, m.clone()),
            ClientError::Timeout(d) => (PartialErrorKind::Timeout, format!("after {d:.1?}")),
            ClientError::Unavailable(m) => (PartialErrorKind::Unavailable, m.clone()),
            ClientError::NotFound(m) | ClientError::Other(m) => {
                (PartialErrorKind::Other, m.clone())
            }
        };
        Self {
            source: source.into(),
            kind,
            message,
        }
    }

    /// Human line for the report's `notes[]` channel.
    pub fn note(&self) -> String {
        match self.kind {
            PartialErrorKind::Forbidden => format!(
                "{}: access denied, source skipped (try: kubectl auth can-i --list)",
                self.source
            ),
            PartialErrorKind::Timeout => {
                format!("{}: timed out {}, partial data used", self.source, self.message)
            }
            PartialErrorKind::Unavailable => {
                format!("{}: unavailable ({})", self.source, self.message)
            }
            PartialErrorKind::Parse => {
                format!("{}: malformed artifact dropped ({})", self.source, self.message)
            }
            PartialErrorKind::Other => format!("{}: {}", self.source, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_error_classifies_client_errors() {
        let err = ClientError::Forbidden("events is forbidden".into());
        let partial = PartialError::from_client("events", &err);
        assert_eq!(partial.kind, PartialErrorKind::Forbidden);
        assert!(partial.note().contains("access denied"));

        let err = ClientError::Timeout(Duration::from_secs(1));
        let partial = PartialError::from_client("logs pod/web", &err);
        assert_eq!(partial.kind, PartialErrorKind::Timeout);
    }
}
