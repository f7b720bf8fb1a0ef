use crate::model::Command;
use std::path::PathBuf;

/// Failures reported by the command gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The engine answered and refused the request.
    #[error("engine rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
    /// No usable answer (transport failure, timeout, undecodable body).
    #[error("engine unreachable for {operation}: {reason}")]
    Unreachable {
        operation: &'static str,
        reason: String,
    },
}

impl GatewayError {
    pub fn rejected(operation: &'static str, reason: impl Into<String>) -> Self {
        GatewayError::Rejected {
            operation,
            reason: reason.into(),
        }
    }

    pub fn unreachable(operation: &'static str, reason: impl Into<String>) -> Self {
        GatewayError::Unreachable {
            operation,
            reason: reason.into(),
        }
    }
}

/// Why a toggle request was refused at the UI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ToggleError {
    #[error("a {0} command is still in flight")]
    Busy(Command),
    #[error("engine state is still being checked")]
    Reconciling,
}

#[derive(Debug, thiserror::Error)]
pub enum HintError {
    #[error("no suitable data directory available for the session hint")]
    NoDataDir,
    #[error("failed to access session hint at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode session hint at {path}: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode session hint for {path}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
}
