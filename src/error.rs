//! Error taxonomy shared by the collaborators and the trade cycle

use thiserror::Error;

/// Errors surfaced by the broker, the signal provider and the executor
#[derive(Debug, Error)]
pub enum TradeError {
    /// Collaborator unreachable or returned a non-success status
    #[error("transport error{}: {message}", fmt_status(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// Malformed response or not enough market history
    #[error("data error: {0}")]
    Data(String),

    /// Partial failure of a multi-step mutation (e.g. flip close step)
    #[error("state error: {0}")]
    State(String),

    /// Model missing or unusable
    #[error("prediction error: {0}")]
    Prediction(String),

    /// Local sink (CSV / heartbeat file) unavailable
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl TradeError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        TradeError::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, TradeError::Transport { .. })
    }
}

impl From<reqwest::Error> for TradeError {
    fn from(err: reqwest::Error) -> Self {
        TradeError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

pub type TradeResult<T> = std::result::Result<T, TradeError>;
