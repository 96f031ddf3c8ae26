use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{operation} failed (HTTP {status}): {body}")]
    Remote {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("request error during {operation}: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cancelled by user")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Fatal errors abort the whole run; everything else is recorded against
    /// a single worklist item and processing continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_) | AppError::Auth(_))
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Pulls the `message` field out of a LaunchDarkly JSON error body, falling
    /// back to the raw body text.
    pub fn remote_message(&self) -> Option<String> {
        match self {
            AppError::Remote { body, .. } => {
                let msg = serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from));
                Some(msg.unwrap_or_else(|| body.clone()))
            }
            _ => None,
        }
    }

    /// Short description for report rows: remote failures show the operation,
    /// status and the service's message instead of the raw body.
    pub fn detail(&self) -> String {
        match (self, self.remote_message()) {
            (AppError::Remote { operation, status, .. }, Some(msg)) => {
                format!("{} returned HTTP {}: {}", operation, status, msg)
            }
            _ => self.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(e: serde_yaml::Error) -> Self {
        AppError::Config(e.to_string())
    }
}
