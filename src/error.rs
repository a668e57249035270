use thiserror::Error;

pub type CheckResult<T> = Result<T, FraudCheckError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FraudCheckError {
    /// Endpoint unreachable, timed out, or answered with a non-success status.
    #[error("scoring service unavailable{}: {message}", status_suffix(.status))]
    Network { status: Option<u16>, message: String },

    /// The service rejected the payload shape. Body is kept verbatim.
    #[error("scoring service rejected the request (HTTP {status}): {body}")]
    Validation { status: u16, body: String },

    #[error("cannot submit feedback: {0}")]
    Precondition(&'static str),

    #[error("invalid {field}: {reason}")]
    LocalValidation { field: String, reason: String },

    #[error("unexpected response from scoring service: {0}")]
    InvalidResponse(String),
}

impl FraudCheckError {
    pub fn local(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LocalValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Short stable label, used in logs and batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Validation { .. } => "validation",
            Self::Precondition(_) => "precondition",
            Self::LocalValidation { .. } => "local-validation",
            Self::InvalidResponse(_) => "invalid-response",
        }
    }
}

impl From<reqwest::Error> for FraudCheckError {
    fn from(err: reqwest::Error) -> Self {
        FraudCheckError::Network {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}
