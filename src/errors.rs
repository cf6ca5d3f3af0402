use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
    #[error("CONTEXT_MISSING: {0}")]
    ContextMissing(String),
    #[error("SERVICE_UNAVAILABLE: {0}")]
    ServiceUnavailable(String),
    #[error("DATA_ACCESS: {0}")]
    DataAccess(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code, used on the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ContextMissing(_) => "CONTEXT_MISSING",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::DataAccess(_) => "DATA_ACCESS",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::InvalidInput(detail)
            | Self::ContextMissing(detail)
            | Self::ServiceUnavailable(detail)
            | Self::DataAccess(detail)
            | Self::NotFound(detail)
            | Self::Internal(detail) => detail,
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::DataAccess(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidInput(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::InvalidInput(value.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
