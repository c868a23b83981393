use thiserror::Error;

use crate::llm::CompletionError;

#[derive(Error, Debug)]
pub enum BurnrateError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tabular input without a usable date/description/amount layout.
    #[error("{0}")]
    Schema(String),

    #[error("{0}")]
    EmptyInput(String),

    /// PDF could not be turned into text, or the text held no transactions.
    #[error("{0}")]
    Extraction(String),

    #[error("{0}")]
    Completion(#[from] CompletionError),

    #[error("{0}")]
    Storage(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

/// Coarse grouping used to pick an HTTP status and decide what the user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    Internal,
}

impl BurnrateError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Schema(_)
            | Self::EmptyInput(_)
            | Self::Extraction(_)
            | Self::Completion(_)
            | Self::InvalidInput(_) => ErrorClass::BadRequest,
            Self::Unauthorized => ErrorClass::Unauthorized,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Duplicate(_) => ErrorClass::Conflict,
            Self::Db(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Storage(_)
            | Self::Settings(_)
            | Self::Other(_) => ErrorClass::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, BurnrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failures_are_client_errors() {
        assert_eq!(BurnrateError::Schema("x".into()).class(), ErrorClass::BadRequest);
        assert_eq!(BurnrateError::EmptyInput("x".into()).class(), ErrorClass::BadRequest);
        assert_eq!(
            BurnrateError::Completion(CompletionError::MissingApiKey("k".into())).class(),
            ErrorClass::BadRequest
        );
    }

    #[test]
    fn test_storage_failures_are_internal() {
        assert_eq!(BurnrateError::Storage("disk".into()).class(), ErrorClass::Internal);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(BurnrateError::from(io).class(), ErrorClass::Internal);
    }

    #[test]
    fn test_schema_message_is_passed_through() {
        let e = BurnrateError::Schema("No date column found".into());
        assert_eq!(e.to_string(), "No date column found");
    }
}
