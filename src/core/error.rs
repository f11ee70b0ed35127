use std::io;
use thiserror::Error;

pub type PceResult<T> = Result<T, PceError>;

/// Exit code used when a run would exceed `--max-create` / `--max-update`.
pub const SAFETY_LIMIT_EXIT_CODE: i32 = 3;

#[derive(Error, Debug)]
pub enum PceError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("PCE API error (status {status}) on {path}: {message}")]
    ApiError {
        status: u16,
        path: String,
        message: String,
    },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("CSV line {line}: {message}")]
    ValidationError { line: usize, message: String },
    #[error("CSV line {line}: {message}")]
    ReferenceError { line: usize, message: String },
    #[error("Missing required CSV header(s): {0}")]
    MissingHeaders(String),
    #[error("Safety limit exceeded: {0}")]
    SafetyLimit(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl PceError {
    pub fn validation(line: usize, message: impl Into<String>) -> Self {
        PceError::ValidationError {
            line,
            message: message.into(),
        }
    }

    pub fn reference(line: usize, message: impl Into<String>) -> Self {
        PceError::ReferenceError {
            line,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            PceError::SafetyLimit(_) => SAFETY_LIMIT_EXIT_CODE,
            _ => 1,
        }
    }
}

impl From<dialoguer::Error> for PceError {
    fn from(e: dialoguer::Error) -> Self {
        PceError::IoError(io::Error::other(format!("prompt failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_limit_has_distinct_exit_code() {
        assert_eq!(PceError::SafetyLimit("x".into()).exit_code(), 3);
        assert_eq!(PceError::validation(4, "bad").exit_code(), 1);
        assert_eq!(
            PceError::reference(7, "label missing").to_string(),
            "CSV line 7: label missing"
        );
    }
}
