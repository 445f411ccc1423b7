//! Error types for the Shabad engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShabadError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl ShabadError {
    pub(crate) fn database(e: rusqlite::Error) -> Self {
        ShabadError::Database(e.to_string())
    }
}

impl From<std::io::Error> for ShabadError {
    fn from(e: std::io::Error) -> Self {
        ShabadError::Io(e.to_string())
    }
}

impl serde::Serialize for ShabadError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Log a failed store operation under a stable code and keep going.
///
/// Callers fall back to an empty or partial result; a live display must not
/// stop because one query failed.
pub fn log_failure(code: &'static str, err: &ShabadError) {
    tracing::error!(code, error = %err, "store operation failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_message() {
        let err = ShabadError::InvalidQuery("bani name `a b`".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Invalid query: bani name `a b`\"");
    }
}
