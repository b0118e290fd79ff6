use std::fmt;

#[derive(Debug)]
pub enum PipelineError {
    /// Garmin Connect could not be reached or answered with an error.
    Source(String),
    /// S3 read or write failed.
    Store(String),
    /// MySQL connection, schema change or insert failed.
    Sink(String),
    /// A secret could not be fetched or did not have the expected shape.
    Secret(String),
    Serialization(serde_json::Error),
    Configuration(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Source(msg) => write!(f, "Source API error: {msg}"),
            PipelineError::Store(msg) => write!(f, "Blob store error: {msg}"),
            PipelineError::Sink(msg) => write!(f, "Relational sink error: {msg}"),
            PipelineError::Secret(msg) => write!(f, "Secret error: {msg}"),
            PipelineError::Serialization(err) => write!(f, "Serialization error: {err}"),
            PipelineError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err)
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Sink(err.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
