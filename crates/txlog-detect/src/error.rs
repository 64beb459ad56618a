use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Invalid keyword pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Invalid model parameter: {0}")]
    InvalidModelParameter(String),

    #[error("Empty vocabulary: no message contains a usable term")]
    EmptyVocabulary,

    #[error("Detection result belongs to batch {result}, not to batch {batch}")]
    BatchMismatch { batch: Uuid, result: Uuid },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed report line {line}: {reason}")]
    MalformedReport { line: usize, reason: String },
}
