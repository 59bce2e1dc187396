//! Error types for time padding operations.

use thiserror::Error;

/// Result type for padding operations.
pub type Result<T> = std::result::Result<T, PadError>;

/// Error types for padding and signature operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PadError {
    #[error("Invalid option '{option}' = '{value}': {reason}")]
    InvalidOption {
        option: String,
        value: String,
        reason: String,
    },

    #[error("Cannot infer time column: {}", describe_candidates(.candidates))]
    AmbiguousColumn { candidates: Vec<String> },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Cannot infer granularity: need at least 2 distinct timestamps, got {distinct}")]
    Inference { distinct: usize },

    #[error("Invalid range: start {start} is after end {end}")]
    Range { start: String, end: String },

    #[error("Sequence of {steps} steps exceeds the limit of {limit}")]
    SizeLimit { steps: u64, limit: usize },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Type mismatch for '{column}': expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Duplicate timestamp {timestamp} within a group")]
    DuplicateTimestamp { timestamp: String },

    #[error("Timestamp {timestamp} does not align with granularity '{granularity}'")]
    MisalignedTimestamp {
        timestamp: String,
        granularity: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn describe_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        "no date or date-time column found".to_string()
    } else {
        format!("multiple candidates ({})", candidates.join(", "))
    }
}

impl PadError {
    /// Stable numeric code for each error kind.
    pub fn to_code(&self) -> i32 {
        match self {
            PadError::InvalidOption { .. } => 1,
            PadError::AmbiguousColumn { .. } => 2,
            PadError::Parse(_) => 3,
            PadError::Inference { .. } => 4,
            PadError::Range { .. } => 5,
            PadError::SizeLimit { .. } => 6,
            PadError::ColumnNotFound(_) => 7,
            PadError::TypeMismatch { .. } => 8,
            PadError::DuplicateTimestamp { .. } => 9,
            PadError::MisalignedTimestamp { .. } => 10,
            PadError::InvalidInput(_) => 11,
            PadError::Config(_) => 12,
        }
    }
}

impl From<toml::de::Error> for PadError {
    fn from(err: toml::de::Error) -> Self {
        PadError::Config(err.to_string())
    }
}
