use thiserror::Error;

pub type Result<T> = std::result::Result<T, LogError>;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("No files found for pattern {0}")]
    NoFilesFound(String),

    #[error("Unsupported file pattern {pattern}: {message}")]
    UnsupportedPattern { pattern: String, message: String },

    #[error("Could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record: {field} needs {needed} fields but the record has {found}")]
    MalformedRecord {
        field: &'static str,
        needed: usize,
        found: usize,
    },

    #[error("Invalid {field} value '{text}'")]
    InvalidField { field: &'static str, text: String },

    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("Data line {line}: {source}")]
    DataLine {
        line: usize,
        #[source]
        source: Box<LogError>,
    },

    #[error("Server index {index} out of range for {servers} servers")]
    OutOfRangeServerIndex { index: i64, servers: usize },

    #[error("Key {0} not found in requests")]
    KeyNotFound(String),

    #[error("Servers line could not be found in data")]
    MissingServerMetadata,

    #[error("Invalid bucket width {0}")]
    InvalidBucketWidth(f64),
}
