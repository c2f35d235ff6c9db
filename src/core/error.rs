use thiserror::Error;

/// Configuration could not be loaded or failed validation. Always aborts the
/// whole cycle.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("{} is undefined.", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A single search probe failed. Recorded as rank `-1`.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to spawn search command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("search command exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("search timed out after {0} seconds")]
    Timeout(u64),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("malformed search response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be opened or authenticated against.
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("no sheet at index {0}")]
    SheetNotFound(usize),

    #[error("store request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("no date row matching {date} within the first {scanned} rows of sheet {sheet_index}")]
    RowNotFound {
        sheet_index: usize,
        date: String,
        scanned: usize,
    },

    #[error("{len} results exceed the rank column capacity of {capacity}")]
    Capacity { len: usize, capacity: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}
