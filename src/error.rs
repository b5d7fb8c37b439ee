//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures surfaced by store queries.
///
/// Discovery problems never show up here; they are logged and recorded in
/// the discovery report instead.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error ({project}/{table}): {source}")]
    Storage {
        project: String,
        table: String,
        #[source]
        source: rusqlite::Error,
    },
}
