//! Typed errors and their classification.

use reqwest::{Method, StatusCode};
use thiserror::Error;

use crate::rest::link::LinkError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unknown mode {0:?}")]
    UnknownMode(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Which mutation the reconciler was issuing when a backend call failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    fn describe(self) -> &'static str {
        match self {
            Operation::Insert => "insert new domain block",
            Operation::Update => "update existing domain block",
            Operation::Delete => "delete existing domain block",
        }
    }
}

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("database: {statement}: {source}")]
    Sql {
        statement: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("invalid row: {0}")]
    InvalidRow(String),
    #[error("HTTP request failed: {method} {url}: {source}")]
    Http {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server returned unexpected HTTP status: {method} {url}: {status}")]
    UnexpectedStatus {
        method: Method,
        url: String,
        status: StatusCode,
    },
    #[error("failed to parse HTTP response body as JSON: {method} {url} ({status}): {source}")]
    Decode {
        method: Method,
        url: String,
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed Link header from {url}: {source}")]
    LinkHeader {
        url: String,
        #[source]
        source: LinkError,
    },
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("pagination revisited {0}")]
    PaginationCycle(String),
    #[error("pagination link {url} leaves {origin}; not sending credentials there")]
    CrossOriginLink { url: String, origin: String },
    #[error("failed to query the existing domain blocks: {source}")]
    Query {
        #[source]
        source: Box<ApplyError>,
    },
    #[error("failed to {}: {domain:?}: {source}", .op.describe())]
    Operation {
        op: Operation,
        domain: String,
        #[source]
        source: Box<ApplyError>,
    },
}

/// Coarse error taxonomy: what went wrong, independent of backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Could not reach or talk to the database or HTTP server at all.
    Connectivity,
    /// The backend answered, but not the way the protocol says it should.
    Protocol,
    Config,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Connectivity => "connectivity_error",
            ErrorKind::Protocol => "protocol_error",
            ErrorKind::Config => "config_error",
        }
    }
}

impl ApplyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApplyError::Config(_) => ErrorKind::Config,
            ApplyError::Db(e) | ApplyError::Sql { source: e, .. } => match e {
                sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
                    ErrorKind::Connectivity
                }
                _ => ErrorKind::Protocol,
            },
            ApplyError::Http { source, .. } if source.is_connect() || source.is_timeout() => {
                ErrorKind::Connectivity
            }
            ApplyError::Query { source } | ApplyError::Operation { source, .. } => source.kind(),
            _ => ErrorKind::Protocol,
        }
    }
}
