//! Error types.
//!
//! One enum per collaborator, wrapped by the crate-level [`Error`].
//! Configuration, roster fetch and credential errors are fatal to a run.
//! A malformed roster row, a gateway error or a notifier error only
//! degrades a single entry or is logged.

use std::fmt;
use thiserror::Error;

/// A configuration value that is present but could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidValue {
    pub key: String,
    pub reason: String,
}

impl fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.key, self.reason)
    }
}

fn describe_problems(missing: &[String], invalid: &[InvalidValue]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing required configuration: {}", missing.join(", ")));
    }
    if !invalid.is_empty() {
        let values: Vec<String> = invalid.iter().map(|v| v.to_string()).collect();
        parts.push(format!("invalid configuration values: {}", values.join(", ")));
    }
    parts.join("; ")
}

/// Startup configuration problems.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Every absent and every undecodable key, in declaration order.
    #[error("{}", describe_problems(.missing, .invalid))]
    Incomplete {
        missing: Vec<String>,
        invalid: Vec<InvalidValue>,
    },

    /// A present value that could not be decoded.
    #[error("invalid configuration value {key}: {reason}")]
    Invalid { key: String, reason: String },

    /// The configuration store could not be read or written.
    #[error("configuration store error: {0}")]
    Store(#[from] std::io::Error),
}

/// Failures talking to the payment network.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment API request failed: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("unexpected payment API response: {0}")]
    Decode(String),
}

/// Failures loading the roster.
#[derive(Error, Debug)]
pub enum RosterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("spreadsheet API request failed: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("unexpected spreadsheet response: {0}")]
    Decode(String),

    #[error("spreadsheet authorization failed: {0}")]
    Auth(#[from] CredentialError),
}

/// Failures delivering a summary.
#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification API request failed: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("notification authorization failed: {0}")]
    Auth(#[from] CredentialError),

    #[error("{failed} of {total} notification channels failed")]
    Partial { failed: usize, total: usize },
}

/// Failures obtaining or refreshing OAuth credentials.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint rejected the request: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("unexpected token response: {0}")]
    Decode(String),

    #[error("could not sign service account assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("token has no refresh token and cannot be refreshed")]
    NotRefreshable,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-level error.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Notifier(#[from] NotifierError),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit code for a fatal error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 1,
            Error::Roster(_) => 2,
            Error::Gateway(_) => 3,
            Error::Notifier(_) => 4,
            Error::Credential(_) => 5,
        }
    }
}
