//! Error types shared across the order-entry core.
//!
//! None of these are fatal: parse errors are recovered where they occur,
//! validation failures only block an export, and lookup or configuration
//! problems disable address search without touching the order.

use thiserror::Error;

use crate::validation::Violation;

/// A malformed date or number. Callers recover with an explicit fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("invalid date: {value:?}")]
    InvalidDate { value: String },

    #[error("invalid number: {value:?}")]
    InvalidNumber { value: String },
}

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML write error: {0}")]
    Write(#[from] std::io::Error),

    #[error("XML output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// The collected violations that stopped an export.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("order has {} validation issue(s)", .violations.len())]
pub struct ValidationFailure {
    pub violations: Vec<Violation>,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Invalid(#[from] ValidationFailure),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("{0}")]
    MissingCredential(&'static str),

    #[error("address service timed out")]
    Timeout,

    #[error("address service request failed: {0}")]
    Http(reqwest::Error),

    #[error("address service returned {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Service {
        status: String,
        message: Option<String>,
    },

    #[error("malformed address service response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("address lookup worker stopped before answering")]
    Interrupted,
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LookupError::Timeout
        } else {
            LookupError::Http(e)
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}
