//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Transport-level HTTP failure (connect, timeout, undecodable body).
    Http(String),
    /// The attendance API answered with a non-success status.
    Api {
        /// HTTP status code returned by the server.
        status: u16,
        /// Server-provided `error` field, or the raw body when absent.
        message: String,
    },
    /// Input rejected before it reached the server.
    Validation(String),
    /// Position could not be acquired.
    Geolocation(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Http(msg) => write!(f, "http: {msg}"),
            Self::Api { status, message } => write!(f, "api ({status}): {message}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Geolocation(msg) => write!(f, "geolocation: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
