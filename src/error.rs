//! Error types for Birdcall operations.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::transport::TransportError;

/// Main error type for Birdcall operations.
#[derive(Error, Debug)]
pub enum BirdcallError {
    /// Malformed caller input, raised before any network activity
    #[error("The argument {arg} {message}")]
    Argument { arg: String, message: String },

    /// A required argument was missing, raised before any network activity
    #[error("The argument {arg} is required {context}")]
    ArgumentRequired { arg: String, context: String },

    /// A request was enqueued without anywhere to deliver its result
    #[error("No completion handler provided")]
    NoCallback,

    /// Non-429 HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// The API answered but reported application-level errors
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The transport never produced a response
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Credential negotiation or request signing failed
    #[error("Credential error: {0}")]
    Credential(String),

    /// A bounded retry policy gave up on a rate-limited request
    #[error("Gave up after {attempts} rate-limited attempts on {url}")]
    RetriesExhausted { url: String, attempts: u32 },

    /// The scheduler dropped the request before it resolved
    #[error("Request cancelled before completion")]
    Cancelled,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BirdcallError {
    pub(crate) fn argument(arg: &str, message: &str) -> Self {
        Self::Argument {
            arg: arg.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn argument_required(arg: &str, context: &str) -> Self {
        Self::ArgumentRequired {
            arg: arg.to_string(),
            context: context.to_string(),
        }
    }
}

/// An HTTP response with a failing status code other than 429.
#[derive(Error, Debug, Clone)]
#[error("{status}: {}", reason(.status))]
pub struct HttpError {
    /// Status code reported by the server
    pub status: u16,
    /// Raw response body
    pub body: String,
}

fn reason(status: &u16) -> &'static str {
    StatusCode::from_u16(*status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
}

/// One `{code, message}` pair from an API error list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Application-level failure reported in an otherwise successful response.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The body carried a non-empty `errors` list
    #[error("{}", join_messages(.0))]
    Api(Vec<ApiErrorDetail>),

    /// The body could not be parsed as JSON
    #[error("malformed response body: {0}")]
    MalformedBody(#[from] serde_json::Error),
}

impl RemoteError {
    /// Error codes reported by the API, in the order they were listed.
    pub fn codes(&self) -> Vec<i64> {
        match self {
            RemoteError::Api(errors) => errors.iter().map(|e| e.code).collect(),
            RemoteError::MalformedBody(_) => Vec::new(),
        }
    }

    /// The individual errors, empty for a malformed body.
    pub fn errors(&self) -> &[ApiErrorDetail] {
        match self {
            RemoteError::Api(errors) => errors,
            RemoteError::MalformedBody(_) => &[],
        }
    }
}

fn join_messages(errors: &[ApiErrorDetail]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for Birdcall operations.
pub type Result<T> = std::result::Result<T, BirdcallError>;
