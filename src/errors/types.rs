//! Error type definitions for the favicon cache
//!
//! The fetch path never surfaces these to the lookup caller: every
//! `FetchError` ends as a `Failed` state plus a log line. They exist so the
//! orchestrator can classify and log failures distinctly.

use thiserror::Error;

/// Top-level application error type
///
/// Covers startup concerns (configuration, HTTP client construction, I/O)
/// that are allowed to reach the binary entry point.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized when writing defaults
    #[error("Configuration serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Filesystem errors outside the fetch path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Reasons the favicon link extractor gives up on a document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// No favicon link declared in the document head
    #[error("no favicon link found ({})", not_found_reason(.head_closed))]
    NotFound { head_closed: bool },

    /// A favicon link tag was found but it carries no usable `href`
    #[error("favicon link on line {line} has no usable href attribute")]
    MalformedLink { line: usize },
}

/// Terminal failure of a single fetch episode
#[derive(Error, Debug)]
pub enum FetchError {
    /// The page or favicon URL could not be parsed or joined
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Connection-level failures
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// The request exceeded the configured timeout
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    /// Non-2xx response
    #[error("HTTP error: {status} - {url}")]
    Status { url: String, status: u16 },

    /// The page did not declare a usable favicon
    #[error("Markup error: {0}")]
    Markup(#[from] ExtractError),

    /// Cache directory creation or write failures
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

fn not_found_reason(head_closed: &bool) -> &'static str {
    if *head_closed {
        "saw end of head"
    } else {
        "searched the whole document"
    }
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl FetchError {
    /// Short label used as the `error.kind` field in logs
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl { .. } => "invalid_url",
            FetchError::Transport { .. } => "transport",
            FetchError::Timeout { .. } => "timeout",
            FetchError::Status { .. } => "status",
            FetchError::Markup(_) => "markup",
            FetchError::Storage(_) => "filesystem",
        }
    }

    /// Create a transport error
    pub fn transport<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }
}
