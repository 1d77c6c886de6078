//! Centralized error handling for the favicon cache
//!
//! # Error Categories
//!
//! - **Application Errors**: configuration, startup I/O, HTTP client construction
//! - **Extraction Errors**: favicon link not found or malformed in page markup
//! - **Fetch Errors**: transport, status, timeout, markup and filesystem failures
//!   of a single background fetch
//!
//! # Usage
//!
//! ```rust
//! use favicon_cache::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Err(AppError::configuration("workers must be at least 1"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for fetch episode Results
pub type FetchResult<T> = Result<T, FetchError>;

/// Convenience type alias for extractor Results
pub type ExtractResult<T> = Result<T, ExtractError>;
