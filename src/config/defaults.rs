//! Default values for every configuration option

// Cache defaults
pub const DEFAULT_CACHE_DIRECTORY: &str = "./data/favicons";

// Fetcher defaults
pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_MAX_CONNECTIONS: usize = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
