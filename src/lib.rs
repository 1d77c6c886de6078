pub mod config;
pub mod errors;
pub mod favicon;
pub mod links;
pub mod utils;
