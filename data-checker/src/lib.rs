pub mod app_context;
pub mod checker;
pub mod config;
pub mod consumer;
pub mod dedup;
pub mod error;
pub mod mas;
pub mod media;
pub mod metrics_consts;
pub mod publisher;
pub mod relationships;
pub mod server;
pub mod specimens;
pub mod store;
pub mod types;

// Shared with the integration tests under tests/, so it is not cfg(test)
pub mod test_utils;
