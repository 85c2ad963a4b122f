//! Shared application state
//!
//! Holds the handles every request handler needs: the embedded database,
//! the fetch pipeline (with its API key pool) and the loaded configuration.

use std::sync::Arc;

use redb::Database;

use crate::config::Config;
use crate::fetcher::Fetcher;

/// Application state shared across all request handlers
///
/// Built once in `main` (or a test) and injected into the router; cloning is
/// cheap since every field is reference-counted.
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe reference to the embedded database
    pub db: Arc<Database>,

    /// Search-and-store pipeline with the shared key pool
    pub fetcher: Fetcher,

    pub config: Arc<Config>,
}
