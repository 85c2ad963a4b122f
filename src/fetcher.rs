//! Fetching videos from the search API into the database
//!
//! [`Fetcher`] ties the credential pool, the search client and the store
//! together. It backs both the on-demand `/api/fetch` endpoint and the
//! periodic background job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redb::Database;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::database::{upsert_videos, StoreError};
use crate::model::VideoRecord;
use crate::rotator::{CredentialRotator, RotatorError};
use crate::youtube::{SearchError, VideoSearch};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Rotator(#[from] RotatorError),

    #[error("failed to search videos: {0}")]
    Search(#[from] SearchError),

    #[error("failed to store videos: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct Fetcher {
    rotator: Arc<CredentialRotator>,
    search: Arc<dyn VideoSearch>,
    db: Arc<Database>,
}

impl Fetcher {
    pub fn new(
        rotator: Arc<CredentialRotator>,
        search: Arc<dyn VideoSearch>,
        db: Arc<Database>,
    ) -> Self {
        Self { rotator, search, db }
    }

    pub fn rotator(&self) -> &Arc<CredentialRotator> {
        &self.rotator
    }

    /// Searches `query` and upserts the results, returning how many were stored
    pub async fn fetch_and_store(
        &self,
        query: &str,
        published_after: DateTime<Utc>,
        limit: u32,
    ) -> Result<usize, FetchError> {
        let videos = self.search(query, published_after, limit).await?;
        let stored = upsert_videos(&self.db, &videos)?;
        info!(query, stored, "fetched videos");
        Ok(stored)
    }

    /// Runs one search with a rotated key
    ///
    /// If the API rejects the key, it is penalized and the search is retried
    /// once with the next available key.
    pub async fn search(
        &self,
        query: &str,
        published_after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<VideoRecord>, FetchError> {
        let credential = self.rotator.acquire()?;
        match self.search.search(&credential, query, published_after, limit).await {
            Err(err) if err.is_credential_failure() => {
                warn!(credential = %credential, error = %err, "API key rejected, retrying with another key");
                self.rotator.penalize(&credential);

                let retry = self.rotator.acquire()?;
                let videos = self.search.search(&retry, query, published_after, limit).await;
                if let Err(err) = &videos {
                    if err.is_credential_failure() {
                        self.rotator.penalize(&retry);
                    }
                }
                Ok(videos?)
            }
            result => Ok(result?),
        }
    }

    /// Runs one pass over `keywords`
    ///
    /// Individual failures are logged and skipped; an exhausted pool ends the
    /// pass early. Returns the number of videos stored.
    pub async fn run_cycle(
        &self,
        keywords: &[String],
        published_after: DateTime<Utc>,
        limit: u32,
    ) -> usize {
        let mut stored = 0;
        for keyword in keywords {
            match self.fetch_and_store(keyword, published_after, limit).await {
                Ok(count) => stored += count,
                Err(FetchError::Rotator(err)) => {
                    error!(keyword = %keyword, error = %err, "stopping fetch cycle");
                    break;
                }
                Err(err) => error!(keyword = %keyword, error = %err, "fetch failed"),
            }
        }
        stored
    }

    /// Spawns the periodic fetch job
    ///
    /// The first pass runs after one full `period`. `published_after` is
    /// re-evaluated on every pass.
    pub fn spawn_schedule<F>(
        self,
        keywords: Vec<String>,
        period: Duration,
        limit: u32,
        published_after: F,
    ) -> JoinHandle<()>
    where
        F: Fn() -> DateTime<Utc> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                info!(keywords = keywords.len(), "starting scheduled fetch");
                let stored = self.run_cycle(&keywords, published_after(), limit).await;
                info!(stored, "scheduled fetch finished");
            }
        })
    }
}
