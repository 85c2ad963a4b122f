//! Client for the YouTube Data API `search.list` endpoint
//!
//! The fetcher only depends on the [`VideoSearch`] trait; [`YouTubeClient`]
//! is the production implementation over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::model::VideoRecord;
use crate::rotator::Credential;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Largest `maxResults` the search endpoint accepts
pub const MAX_RESULTS_CAP: u32 = 50;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API refused the key itself (quota spent, key invalid or blocked)
    #[error("API key rejected ({status}): {reason}")]
    Credential { status: u16, reason: String },

    #[error("search API returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl SearchError {
    /// Whether retrying with a different key could succeed
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, SearchError::Credential { .. })
    }
}

/// Capability to search for videos with a given API key
#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search(
        &self,
        credential: &Credential,
        query: &str,
        published_after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<VideoRecord>, SearchError>;
}

#[derive(Debug, Clone)]
pub struct YouTubeClient {
    client: Client,
    base_url: String,
}

impl YouTubeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("vidfetch/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl VideoSearch for YouTubeClient {
    async fn search(
        &self,
        credential: &Credential,
        query: &str,
        published_after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<VideoRecord>, SearchError> {
        let url = format!("{}/search", self.base_url);
        let max_results = limit.clamp(1, MAX_RESULTS_CAP).to_string();
        let published_after = published_after.to_rfc3339_opts(SecondsFormat::Secs, true);

        debug!(query, max_results = %max_results, credential = %credential, "searching videos");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("order", "date"),
                ("q", query),
                ("maxResults", max_results.as_str()),
                ("publishedAfter", published_after.as_str()),
                ("key", credential.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.items.into_iter().filter_map(SearchItem::into_record).collect())
    }
}

fn classify_failure(status: StatusCode, body: &str) -> SearchError {
    let reason = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.errors.into_iter().next())
        .map(|detail| detail.reason)
        .unwrap_or_default();

    let key_rejected = status == StatusCode::FORBIDDEN
        || (status == StatusCode::BAD_REQUEST && KEY_REJECTION_REASONS.contains(&reason.as_str()));

    if key_rejected {
        SearchError::Credential {
            status: status.as_u16(),
            reason: if reason.is_empty() { "forbidden".to_string() } else { reason },
        }
    } else {
        SearchError::Status {
            status: status.as_u16(),
            body: body.to_string(),
        }
    }
}

const KEY_REJECTION_REASONS: &[&str] = &["keyInvalid", "keyExpired", "quotaExceeded"];

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: ItemId,
    snippet: Snippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemId {
    video_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    #[serde(default)]
    description: String,
    published_at: DateTime<Utc>,
    channel_title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Deserialize, Default)]
struct Thumbnails {
    default: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

impl SearchItem {
    fn into_record(self) -> Option<VideoRecord> {
        let id = self.id.video_id?;
        Some(VideoRecord {
            id,
            title: self.snippet.title,
            description: self.snippet.description,
            published_at: self.snippet.published_at,
            channel_title: self.snippet.channel_title,
            thumbnail_url: self.snippet.thumbnails.default.map(|t| t.url).unwrap_or_default(),
        })
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}
