//! Data models for the video fetch service
//!
//! This module defines the stored video record and the request/response
//! shapes used by the HTTP handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A video search result as stored in the database
///
/// Records are keyed by `id`. Storing a record whose `id` already exists
/// replaces every other field with the new values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VideoRecord {
    /// YouTube video id, the natural key
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Publication timestamp reported by the search API
    pub published_at: DateTime<Utc>,

    /// Name of the channel that published the video
    pub channel_title: String,

    /// URL of the default-size thumbnail
    #[serde(default)]
    pub thumbnail_url: String,
}

/// Query parameters for an on-demand fetch
///
/// # Example
/// Query string: `?query=rust&max_results=10&published_after=2026-01-01T00:00:00Z`
#[derive(Deserialize, Debug, Default)]
pub struct FetchParams {
    /// Search keyword, required
    pub query: Option<String>,

    /// Number of results to request; falls back to the configured fetch limit
    pub max_results: Option<String>,

    /// RFC 3339 lower bound on publication time
    pub published_after: Option<String>,
}

/// Query parameters for listing stored videos
///
/// # Example
/// Query string: `?limit=10&field=published_at&order=DESC&next_cursor=...`
#[derive(Deserialize, Debug, Default)]
pub struct ListParams {
    /// Page size, positive integer
    pub limit: Option<String>,

    /// Sort field: `published_at` (default) or `id`
    pub field: Option<String>,

    /// Sort order: `ASC` or `DESC` (default)
    pub order: Option<String>,

    /// Opaque cursor returned by the previous page
    pub next_cursor: Option<String>,
}

/// Pagination metadata attached to a list response
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaginationInfo {
    pub has_next: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,

    pub total_count: u64,
}

/// Envelope used by every API response
///
/// # Example
/// ```json
/// {
///   "status": "success",
///   "data": [...],
///   "pagination": { "has_next": true, "next_cursor": "...", "total_count": 25 }
/// }
/// ```
#[derive(Serialize, Deserialize, Debug)]
pub struct VideoResponse {
    /// `"success"` or `"error"`
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<VideoRecord>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
}

impl VideoResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            data: None,
            pagination: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
            data: None,
            pagination: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
