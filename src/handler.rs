//! HTTP request handlers for the video API
//!
//! This module implements the two public endpoints:
//! - Fetching videos from the search API on demand and storing them
//! - Listing stored videos with cursor pagination

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};

use crate::database::{count_videos, query_videos};
use crate::error::AppError;
use crate::model::{FetchParams, ListParams, PaginationInfo, VideoResponse};
use crate::pagination::{
    build_query, shape_page, PageRequest, PaginationError, SortField, SortOrder, MAX_PAGE_LIMIT,
};
use crate::state::AppState;

/// Searches the video API and stores the results
///
/// The API key is taken from the shared rotation pool; a rejected key is
/// penalized and the search retried once with another key.
///
/// # Query Parameters
///
/// - `query` (required) - Search keyword
/// - `max_results` (optional) - Positive integer, defaults to the configured fetch limit
/// - `published_after` (optional) - RFC 3339 timestamp, defaults to the configured window
///
/// # Example Request
///
/// `GET /api/fetch?query=cricket&max_results=10`
///
/// # Response
///
/// - **200 OK** - Videos fetched and stored
/// - **400 Bad Request** - Missing or malformed parameter
/// - **502 Bad Gateway** - The search API failed
/// - **503 Service Unavailable** - Every API key is out of quota
pub async fn fetch_videos(
    State(state): State<AppState>,
    Query(params): Query<FetchParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = params
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("request parameter 'query' is required".to_string()))?;

    let max_results = match params.max_results.as_deref() {
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| AppError::BadRequest("invalid 'max_results' parameter".to_string()))?,
        None => state.config.default_fetch_limit,
    };

    let published_after = match params.published_after.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| AppError::BadRequest("invalid 'published_after' parameter".to_string()))?,
        None => state.config.default_published_after(Utc::now()),
    };

    let stored = state
        .fetcher
        .fetch_and_store(&query, published_after, max_results)
        .await?;

    Ok((
        StatusCode::OK,
        Json(VideoResponse::success().with_message(format!("stored {} videos", stored))),
    ))
}

/// Lists stored videos, one page at a time
///
/// Pages are addressed by cursor rather than by number: pass the
/// `next_cursor` of one response to get the page after it, keeping `field`
/// and `order` the same for the whole traversal.
///
/// # Query Parameters
///
/// - `limit` (optional) - Items per page, 1 to 100 (default: 10)
/// - `field` (optional) - `published_at` (default) or `id`
/// - `order` (optional) - `DESC` (default) or `ASC`, case-insensitive
/// - `next_cursor` (optional) - Cursor from the previous page
///
/// # Example Request
///
/// `GET /api/getVideos?limit=20&next_cursor=MjAyNi0wMS0wMVQwMDowMDowMFo`
///
/// # Response
///
/// ```json
/// {
///   "status": "success",
///   "data": [...],
///   "pagination": { "has_next": true, "next_cursor": "...", "total_count": 125 }
/// }
/// ```
///
/// A malformed cursor is rejected with **400 Bad Request**; it is never
/// treated as a request for the first page.
pub async fn get_videos(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let request = page_request(&params, state.config.default_page_limit)?;
    let query = build_query(&request)?;

    let rows = query_videos(&state.db, &query)?;
    let total_count = count_videos(&state.db)?;
    let page = shape_page(rows, request.limit, request.sort_field, total_count);

    Ok(Json(VideoResponse {
        status: "success".to_string(),
        message: None,
        data: Some(page.records),
        pagination: Some(PaginationInfo {
            has_next: page.has_next,
            next_cursor: page.next_cursor,
            total_count: page.total_count,
        }),
    }))
}

/// Turns raw list parameters into a validated page request
pub fn page_request(params: &ListParams, default_limit: usize) -> Result<PageRequest, PaginationError> {
    let limit = match non_empty(&params.limit) {
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=MAX_PAGE_LIMIT).contains(n))
            .ok_or(PaginationError::InvalidLimit)?,
        None => default_limit,
    };
    let sort_field = non_empty(&params.field)
        .map(str::parse::<SortField>)
        .transpose()?
        .unwrap_or_default();
    let sort_order = non_empty(&params.order)
        .map(str::parse::<SortOrder>)
        .transpose()?
        .unwrap_or_default();

    Ok(PageRequest {
        limit,
        sort_field,
        sort_order,
        cursor: non_empty(&params.next_cursor).map(String::from),
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
