//! Integration tests for the video API
//!
//! These tests verify the entire application stack including:
//! - HTTP routing
//! - Request/response handling
//! - Key rotation during fetches
//! - Database operations and cursor pagination
//! - Error handling

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use vidfetch::config::Config;
use vidfetch::database::{init_db, upsert_videos};
use vidfetch::fetcher::Fetcher;
use vidfetch::model::VideoRecord;
use vidfetch::rotator::{Credential, CredentialRotator, QuotaPolicy};
use vidfetch::route::create_app;
use vidfetch::state::AppState;
use vidfetch::youtube::{SearchError, VideoSearch};

/// Search backend that fabricates results and rejects chosen keys
#[derive(Default)]
struct StubSearch {
    rejected_keys: HashSet<String>,
    calls: Mutex<Vec<(String, String, u32)>>,
}

impl StubSearch {
    fn rejecting(keys: &[&str]) -> Self {
        Self {
            rejected_keys: keys.iter().map(|k| k.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn keys_used(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(k, _, _)| k.clone()).collect()
    }
}

#[async_trait]
impl VideoSearch for StubSearch {
    async fn search(
        &self,
        credential: &Credential,
        query: &str,
        published_after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<VideoRecord>, SearchError> {
        self.calls
            .lock()
            .unwrap()
            .push((credential.as_str().to_string(), query.to_string(), limit));

        if self.rejected_keys.contains(credential.as_str()) {
            return Err(SearchError::Credential {
                status: 403,
                reason: "quotaExceeded".to_string(),
            });
        }

        Ok((0..limit)
            .map(|i| VideoRecord {
                id: format!("{}-{}", query, i),
                title: format!("{} video {}", query, i),
                description: String::new(),
                published_at: published_after + Duration::minutes(i64::from(i) + 1),
                channel_title: "Stub Channel".to_string(),
                thumbnail_url: String::new(),
            })
            .collect())
    }
}

struct TestApp {
    app: axum::Router,
    state: AppState,
    search: Arc<StubSearch>,
    _temp_db: NamedTempFile,
}

/// Helper function to create a test application with a temporary database
fn setup_test_app(keys: &[&str], quota: QuotaPolicy, search: StubSearch) -> TestApp {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let db = Arc::new(init_db(temp_db.path().to_str().unwrap()).expect("Failed to initialize test database"));

    let rotator = Arc::new(CredentialRotator::new(keys.iter().copied(), quota).unwrap());
    let search = Arc::new(search);
    let fetcher = Fetcher::new(rotator, search.clone(), db.clone());

    let config = Config {
        api_keys: keys.iter().map(|k| k.to_string()).collect(),
        fetch_interval: None,
        quota,
        ..Config::default()
    };

    let state = AppState {
        db,
        fetcher,
        config: Arc::new(config),
    };

    TestApp {
        app: create_app(state.clone()),
        state,
        search,
        _temp_db: temp_db,
    }
}

fn default_app() -> TestApp {
    setup_test_app(&["key-one", "key-two"], QuotaPolicy::default(), StubSearch::default())
}

/// Helper function to parse response body as JSON
async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, response_json(response.into_body()).await)
}

fn seed(state: &AppState, count: i64) {
    let base = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
    let videos: Vec<VideoRecord> = (1..=count)
        .map(|n| VideoRecord {
            id: format!("vid{:03}", n),
            title: format!("Video {}", n),
            description: String::new(),
            published_at: base + Duration::hours(n),
            channel_title: "Seed".to_string(),
            thumbnail_url: String::new(),
        })
        .collect();
    upsert_videos(&state.db, &videos).unwrap();
}

#[tokio::test]
async fn test_fetch_stores_videos() {
    let test = default_app();

    let (status, body) = get(&test.app, "/api/fetch?query=cricket&max_results=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "stored 5 videos");

    let (status, body) = get(&test.app, "/api/getVideos").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
    assert_eq!(body["pagination"]["total_count"], 5);
}

#[tokio::test]
async fn test_fetch_requires_query() {
    let test = default_app();

    let (status, body) = get(&test.app, "/api/fetch").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "request parameter 'query' is required");
    assert!(test.search.keys_used().is_empty());
}

#[tokio::test]
async fn test_fetch_rejects_bad_max_results() {
    let test = default_app();

    for uri in ["/api/fetch?query=music&max_results=0", "/api/fetch?query=music&max_results=ten"] {
        let (status, body) = get(&test.app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "invalid 'max_results' parameter");
    }
}

#[tokio::test]
async fn test_fetch_uses_default_limit() {
    let test = default_app();

    let (status, _) = get(&test.app, "/api/fetch?query=vlogs").await;
    assert_eq!(status, StatusCode::OK);
    let calls = test.search.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![("key-one".to_string(), "vlogs".to_string(), 20)]);
}

#[tokio::test]
async fn test_fetch_rotates_keys() {
    let test = default_app();

    for _ in 0..4 {
        let (status, _) = get(&test.app, "/api/fetch?query=music&max_results=1").await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(
        test.search.keys_used(),
        vec!["key-one", "key-two", "key-one", "key-two"]
    );
}

#[tokio::test]
async fn test_rejected_key_is_penalized_and_retried() {
    let test = setup_test_app(
        &["bad-key", "good-key"],
        QuotaPolicy::default(),
        StubSearch::rejecting(&["bad-key"]),
    );

    let (status, _) = get(&test.app, "/api/fetch?query=politics&max_results=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(test.search.keys_used(), vec!["bad-key", "good-key"]);

    let rotator = test.state.fetcher.rotator();
    assert_eq!(rotator.spent(&Credential::new("bad-key")), Some(10_000));

    // the penalized key is no longer handed out
    let (status, _) = get(&test.app, "/api/fetch?query=politics&max_results=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(test.search.keys_used(), vec!["bad-key", "good-key", "good-key"]);
}

#[tokio::test]
async fn test_all_keys_rejected_returns_bad_gateway() {
    let test = setup_test_app(
        &["bad-1", "bad-2", "bad-3"],
        QuotaPolicy::default(),
        StubSearch::rejecting(&["bad-1", "bad-2", "bad-3"]),
    );

    let (status, body) = get(&test.app, "/api/fetch?query=news").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], "error");
    // one retry only
    assert_eq!(test.search.keys_used(), vec!["bad-1", "bad-2"]);
}

#[tokio::test]
async fn test_exhausted_pool_returns_service_unavailable() {
    let quota = QuotaPolicy {
        max_window_budget: 200,
        call_cost: 100,
        window: Duration::hours(24),
    };
    let test = setup_test_app(&["only-key"], quota, StubSearch::default());

    for _ in 0..2 {
        let (status, _) = get(&test.app, "/api/fetch?query=music&max_results=1").await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = get(&test.app, "/api/fetch?query=music&max_results=1").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "all API keys have exceeded their quota");
    assert_eq!(test.search.keys_used().len(), 2);
}

#[tokio::test]
async fn test_get_videos_paginates_with_cursor() {
    let test = default_app();
    seed(&test.state, 25);

    let (status, page1) = get(&test.app, "/api/getVideos?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page1["data"].as_array().unwrap().len(), 10);
    assert_eq!(page1["data"][0]["id"], "vid025");
    assert_eq!(page1["pagination"]["has_next"], true);
    assert_eq!(page1["pagination"]["total_count"], 25);

    let cursor = page1["pagination"]["next_cursor"].as_str().unwrap().to_string();
    let (_, page2) = get(&test.app, &format!("/api/getVideos?limit=10&next_cursor={}", cursor)).await;
    assert_eq!(page2["data"][0]["id"], "vid015");
    assert_eq!(page2["data"][9]["id"], "vid006");

    let cursor = page2["pagination"]["next_cursor"].as_str().unwrap().to_string();
    let (_, page3) = get(&test.app, &format!("/api/getVideos?limit=10&next_cursor={}", cursor)).await;
    assert_eq!(page3["data"].as_array().unwrap().len(), 5);
    assert_eq!(page3["pagination"]["has_next"], false);
    assert!(page3["pagination"].get("next_cursor").is_none());
}

#[tokio::test]
async fn test_get_videos_sort_options() {
    let test = default_app();
    seed(&test.state, 3);

    let (status, body) = get(&test.app, "/api/getVideos?field=id&order=asc").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["vid001", "vid002", "vid003"]);
}

#[tokio::test]
async fn test_get_videos_default_page_size() {
    let test = default_app();
    seed(&test.state, 12);

    let (_, body) = get(&test.app, "/api/getVideos").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 10);
    assert_eq!(body["pagination"]["has_next"], true);
}

#[tokio::test]
async fn test_get_videos_rejects_invalid_cursor() {
    let test = default_app();
    seed(&test.state, 5);

    let (status, body) = get(&test.app, "/api/getVideos?next_cursor=***").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().starts_with("invalid cursor"));
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_get_videos_rejects_bad_parameters() {
    let test = default_app();

    for uri in [
        "/api/getVideos?limit=0",
        "/api/getVideos?limit=-3",
        "/api/getVideos?limit=101",
        "/api/getVideos?field=title",
        "/api/getVideos?order=random",
    ] {
        let (status, body) = get(&test.app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {}", uri);
        assert_eq!(body["status"], "error");
    }
}

#[tokio::test]
async fn test_get_videos_rejects_oversized_limit() {
    let test = default_app();
    seed(&test.state, 3);

    for limit in ["101", "100000000000", "18446744073709551615"] {
        let (status, body) = get(&test.app, &format!("/api/getVideos?limit={}", limit)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "limit {}", limit);
        assert_eq!(body["message"], "invalid limit parameter");
    }

    let (status, body) = get(&test.app, "/api/getVideos?limit=100").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_get_videos_id_cursor_walk() {
    let test = default_app();
    seed(&test.state, 5);

    let (status, page1) = get(&test.app, "/api/getVideos?field=id&order=desc&limit=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page1["data"][0]["id"], "vid005");
    assert_eq!(page1["data"][2]["id"], "vid003");

    let cursor = page1["pagination"]["next_cursor"].as_str().unwrap().to_string();
    let (status, page2) = get(
        &test.app,
        &format!("/api/getVideos?field=id&order=desc&limit=3&next_cursor={}", cursor),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = page2["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["vid002", "vid001"]);
    assert_eq!(page2["pagination"]["has_next"], false);
}

#[tokio::test]
async fn test_scheduled_cycle_covers_keywords() {
    let test = default_app();
    let keywords = vec!["cricket".to_string(), "music".to_string()];
    let since = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

    let stored = test.state.fetcher.run_cycle(&keywords, since, 3).await;
    assert_eq!(stored, 6);
    assert_eq!(test.search.keys_used(), vec!["key-one", "key-two"]);
}

#[tokio::test]
async fn test_scheduled_cycle_stops_when_pool_exhausted() {
    let quota = QuotaPolicy {
        max_window_budget: 100,
        call_cost: 100,
        window: Duration::hours(24),
    };
    let test = setup_test_app(&["only-key"], quota, StubSearch::default());
    let keywords = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let since = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

    let stored = test.state.fetcher.run_cycle(&keywords, since, 2).await;
    assert_eq!(stored, 2);
    assert_eq!(test.search.keys_used(), vec!["only-key"]);
}
