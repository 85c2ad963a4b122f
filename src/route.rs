//! Route definitions for the video API
//!
//! This module configures all HTTP routes and maps them to their respective handlers.
//! It creates the Axum router with the application state.

use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::handler::{fetch_videos, get_videos};
use crate::state::AppState;

/// Creates and configures the Axum application router with all routes
///
/// # Route Definitions
///
/// - `GET /api/fetch` - Searches the video API and stores the results
/// - `GET /api/getVideos` - Lists stored videos with cursor pagination
///
/// Both routes accept cross-origin calls from the configured frontend origin.
///
/// # Example Usage
///
/// ```no_run
/// # use vidfetch::state::AppState;
/// # use vidfetch::route::create_app;
/// # fn build(state: AppState) {
/// let app = create_app(state);
/// // axum::serve(listener, app).await.unwrap();
/// # }
/// ```
pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origin);

    let api_routes = Router::new()
        .route("/fetch", get(fetch_videos))
        .route("/getVideos", get(get_videos));

    Router::new()
        .nest("/api", api_routes)
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::CONTENT_LENGTH])
        .max_age(Duration::from_secs(12 * 60 * 60));

    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(AllowOrigin::exact(value)).allow_credentials(true),
        Err(_) => {
            warn!(origin, "ignoring unparsable CORS origin");
            layer
        }
    }
}
