//! Error type returned by the HTTP handlers
//!
//! Every failure reaching a handler is turned into a JSON body of the form
//! `{"status": "error", "message": "..."}` with a matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::database::StoreError;
use crate::fetcher::FetchError;
use crate::model::VideoResponse;
use crate::pagination::PaginationError;
use crate::rotator::RotatorError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Pagination(#[from] PaginationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("error in querying database: {0}")]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Pagination(_) => StatusCode::BAD_REQUEST,
            AppError::Fetch(FetchError::Rotator(RotatorError::ExhaustedPool)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Fetch(FetchError::Search(_)) => StatusCode::BAD_GATEWAY,
            AppError::Fetch(_) | AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(VideoResponse::error(self.to_string()))).into_response()
    }
}
