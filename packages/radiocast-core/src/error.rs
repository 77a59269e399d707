//! Centralized error types for the Radiocast core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::frame::FrameError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for FrameError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "track_io_error",
            Self::ShortRead { .. } => "track_truncated",
        }
    }
}

/// Application-wide error type for the Radiocast server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum RadiocastError {
    /// A reorder request was not a permutation of the current track ids.
    #[error("Invalid reorder: {0}")]
    InvalidReorder(String),

    /// Playlist directory could not be scanned.
    #[error("Playlist load failed: {0}")]
    PlaylistLoad(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RadiocastError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidReorder(_) => "invalid_reorder",
            Self::PlaylistLoad(_) => "playlist_load_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidReorder(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::PlaylistLoad(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type RadiocastResult<T> = Result<T, RadiocastError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for RadiocastError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for RadiocastError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
