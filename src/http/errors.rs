//! Request-scoped errors for the HTTP listener.
//!
//! Handlers either return an [`ApiError`] or record one on the request's
//! [`ErrorLog`] while still producing a response. The error envelope
//! middleware turns whatever was recorded into the final body.

use std::sync::{Arc, Mutex, PoisonError};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("route not found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Marker carried on a response produced from an [`ApiError`].
#[derive(Debug, Clone)]
pub(crate) struct ReturnedError(pub ApiError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = self.status().into_response();
        response.extensions_mut().insert(ReturnedError(self));
        response
    }
}

/// Errors recorded while handling one request, in order.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    errors: Arc<Mutex<Vec<ApiError>>>,
}

impl ErrorLog {
    pub fn record(&self, error: ApiError) {
        self.lock().push(error);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(crate) fn take(&self) -> Vec<ApiError> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ApiError>> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returned_error_is_attached_to_the_response() {
        let response = ApiError::NotFound("/x".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let attached = response.extensions().get::<ReturnedError>().unwrap();
        assert_eq!(attached.0, ApiError::NotFound("/x".into()));
    }

    #[test]
    fn log_is_shared_between_clones() {
        let log = ErrorLog::default();
        log.clone().record(ApiError::Unavailable("a".into()));
        assert_eq!(log.len(), 1);
        assert_eq!(log.take().len(), 1);
        assert!(log.is_empty());
    }
}
