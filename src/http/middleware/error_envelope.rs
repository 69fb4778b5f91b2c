//! Error envelope middleware.
//! Logs every error recorded during a request and renders the last one.

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::http::errors::{ErrorLog, ReturnedError};
use crate::observability::metrics;

pub async fn error_envelope(mut req: Request<Body>, next: Next) -> Response {
    let log = ErrorLog::default();
    req.extensions_mut().insert(log.clone());
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let mut response = next.run(req).await;

    let mut errors = log.take();
    if let Some(ReturnedError(error)) = response.extensions_mut().remove::<ReturnedError>() {
        errors.push(error);
    }

    let Some(last) = errors.last() else {
        return response;
    };

    for error in &errors {
        tracing::warn!(
            method = %method,
            path = %path,
            status = error.status().as_u16(),
            error = %error,
            "Request error"
        );
    }

    // A handler that already picked an error status keeps it.
    let status = if response.status().is_client_error() || response.status().is_server_error() {
        response.status()
    } else {
        last.status()
    };
    metrics::record_http_error(status.as_u16());

    (status, Json(last.to_string())).into_response()
}
