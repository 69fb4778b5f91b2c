//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the ping and stat handlers
//! - Wire up middleware (tracing, timeout, error envelope)
//! - Bind the listener synchronously so a taken port fails startup
//! - Serve plain or TLS through axum-server with a graceful shutdown handle

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, State},
    http::{StatusCode, Uri},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use axum_server::Handle;
use serde::Serialize;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::buffers::BufferPool;
use crate::config::RestConfig;
use crate::http::errors::{ApiError, ErrorLog};
use crate::http::middleware::error_envelope;
use crate::lifecycle::audit::{BufferStats, ResourceAccounting};
use crate::lifecycle::shutdown::ShutdownTrigger;
use crate::net::listener::{bind_std, ListenerError};
use crate::net::tls::TlsMaterial;
use crate::net::{report_exit, ListenerKind, ServerHandle};
use crate::version;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub buffers: Arc<BufferPool>,
}

#[derive(Debug, Serialize)]
struct StatResponse {
    version: &'static str,
    api_version: &'static str,
    buffers: ResourceAccounting,
}

/// The HTTP listener before it is bound.
pub struct HttpServer {
    router: Router,
    config: RestConfig,
}

impl HttpServer {
    pub fn new(config: &RestConfig, state: AppState) -> Self {
        let router = Self::build_router(config, state);
        Self {
            router,
            config: config.clone(),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RestConfig, state: AppState) -> Router {
        let prefix = format!("/{}", version::API_VERSION);
        Router::new()
            .route(&format!("{prefix}/ping"), get(ping_handler))
            .route(&format!("{prefix}/stat"), get(stat_handler))
            .fallback(not_found)
            .with_state(state)
            .layer(middleware::from_fn(error_envelope))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and start serving on a background task.
    ///
    /// A bind failure is returned here; a later failure of the serving loop
    /// is posted to `trigger`.
    pub async fn start(
        self,
        tls: Option<&TlsMaterial>,
        trigger: ShutdownTrigger,
    ) -> Result<ServerHandle, ListenerError> {
        let address = self.config.socket_addr()?;
        let listener = bind_std(address)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { address, source })?;

        tracing::info!(
            address = %local_addr,
            tls = tls.is_some(),
            "HTTP server starting"
        );

        let handle = Handle::new();
        let app = self.router.into_make_service();
        let task = match tls {
            Some(tls) => {
                let server = axum_server::from_tcp_rustls(listener, tls.http_config())
                    .handle(handle.clone());
                tokio::spawn(report_exit(ListenerKind::Http, server.serve(app), trigger))
            }
            None => {
                let server = axum_server::from_tcp(listener).handle(handle.clone());
                tokio::spawn(report_exit(ListenerKind::Http, server.serve(app), trigger))
            }
        };

        Ok(ServerHandle::new(
            ListenerKind::Http,
            local_addr,
            move |drain| handle.graceful_shutdown(Some(drain)),
            task,
        ))
    }

    #[cfg(test)]
    fn into_router(self) -> Router {
        self.router
    }
}

async fn ping_handler() -> StatusCode {
    StatusCode::OK
}

async fn stat_handler(State(state): State<AppState>) -> Result<Json<StatResponse>, ApiError> {
    if state.buffers.is_released() {
        return Err(ApiError::Unavailable("buffer pool released".into()));
    }
    Ok(Json(StatResponse {
        version: version::VERSION,
        api_version: version::API_VERSION,
        buffers: state.buffers.stats(),
    }))
}

async fn not_found(Extension(log): Extension<ErrorLog>, uri: Uri) -> impl IntoResponse {
    log.record(ApiError::NotFound(uri.path().to_string()));
    StatusCode::OK
}
