//! RPC listener: bounded accept loop, per-connection request loop, drain.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

use super::protocol::{
    self, RpcRequest, RpcResponse, INTERNAL_ERROR, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::buffers::BufferPool;
use crate::config::RpcConfig;
use crate::lifecycle::audit::BufferStats;
use crate::lifecycle::shutdown::ShutdownTrigger;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::net::tls::TlsMaterial;
use crate::net::{report_exit, ListenerKind, ServerHandle};
use crate::observability::metrics;
use crate::version;

type StopSignal = watch::Receiver<Option<Duration>>;

struct RpcContext {
    tls: Option<TlsAcceptor>,
    buffers: Arc<BufferPool>,
    tracker: ConnectionTracker,
}

/// The RPC listener before it is bound.
pub struct RpcServer {
    config: RpcConfig,
    context: RpcContext,
}

impl RpcServer {
    pub fn new(config: &RpcConfig, buffers: Arc<BufferPool>) -> Self {
        Self {
            config: config.clone(),
            context: RpcContext {
                tls: None,
                buffers,
                tracker: ConnectionTracker::new(),
            },
        }
    }

    pub fn with_tls(mut self, tls: &TlsMaterial) -> Self {
        self.context.tls = Some(tls.rpc_acceptor());
        self
    }

    /// Tracker for the connections this server will accept.
    pub fn tracker(&self) -> ConnectionTracker {
        self.context.tracker.clone()
    }

    /// Bind and start serving on a background task.
    ///
    /// A bind failure is returned here; any later failure of the accept
    /// loop is posted to `trigger`.
    pub async fn start(self, trigger: ShutdownTrigger) -> Result<ServerHandle, ListenerError> {
        let address = self.config.socket_addr()?;
        let listener = Listener::bind(address, self.config.max_connections).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { address, source })?;

        tracing::info!(
            address = %local_addr,
            tls = self.context.tls.is_some(),
            "RPC server starting"
        );

        let (stop_tx, stop_rx) = watch::channel(None);
        let context = Arc::new(self.context);
        let task = tokio::spawn(report_exit(
            ListenerKind::Rpc,
            serve(listener, context, stop_rx),
            trigger,
        ));

        Ok(ServerHandle::new(
            ListenerKind::Rpc,
            local_addr,
            move |drain| {
                let _ = stop_tx.send(Some(drain));
            },
            task,
        ))
    }
}

/// Resolves with the drain timeout once a stop is requested. Never resolves
/// if the handle is dropped without stopping.
async fn stop_requested(stop: &mut StopSignal) -> Duration {
    let drain = match stop.wait_for(Option::is_some).await {
        Ok(state) => Some((*state).unwrap_or_default()),
        Err(_) => None,
    };
    match drain {
        Some(drain) => drain,
        None => std::future::pending().await,
    }
}

async fn serve(
    listener: Listener,
    context: Arc<RpcContext>,
    mut stop: StopSignal,
) -> Result<(), ListenerError> {
    let mut connections = JoinSet::new();

    let drain = loop {
        tokio::select! {
            drain = stop_requested(&mut stop) => break drain,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    connections.spawn(handle_connection(
                        stream,
                        peer,
                        Arc::clone(&context),
                        stop.clone(),
                        permit,
                    ));
                }
                Err(ListenerError::Accept(error)) if is_transient(&error) => {
                    tracing::warn!(error = %error, "RPC accept failed, continuing");
                }
                Err(error) => return Err(error),
            },
        }
    };

    drop(listener);
    tracing::info!(
        connections = connections.len(),
        drain_secs = drain.as_secs(),
        "RPC server draining"
    );

    let drained = tokio::time::timeout(drain, context.tracker.wait_for_idle()).await;
    if drained.is_err() {
        tracing::warn!(
            remaining = ?context.tracker.peers(),
            "RPC connections did not finish in time, closing"
        );
    }
    // Handlers that are idle have finished their I/O; this reaps them and
    // aborts any still running.
    connections.shutdown().await;
    Ok(())
}

fn is_transient(error: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        error.kind(),
        ConnectionAborted | ConnectionReset | Interrupted | WouldBlock
    )
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    context: Arc<RpcContext>,
    mut stop: StopSignal,
    _permit: ConnectionPermit,
) {
    let guard = context.tracker.track(peer);
    tracing::debug!(connection_id = %guard.id(), peer = %peer, "RPC connection opened");

    let result = match &context.tls {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => serve_stream(tls_stream, &context, &mut stop).await,
            Err(error) => {
                tracing::warn!(peer = %peer, error = %error, "TLS handshake failed");
                return;
            }
        },
        None => serve_stream(stream, &context, &mut stop).await,
    };

    if let Err(error) = result {
        tracing::debug!(connection_id = %guard.id(), error = %error, "RPC connection ended with error");
    }
}

/// Answer requests until the peer hangs up or a stop is requested. A
/// request already read is always answered. Lines longer than one pooled
/// buffer are skipped and answered with a parse error.
async fn serve_stream<S>(stream: S, context: &RpcContext, stop: &mut StopSignal) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let max_line = context.buffers.buffer_size();
    let mut line = Vec::new();

    loop {
        let read = tokio::select! {
            _ = stop_requested(stop) => break,
            read = read_line(&mut reader, &mut line, max_line) => read?,
        };

        let response = match read {
            Line::Closed => break,
            Line::TooLong => {
                tracing::debug!(max_line, "RPC request exceeds the buffer size");
                RpcResponse::error(0, PARSE_ERROR, format!("request exceeds {max_line} bytes"))
            }
            Line::Complete => {
                match std::str::from_utf8(&line) {
                    Ok(text) if text.trim().is_empty() => continue,
                    Ok(text) => match protocol::parse_request(text) {
                        Ok(request) => dispatch(&request, context),
                        Err(response) => response,
                    },
                    Err(_) => RpcResponse::error(0, PARSE_ERROR, "request is not valid UTF-8"),
                }
            }
        };

        if !respond(&response, context, &mut writer).await? {
            break;
        }
    }

    writer.shutdown().await
}

enum Line {
    Complete,
    TooLong,
    Closed,
}

/// Read one newline-terminated line of at most `max` bytes into `line`,
/// without the terminator. An overlong line is consumed up to its newline
/// and discarded, never buffered whole.
async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>, max: usize) -> std::io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max as u64 + 1;
    line.clear();
    let read = (&mut *reader).take(limit).read_until(b'\n', line).await?;
    if read == 0 {
        return Ok(Line::Closed);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        return Ok(Line::Complete);
    }
    if (read as u64) < limit {
        // Last line before EOF, without a terminator.
        return Ok(Line::Complete);
    }

    loop {
        line.clear();
        let skipped = (&mut *reader).take(limit).read_until(b'\n', line).await?;
        if skipped == 0 || line.last() == Some(&b'\n') {
            line.clear();
            return Ok(Line::TooLong);
        }
    }
}

/// Write `response` through a pooled buffer. `false` when no buffer is
/// available and the connection should close.
async fn respond<W>(response: &RpcResponse, context: &RpcContext, writer: &mut W) -> std::io::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = match context.buffers.acquire() {
        Ok(buf) => buf,
        Err(error) => {
            tracing::warn!(error = %error, "No buffer for RPC response, closing connection");
            return Ok(false);
        }
    };
    protocol::encode(response, &mut buf)?;
    writer.write_all(&buf).await?;
    Ok(true)
}

fn dispatch(request: &RpcRequest, context: &RpcContext) -> RpcResponse {
    let response = match request.method.as_str() {
        "ping" => RpcResponse::ok(request.id, json!("pong")),
        "stat" => match serde_json::to_value(context.buffers.stats()) {
            Ok(buffers) => RpcResponse::ok(
                request.id,
                json!({
                    "version": version::VERSION,
                    "api_version": version::API_VERSION,
                    "buffers": buffers,
                    "active_connections": context.tracker.active_count(),
                }),
            ),
            Err(error) => RpcResponse::error(request.id, INTERNAL_ERROR, error.to_string()),
        },
        other => RpcResponse::error(
            request.id,
            METHOD_NOT_FOUND,
            format!("unknown method '{other}'"),
        ),
    };

    metrics::record_rpc_request(&request.method, response.is_ok());
    response
}
