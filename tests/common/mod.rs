//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use storage_gateway::config::ServiceConfig;
use storage_gateway::provisioning::{ProvisionError, SchemaConnection, SchemaConnector};
use storage_gateway::rpc::RpcResponse;
use storage_gateway::storage::{StorageEngine, StorageError};

/// Config with both listeners on loopback and OS-assigned ports.
pub fn local_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.rpc.server_ip = "127.0.0.1".into();
    config.rpc.server_port = 0;
    config.rest.server_ip = "127.0.0.1".into();
    config.rest.server_port = 0;
    config.internal.preallocated_buffers = 4;
    config.lifecycle.shutdown_timeout_secs = 2;
    config
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Hold a port so a listener configured on it fails to bind.
pub fn occupied_port() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

pub fn port_is_free(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Send one request line and read one response line.
pub async fn rpc_call(addr: SocketAddr, line: &str) -> RpcResponse {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    writer.write_all(line.as_bytes()).await.unwrap();
    writer.write_all(b"\n").await.unwrap();

    let mut lines = BufReader::new(reader).lines();
    let reply = lines.next_line().await.unwrap().unwrap();
    serde_json::from_str(&reply).unwrap()
}

/// Storage engine that counts calls and can be told to fail.
#[derive(Default)]
pub struct RecordingStorage {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_disconnect: AtomicBool,
}

impl RecordingStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_connect() -> Arc<Self> {
        let storage = Self::default();
        storage.fail_connect.store(true, Ordering::SeqCst);
        Arc::new(storage)
    }

    pub fn failing_disconnect() -> Arc<Self> {
        let storage = Self::default();
        storage.fail_disconnect.store(true, Ordering::SeqCst);
        Arc::new(storage)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl StorageEngine for RecordingStorage {
    fn connect(&self, _connect_string: &str) -> Result<(), StorageError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(StorageError::EmptyConnectString);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), StorageError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(StorageError::Close(std::io::Error::other("injected")));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Statement executed by a [`MockConnector`] session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    pub session: usize,
    pub statement: String,
}

/// Schema connector that records statements instead of running them.
#[derive(Default)]
pub struct MockConnector {
    executed: Arc<Mutex<Vec<Executed>>>,
    sessions: AtomicUsize,
    closed: Arc<AtomicUsize>,
    fail_on: Option<String>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail any statement containing `needle`.
    pub fn failing_on(needle: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_on: Some(needle.to_string()),
            ..Self::default()
        })
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.executed.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.executed().into_iter().map(|e| e.statement).collect()
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockSession {
    id: usize,
    executed: Arc<Mutex<Vec<Executed>>>,
    closed: Arc<AtomicUsize>,
    fail_on: Option<String>,
}

impl SchemaConnector for MockConnector {
    type Connection = MockSession;

    async fn connect(&self) -> Result<MockSession, ProvisionError> {
        let id = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockSession {
            id,
            executed: Arc::clone(&self.executed),
            closed: Arc::clone(&self.closed),
            fail_on: self.fail_on.clone(),
        })
    }
}

impl SchemaConnection for MockSession {
    async fn execute(&mut self, statement: &str) -> Result<(), ProvisionError> {
        if let Some(needle) = &self.fail_on {
            if statement.contains(needle.as_str()) {
                return Err(ProvisionError::Execute {
                    statement: statement.to_string(),
                    source: "injected failure".into(),
                });
            }
        }
        self.executed.lock().unwrap().push(Executed {
            session: self.id,
            statement: statement.to_string(),
        });
        Ok(())
    }

    async fn close(self) -> Result<(), ProvisionError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
