//! TCP session to a storage management server.

use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{StorageError, StorageEngine};

/// Holds one session to the first reachable management server.
#[derive(Debug)]
pub struct MgmConnection {
    connect_timeout: Duration,
    session: Mutex<Option<TcpStream>>,
}

impl MgmConnection {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            session: Mutex::new(None),
        }
    }

    fn open(&self, address: &str) -> io::Result<TcpStream> {
        let mut last_error = io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing");
        for addr in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(error) => last_error = error,
            }
        }
        Err(last_error)
    }
}

impl StorageEngine for MgmConnection {
    fn connect(&self, connect_string: &str) -> Result<(), StorageError> {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.is_some() {
            return Err(StorageError::AlreadyConnected);
        }

        let mut last_error = None;
        for address in connect_string.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            match self.open(address) {
                Ok(stream) => {
                    tracing::info!(address, "Connected to storage management server");
                    *session = Some(stream);
                    return Ok(());
                }
                Err(error) => {
                    tracing::warn!(address, %error, "Management server unreachable");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(source) => Err(StorageError::Unreachable {
                connect_string: connect_string.to_string(),
                source,
            }),
            None => Err(StorageError::EmptyConnectString),
        }
    }

    fn disconnect(&self) -> Result<(), StorageError> {
        let stream = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match stream {
            Some(stream) => {
                match stream.shutdown(Shutdown::Both) {
                    Ok(()) => {}
                    // The peer may already have hung up.
                    Err(error) if error.kind() == io::ErrorKind::NotConnected => {}
                    Err(error) => return Err(StorageError::Close(error)),
                }
                tracing::info!("Storage connection closed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn connection() -> MgmConnection {
        MgmConnection::new(Duration::from_millis(500))
    }

    #[test]
    fn connects_to_first_reachable_server() {
        let dead = TcpListener::bind("127.0.0.1:0").unwrap();
        let dead_addr = dead.local_addr().unwrap();
        drop(dead);
        let live = TcpListener::bind("127.0.0.1:0").unwrap();
        let live_addr = live.local_addr().unwrap();

        let conn = connection();
        conn.connect(&format!("{dead_addr},{live_addr}")).unwrap();
        assert!(conn.is_connected());

        conn.disconnect().unwrap();
        assert!(!conn.is_connected());
    }

    #[test]
    fn reports_unreachable_servers() {
        let dead = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = dead.local_addr().unwrap();
        drop(dead);

        let err = connection().connect(&addr.to_string()).unwrap_err();
        assert!(matches!(err, StorageError::Unreachable { .. }), "got {err}");
    }

    #[test]
    fn empty_connect_string_is_rejected() {
        let err = connection().connect(" , ").unwrap_err();
        assert!(matches!(err, StorageError::EmptyConnectString));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let live = TcpListener::bind("127.0.0.1:0").unwrap();
        let conn = connection();
        conn.connect(&live.local_addr().unwrap().to_string()).unwrap();

        conn.disconnect().unwrap();
        conn.disconnect().unwrap();
    }

    #[test]
    fn second_connect_is_refused() {
        let live = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = live.local_addr().unwrap().to_string();
        let conn = connection();
        conn.connect(&addr).unwrap();

        assert!(matches!(conn.connect(&addr), Err(StorageError::AlreadyConnected)));
        conn.disconnect().unwrap();
    }
}
