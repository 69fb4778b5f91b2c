//! MySQL-compatible schema connector over sea-orm.

use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};

use super::{ProvisionError, SchemaConnection, SchemaConnector};
use crate::config::ProvisioningConfig;

/// Opens a single-connection pool per session.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    url: String,
    connect_timeout: Duration,
}

impl MySqlConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &ProvisioningConfig) -> Self {
        Self::new(config.database_url.clone()).with_connect_timeout(config.connect_timeout())
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

pub struct MySqlSession {
    conn: DatabaseConnection,
}

impl SchemaConnector for MySqlConnector {
    type Connection = MySqlSession;

    async fn connect(&self) -> Result<MySqlSession, ProvisionError> {
        let mut opt = ConnectOptions::new(self.url.clone());
        opt.max_connections(1)
            .min_connections(1)
            .connect_timeout(self.connect_timeout)
            .sqlx_logging(false);

        let conn = Database::connect(opt)
            .await
            .map_err(|e| ProvisionError::Connect(Box::new(e)))?;
        Ok(MySqlSession { conn })
    }
}

impl SchemaConnection for MySqlSession {
    async fn execute(&mut self, statement: &str) -> Result<(), ProvisionError> {
        self.conn
            .execute_unprepared(statement)
            .await
            .map(|_| ())
            .map_err(|e| ProvisionError::Execute {
                statement: statement.to_string(),
                source: Box::new(e),
            })
    }

    async fn close(self) -> Result<(), ProvisionError> {
        self.conn
            .close()
            .await
            .map_err(|e| ProvisionError::Close(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_is_a_connect_error() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let connector = MySqlConnector::from_config(&ProvisioningConfig {
            database_url: format!("mysql://root@127.0.0.1:{port}/fixtures"),
            connect_timeout_secs: 1,
        });

        let result = tokio::time::timeout(Duration::from_secs(10), connector.connect())
            .await
            .unwrap();
        match result {
            Err(ProvisionError::Connect(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connected to a closed port"),
        }
    }
}
