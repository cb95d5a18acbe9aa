// [libs/netmon-storage/src/client.rs]
//! Connection management. The driver distinguishes a local file/in-memory
//! database from a remote libSQL/Turso endpoint by URL scheme, and applies
//! the schema once against a bootstrap connection before handing out
//! further connections.

use crate::errors::StorageError;
use crate::schema::apply_schema;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct StorageClient {
    database: Arc<Database>,
    /// Holds a connection open for the lifetime of an in-memory database so
    /// SQLite doesn't drop its schema once the bootstrap connection closes.
    _memory_anchor: Option<Arc<Connection>>,
}

impl StorageClient {
    #[instrument(skip(auth_token))]
    pub async fn connect(database_url: &str, auth_token: Option<String>) -> Result<Self, StorageError> {
        if database_url.is_empty() {
            return Err(StorageError::Configuration("database URL is empty".into()));
        }

        let is_remote = database_url.starts_with("libsql://") || database_url.starts_with("https://");
        let is_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let database = if is_remote {
            let token = auth_token
                .ok_or_else(|| StorageError::Configuration("remote database URL given without an auth token".into()))?;
            Builder::new_remote(database_url.to_string(), token).build().await
        } else {
            Builder::new_local(database_url).build().await
        }
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let database = Arc::new(database);
        let mut anchor = None;

        if is_memory {
            let anchor_conn = database.connect().map_err(|e| StorageError::Connection(e.to_string()))?;
            apply_schema(&anchor_conn).await.map_err(|e| StorageError::Connection(e.to_string()))?;
            anchor = Some(Arc::new(anchor_conn));
        } else {
            let bootstrap = database.connect().map_err(|e| StorageError::Connection(e.to_string()))?;
            apply_schema(&bootstrap).await.map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        info!(url = %database_url, "storage client connected");
        Ok(Self { database, _memory_anchor: anchor })
    }

    pub fn get_connection(&self) -> Result<Connection, StorageError> {
        self.database.connect().map_err(|e| StorageError::Connection(e.to_string()))
    }
}
