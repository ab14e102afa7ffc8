//! Connection manager for warehouse session lifecycle.

use crate::config::LogonConfig;
use crate::db::WarehouseClient;
use crate::error::{BatchError, Result};
use tracing::{info, warn};

/// An open warehouse session with the tag it was opened under.
pub struct ActiveConnection {
    /// Query tag set when the session was opened (the job name).
    pub tag: String,
    /// Warehouse client.
    pub client: Box<dyn WarehouseClient>,
}

/// Tracks every session a job opens so all of them can be closed on exit.
///
/// Jobs conventionally open one; the most recently opened one is current.
#[derive(Default)]
pub struct ConnectionManager {
    connections: Vec<ActiveConnection>,
    current: Option<usize>,
}

impl ConnectionManager {
    /// Creates a manager with no connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager around an already open client.
    pub fn with_connection(client: Box<dyn WarehouseClient>, tag: impl Into<String>) -> Self {
        let mut manager = Self::new();
        manager.attach(client, tag);
        manager
    }

    /// Connects using `config` and makes the new session current.
    ///
    /// There is no retry: a failed login is returned as-is.
    pub async fn open(&mut self, config: &LogonConfig, tag: &str) -> Result<usize> {
        info!("Connecting to {}", config.display_string());
        let client = crate::db::connect(config, tag).await?;
        info!("Connected ({} backend)", client.backend().as_str());
        Ok(self.attach(client, tag))
    }

    /// Tracks an open client and makes it current. Returns its index.
    pub fn attach(&mut self, client: Box<dyn WarehouseClient>, tag: impl Into<String>) -> usize {
        self.connections.push(ActiveConnection {
            tag: tag.into(),
            client,
        });
        let index = self.connections.len() - 1;
        self.current = Some(index);
        index
    }

    /// The current session, if it is still open.
    pub fn current_mut(&mut self) -> Result<&mut dyn WarehouseClient> {
        let conn = self
            .current
            .and_then(|i| self.connections.get_mut(i))
            .filter(|c| !c.client.is_closed())
            .ok_or_else(|| BatchError::connection("Not logged on to the warehouse"))?;
        Ok(conn.client.as_mut())
    }

    /// Tag of the current session.
    pub fn current_tag(&self) -> Option<&str> {
        self.current
            .and_then(|i| self.connections.get(i))
            .map(|c| c.tag.as_str())
    }

    pub fn is_connected(&self) -> bool {
        self.current
            .and_then(|i| self.connections.get(i))
            .is_some_and(|c| !c.client.is_closed())
    }

    /// Number of sessions still open.
    pub fn open_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|c| !c.client.is_closed())
            .count()
    }

    /// Closes one session. Closing a closed or unknown session is a no-op.
    pub async fn close(&mut self, index: usize) -> Result<()> {
        match self.connections.get_mut(index) {
            Some(conn) if !conn.client.is_closed() => {
                conn.client.close().await?;
                info!("Closed connection {}", conn.tag);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Closes every open session. Failures are logged and the rest still
    /// closed.
    pub async fn close_all(&mut self) {
        for index in 0..self.connections.len() {
            if let Err(e) = self.close(index).await {
                warn!("Failed to close connection {index}: {e}");
            }
        }
        self.current = None;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let open = self.open_count();
        if open > 0 {
            warn!("{open} connection(s) still open at shutdown; dropping them");
        }
    }
}
