use std::sync::Arc;

use serde::{Deserialize, Serialize};

use trench_types::Result;

use crate::{QbitClient, TorrentClient};

/// Supported client backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Qbit,
}

/// One entry of the `connections` config array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Connection {
    pub client: ClientKind,
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Connection {
    /// Returns a message when `url` is not an absolute http(s) URL.
    pub fn url_problem(&self) -> Option<String> {
        match reqwest::Url::parse(&self.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => None,
            Ok(url) => Some(format!("Unsupported URL scheme '{}'", url.scheme())),
            Err(e) => Some(format!("Invalid url: {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// ClientManager
// ---------------------------------------------------------------------------

/// Owns every configured client. Built once at startup and shared read-only.
#[derive(Clone)]
pub struct ClientManager {
    clients: Vec<Arc<dyn TorrentClient>>,
}

impl ClientManager {
    pub fn new(clients: Vec<Arc<dyn TorrentClient>>) -> Self {
        Self { clients }
    }

    /// Build one client per connection.
    pub fn from_connections(connections: &[Connection]) -> Result<Self> {
        let mut clients: Vec<Arc<dyn TorrentClient>> = Vec::with_capacity(connections.len());
        for connection in connections {
            match connection.client {
                ClientKind::Qbit => clients.push(Arc::new(QbitClient::new(
                    &connection.url,
                    connection.username.clone(),
                    connection.password.clone(),
                )?)),
            }
        }

        let qbit_count = connections
            .iter()
            .filter(|c| c.client == ClientKind::Qbit)
            .count();
        tracing::info!("Detected {qbit_count} qBittorrent client connections");

        Ok(Self { clients })
    }

    pub fn clients(&self) -> &[Arc<dyn TorrentClient>] {
        &self.clients
    }

    /// Log in to every client in turn, failing on the first that refuses.
    pub async fn test_connections(&self) -> Result<()> {
        tracing::debug!("Testing client connections");
        for client in &self.clients {
            if let Err(e) = client.login().await {
                tracing::error!(client = client.identity(), "Unable to login to client: {e}");
                return Err(e);
            }
        }
        tracing::debug!("All clients connected successfully");
        Ok(())
    }
}
