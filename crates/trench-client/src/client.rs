use async_trait::async_trait;

use trench_types::{Result, Torrent};

// ---------------------------------------------------------------------------
// TorrentClient
// ---------------------------------------------------------------------------

/// The capability a trench run needs from a torrent client backend.
///
/// Every verb addresses a single torrent by the `id` reported in
/// [`Torrent::id`]. Verbs fail with [`trench_types::TrenchError::Action`];
/// listing fails with `Client` or `Auth`.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Opaque identity used in logs, typically the endpoint URL.
    fn identity(&self) -> &str;

    async fn login(&self) -> Result<()>;
    async fn list_torrents(&self) -> Result<Vec<Torrent>>;

    async fn pause(&self, id: &str) -> Result<()>;
    async fn resume(&self, id: &str) -> Result<()>;
    async fn recheck(&self, id: &str) -> Result<()>;
    async fn reannounce(&self, id: &str) -> Result<()>;

    async fn increase_priority(&self, id: &str) -> Result<()>;
    async fn decrease_priority(&self, id: &str) -> Result<()>;
    async fn maximise_priority(&self, id: &str) -> Result<()>;
    async fn minimise_priority(&self, id: &str) -> Result<()>;

    async fn delete(&self, id: &str, delete_files: bool) -> Result<()>;
}
