//! Torrent client capability trait and the qBittorrent WebAPI adapter.
//!
//! Provides the `TorrentClient` trait consumed by the trench runner, the
//! `QbitClient` implementation, and `ClientManager` which builds clients from
//! the `connections` section of the config.

mod client;
mod manager;
mod qbit;

pub use client::TorrentClient;
pub use manager::{ClientKind, ClientManager, Connection};
pub use qbit::QbitClient;
