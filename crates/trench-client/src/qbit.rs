use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};

use trench_types::{Result, Torrent, TrenchError};

use crate::TorrentClient;

// ---------------------------------------------------------------------------
// QbitClient
// ---------------------------------------------------------------------------

/// qBittorrent WebAPI v2 adapter.
///
/// The session cookie lives in reqwest's cookie store. Login happens lazily
/// before the first request and again after the server answers 403.
#[derive(Debug)]
pub struct QbitClient {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    logged_in: AtomicBool,
    login_gate: tokio::sync::Mutex<()>,
}

/// A torrent command endpoint. qBittorrent 5 renamed `pause`/`resume` to
/// `stop`/`start`; `fallback` is tried when the primary answers 404.
struct Command {
    action: &'static str,
    endpoint: &'static str,
    fallback: Option<&'static str>,
}

const PAUSE: Command = Command { action: "pause", endpoint: "torrents/pause", fallback: Some("torrents/stop") };
const RESUME: Command = Command { action: "resume", endpoint: "torrents/resume", fallback: Some("torrents/start") };
const RECHECK: Command = Command { action: "recheck", endpoint: "torrents/recheck", fallback: None };
const REANNOUNCE: Command = Command { action: "reannounce", endpoint: "torrents/reannounce", fallback: None };
const INCREASE_PRIORITY: Command = Command { action: "increasePriority", endpoint: "torrents/increasePrio", fallback: None };
const DECREASE_PRIORITY: Command = Command { action: "decreasePriority", endpoint: "torrents/decreasePrio", fallback: None };
const MAXIMISE_PRIORITY: Command = Command { action: "maximisePriority", endpoint: "torrents/topPrio", fallback: None };
const MINIMISE_PRIORITY: Command = Command { action: "minimisePriority", endpoint: "torrents/bottomPrio", fallback: None };
const DELETE: Command = Command { action: "delete", endpoint: "torrents/delete", fallback: None };

impl QbitClient {
    pub fn new(base_url: &str, username: Option<String>, password: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| TrenchError::Client {
                client: base_url.to_string(),
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            logged_in: AtomicBool::new(false),
            login_gate: tokio::sync::Mutex::new(()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.base_url, path)
    }

    fn transport_error(&self, e: reqwest::Error) -> TrenchError {
        TrenchError::Client {
            client: self.base_url.clone(),
            message: e.to_string(),
        }
    }

    async fn ensure_login(&self) -> Result<()> {
        if self.logged_in.load(Ordering::Acquire) {
            return Ok(());
        }
        let _gate = self.login_gate.lock().await;
        // Another run may have logged in while we waited.
        if self.logged_in.load(Ordering::Acquire) {
            return Ok(());
        }
        self.login().await
    }

    async fn run_command(&self, command: &Command, id: &str, extra: &[(&str, &str)]) -> Result<()> {
        let action_error = |message: String| TrenchError::Action {
            client: self.base_url.clone(),
            action: command.action.to_string(),
            torrent_id: id.to_string(),
            message,
        };

        self.ensure_login().await.map_err(|e| action_error(e.to_string()))?;

        let mut form: Vec<(&str, &str)> = vec![("hashes", id)];
        form.extend_from_slice(extra);

        let mut status = self
            .post_form(command.endpoint, &form)
            .await
            .map_err(|e| action_error(e.to_string()))?;

        if status == StatusCode::NOT_FOUND {
            if let Some(fallback) = command.fallback {
                tracing::debug!(endpoint = command.endpoint, fallback, "Endpoint missing, trying fallback");
                status = self
                    .post_form(fallback, &form)
                    .await
                    .map_err(|e| action_error(e.to_string()))?;
            }
        }

        if status == StatusCode::FORBIDDEN {
            self.logged_in.store(false, Ordering::Release);
        }
        if !status.is_success() {
            return Err(action_error(format!("HTTP {status}")));
        }
        Ok(())
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> std::result::Result<StatusCode, reqwest::Error> {
        let resp = self.http.post(self.endpoint(path)).form(form).send().await?;
        Ok(resp.status())
    }
}

#[async_trait]
impl TorrentClient for QbitClient {
    fn identity(&self) -> &str {
        &self.base_url
    }

    async fn login(&self) -> Result<()> {
        let form = [
            ("username", self.username.as_deref().unwrap_or_default()),
            ("password", self.password.as_deref().unwrap_or_default()),
        ];
        let resp = self
            .http
            .post(self.endpoint("auth/login"))
            .form(&form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;

        if status != StatusCode::FORBIDDEN && !status.is_success() {
            return Err(TrenchError::Client {
                client: self.base_url.clone(),
                message: format!("Login returned HTTP {status}"),
            });
        }
        // qBittorrent answers 200 with "Fails." for bad credentials and 403 once banned.
        if status == StatusCode::FORBIDDEN || body.trim() != "Ok." {
            self.logged_in.store(false, Ordering::Release);
            return Err(TrenchError::Auth {
                client: self.base_url.clone(),
            });
        }

        self.logged_in.store(true, Ordering::Release);
        tracing::debug!(client = %self.base_url, "Logged in to qBittorrent");
        Ok(())
    }

    async fn list_torrents(&self) -> Result<Vec<Torrent>> {
        self.ensure_login().await?;

        let resp = self
            .http
            .get(self.endpoint("torrents/info"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if status == StatusCode::FORBIDDEN {
            self.logged_in.store(false, Ordering::Release);
            return Err(TrenchError::Auth {
                client: self.base_url.clone(),
            });
        }
        if !status.is_success() {
            return Err(TrenchError::Client {
                client: self.base_url.clone(),
                message: format!("Listing torrents returned HTTP {status}"),
            });
        }

        let raw: Vec<Map<String, Value>> = resp.json().await.map_err(|e| TrenchError::Client {
            client: self.base_url.clone(),
            message: format!("Failed to parse torrent list: {e}"),
        })?;

        raw.into_iter()
            .map(|entry| {
                normalize_torrent(entry).map_err(|message| TrenchError::Client {
                    client: self.base_url.clone(),
                    message,
                })
            })
            .collect()
    }

    async fn pause(&self, id: &str) -> Result<()> {
        self.run_command(&PAUSE, id, &[]).await
    }

    async fn resume(&self, id: &str) -> Result<()> {
        self.run_command(&RESUME, id, &[]).await
    }

    async fn recheck(&self, id: &str) -> Result<()> {
        self.run_command(&RECHECK, id, &[]).await
    }

    async fn reannounce(&self, id: &str) -> Result<()> {
        self.run_command(&REANNOUNCE, id, &[]).await
    }

    async fn increase_priority(&self, id: &str) -> Result<()> {
        self.run_command(&INCREASE_PRIORITY, id, &[]).await
    }

    async fn decrease_priority(&self, id: &str) -> Result<()> {
        self.run_command(&DECREASE_PRIORITY, id, &[]).await
    }

    async fn maximise_priority(&self, id: &str) -> Result<()> {
        self.run_command(&MAXIMISE_PRIORITY, id, &[]).await
    }

    async fn minimise_priority(&self, id: &str) -> Result<()> {
        self.run_command(&MINIMISE_PRIORITY, id, &[]).await
    }

    async fn delete(&self, id: &str, delete_files: bool) -> Result<()> {
        let delete_files = if delete_files { "true" } else { "false" };
        self.run_command(&DELETE, id, &[("deleteFiles", delete_files)]).await
    }
}

// ---------------------------------------------------------------------------
// Normalisation (qBittorrent JSON → Torrent)
// ---------------------------------------------------------------------------

/// Convert one entry of `torrents/info` into a [`Torrent`].
///
/// Only `hash` is required. The full entry is kept as `raw`.
pub(crate) fn normalize_torrent(raw: Map<String, Value>) -> std::result::Result<Torrent, String> {
    let id = raw
        .get("hash")
        .and_then(Value::as_str)
        .ok_or_else(|| "Torrent entry has no hash".to_string())?
        .to_string();

    let string_field = |key: &str| raw.get(key).and_then(Value::as_str).map(String::from);
    let progress = raw.get("progress").and_then(Value::as_f64).unwrap_or(0.0);

    Ok(Torrent {
        name: string_field("name").unwrap_or_default(),
        label: string_field("category"),
        save_path: string_field("save_path"),
        progress,
        ratio: raw.get("ratio").and_then(Value::as_f64).unwrap_or(0.0),
        is_completed: progress >= 1.0,
        id,
        raw,
    })
}
