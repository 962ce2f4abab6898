use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::auth::SessionStore;
use crate::config::AppConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Token returned by `auth.login`.
    #[serde(default)]
    pub session: Option<String>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: AppConfig,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new() -> Self {
        let config = AppConfig::default();
        let sessions = SessionStore::new(config.session_ttl_secs);
        AppState {
            workspace: None,
            db: None,
            config,
            sessions,
        }
    }

    pub fn upload_dir(&self) -> Option<PathBuf> {
        self.workspace
            .as_ref()
            .map(|ws| self.config.upload_path(ws))
    }
}
