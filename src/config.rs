use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "rosterd.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Staging directory for uploads, relative to the workspace unless absolute.
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub session_ttl_secs: u64,
    pub allowed_extensions: Vec<String>,
    pub default_admin_username: String,
    pub default_admin_password: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 16 * 1024 * 1024,
            session_ttl_secs: 3600,
            allowed_extensions: vec!["xlsx".to_string(), "xls".to_string()],
            default_admin_username: "admin".to_string(),
            default_admin_password: "admin123".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then `<workspace>/rosterd.toml` if present, then `ROSTERD_*`
    /// environment variables.
    pub fn load(workspace: &Path) -> anyhow::Result<Self> {
        let path = workspace.join(CONFIG_FILE_NAME);
        let mut cfg = if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("read {}", path.display()))?;
            toml::from_str::<AppConfig>(&text)
                .with_context(|| format!("parse {}", path.display()))?
        } else {
            AppConfig::default()
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = lookup("ROSTERD_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROSTERD_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = v
                .trim()
                .parse()
                .with_context(|| format!("ROSTERD_MAX_UPLOAD_BYTES={}", v))?;
        }
        if let Some(v) = lookup("ROSTERD_SESSION_TTL_SECS") {
            self.session_ttl_secs = v
                .trim()
                .parse()
                .with_context(|| format!("ROSTERD_SESSION_TTL_SECS={}", v))?;
        }
        if let Some(v) = lookup("ROSTERD_ADMIN_USERNAME") {
            self.default_admin_username = v;
        }
        if let Some(v) = lookup("ROSTERD_ADMIN_PASSWORD") {
            self.default_admin_password = v;
        }
        Ok(())
    }

    pub fn upload_path(&self, workspace: &Path) -> PathBuf {
        if self.upload_dir.is_absolute() {
            self.upload_dir.clone()
        } else {
            workspace.join(&self.upload_dir)
        }
    }
}
