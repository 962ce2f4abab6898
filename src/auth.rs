use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::config::AppConfig;
use crate::db::now_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Officer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Officer => "officer",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "officer" => Some(Role::Officer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Inserts a user with a fresh salt. Returns `None` when the name is taken.
pub fn create_user(
    conn: &Connection,
    username: &str,
    password: &str,
    role: Role,
) -> anyhow::Result<Option<User>> {
    let taken = conn
        .query_row("SELECT 1 FROM users WHERE username = ?", [username], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some();
    if taken {
        return Ok(None);
    }
    let salt = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(username, password_hash, salt, role, created_at) VALUES(?, ?, ?, ?, ?)",
        (
            username,
            hash_password(&salt, password),
            &salt,
            role.as_str(),
            now_timestamp(),
        ),
    )
    .context("insert user")?;
    Ok(Some(User {
        id: conn.last_insert_rowid(),
        username: username.to_string(),
        role,
    }))
}

/// Seeds the configured administrator account if no user has that name yet.
pub fn ensure_default_admin(conn: &Connection, cfg: &AppConfig) -> anyhow::Result<bool> {
    let created = create_user(
        conn,
        &cfg.default_admin_username,
        &cfg.default_admin_password,
        Role::Admin,
    )?;
    if created.is_some() {
        tracing::info!(username = %cfg.default_admin_username, "default admin user created");
    }
    Ok(created.is_some())
}

pub fn authenticate(
    conn: &Connection,
    username: &str,
    password: &str,
) -> anyhow::Result<Option<User>> {
    let row = conn
        .query_row(
            "SELECT id, password_hash, salt, role FROM users WHERE username = ?",
            [username],
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            },
        )
        .optional()
        .context("look up user")?;
    let Some((id, hash, salt, role)) = row else {
        return Ok(None);
    };
    if hash_password(&salt, password) != hash {
        return Ok(None);
    }
    let Some(role) = Role::parse(&role) else {
        anyhow::bail!("user {} has unknown role {}", username, role);
    };
    Ok(Some(User {
        id,
        username: username.to_string(),
        role,
    }))
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: HashMap<String, Session>,
}

const MAX_TTL_SECS: u64 = 366 * 24 * 3600;

fn ttl(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

impl SessionStore {
    pub fn new(ttl_secs: u64) -> Self {
        SessionStore {
            ttl: ttl(ttl_secs),
            sessions: HashMap::new(),
        }
    }

    pub fn set_ttl(&mut self, ttl_secs: u64) {
        self.ttl = ttl(ttl_secs);
    }

    pub fn open(&mut self, user: User, now: DateTime<Utc>) -> (String, Session) {
        let token = uuid::Uuid::new_v4().to_string();
        let session = Session {
            user,
            expires_at: now + self.ttl,
        };
        self.sessions.insert(token.clone(), session.clone());
        (token, session)
    }

    /// Returns the session's user; expired sessions are dropped.
    pub fn resolve(&mut self, token: &str, now: DateTime<Utc>) -> Result<User, AuthError> {
        let Some(session) = self.sessions.get(token) else {
            return Err(AuthError::Unauthorized("login required"));
        };
        if session.expires_at <= now {
            self.sessions.remove(token);
            return Err(AuthError::Unauthorized(
                "session expired, please log in again",
            ));
        }
        Ok(session.user.clone())
    }

    pub fn close(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Login,
    Admin,
}

/// Access level per method; `None` for methods the router does not know.
///
/// Opening the first workspace is public so the default admin can be seeded.
/// Once one is open, switching workspaces drops every session, so it takes an
/// admin.
pub fn access_for(method: &str, workspace_open: bool) -> Option<Access> {
    let access = match method {
        "workspace.select" if workspace_open => Access::Admin,
        "health" | "workspace.select" | "auth.login" => Access::Public,
        "auth.register" | "data.clearAll" => Access::Admin,
        "auth.logout"
        | "auth.whoami"
        | "students.upload.preview"
        | "students.upload.confirm"
        | "students.list"
        | "students.get"
        | "attendance.upload.preview"
        | "attendance.upload.confirm"
        | "attendance.list"
        | "attendance.forStudent"
        | "search.ticket"
        | "analytics.overview"
        | "analytics.month"
        | "analytics.stats"
        | "analytics.student"
        | "dashboard.summary" => Access::Login,
        _ => return None,
    };
    Some(access)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    Unauthorized(&'static str),
    Forbidden,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Unauthorized(_) => "unauthorized",
            AuthError::Forbidden => "forbidden",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthError::Unauthorized(m) => *m,
            AuthError::Forbidden => "Access denied. Insufficient permissions.",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub level: &'static str,
    pub message: String,
}

/// Per-request view of who is calling, plus notices to hand back.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<User>,
    pub session: Option<String>,
    pub notices: Vec<Notice>,
}

impl RequestContext {
    pub fn notice(&mut self, level: &'static str, message: impl Into<String>) {
        self.notices.push(Notice {
            level,
            message: message.into(),
        });
    }
}

pub fn authorize(
    sessions: &mut SessionStore,
    method: &str,
    token: Option<&str>,
    workspace_open: bool,
    now: DateTime<Utc>,
) -> Result<RequestContext, AuthError> {
    let access = access_for(method, workspace_open).unwrap_or(Access::Public);
    let user = match token {
        Some(t) => match sessions.resolve(t, now) {
            Ok(u) => Some(u),
            Err(e) if access != Access::Public => return Err(e),
            Err(_) => None,
        },
        None => None,
    };
    match (access, &user) {
        (Access::Public, _) => {}
        (_, None) => return Err(AuthError::Unauthorized("login required")),
        (Access::Admin, Some(u)) if u.role != Role::Admin => return Err(AuthError::Forbidden),
        _ => {}
    }
    Ok(RequestContext {
        session: user.as_ref().and(token.map(|t| t.to_string())),
        user,
        notices: Vec::new(),
    })
}
