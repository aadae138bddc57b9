//! Per-user state carried from one command to the next.
//!
//! Nothing here is global: commands receive a [`SessionState`], may change
//! it, and the caller persists it.
use crate::config::Config;
use crate::report::Window;
use anyhow::{Context, Error, Result, anyhow, bail};
use async_std::fs;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// May change the ledger and materials.
    Admin,
    /// May list, report and export.
    Viewer,
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "viewer" => Ok(Role::Viewer),
            _ => Err(anyhow!("Not a role: '{}'", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

/// A worksheet whose row ids shift when a row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sheet {
    Ledger,
    Materials,
}

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).context("Failed to hash password")
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub user: Option<String>,
    /// Last window used for a settlement report.
    pub window: Option<Window>,
    /// Set after a delete: row ids shown earlier may now point at other rows.
    #[serde(default)]
    pub needs_reload: bool,
    /// Same as `needs_reload`, for the materials sheet.
    #[serde(default)]
    pub materials_need_reload: bool,
}

impl SessionState {
    /// Reads the session file; no file means a fresh session.
    pub async fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path).await {
            Ok(doc) => serde_json::from_str(&doc)
                .with_context(|| format!("Failed to read session {}", path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(SessionState::default()),
            Err(err) => Err(err).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let doc = serde_json::to_string_pretty(self)?;
        fs::write(path, doc)
            .await
            .with_context(|| format!("Failed to write session {}", path.display()))
    }

    /// Checks `password` against the user's hash and starts a session for them.
    pub fn log_in(&mut self, config: &Config, name: &str, password: &str) -> Result<Role> {
        let user = config.user(name).context("Wrong user name or password")?;
        let matches = bcrypt::verify(password, &user.password_hash)
            .with_context(|| format!("Invalid password hash for user {} in config", user.name))?;
        if !matches {
            bail!("Wrong user name or password");
        }
        *self = SessionState {
            user: Some(user.name.clone()),
            ..SessionState::default()
        };
        tracing::info!("{} logged in as {}", user.name, user.role);
        Ok(user.role)
    }

    pub fn log_out(&mut self) {
        *self = SessionState::default();
    }

    /// Role of the session's user. Everyone is admin when auth is off.
    pub fn role(&self, config: &Config) -> Option<Role> {
        if !config.auth_enabled() {
            return Some(Role::Admin);
        }
        self.user
            .as_deref()
            .and_then(|name| config.user(name))
            .map(|user| user.role)
    }

    pub fn require_reader(&self, config: &Config) -> Result<Role> {
        self.role(config).context("Log in first")
    }

    pub fn require_admin(&self, config: &Config) -> Result<()> {
        match self.require_reader(config)? {
            Role::Admin => Ok(()),
            Role::Viewer => bail!("Only admins can change data"),
        }
    }

    fn reload_flag(&mut self, sheet: Sheet) -> &mut bool {
        match sheet {
            Sheet::Ledger => &mut self.needs_reload,
            Sheet::Materials => &mut self.materials_need_reload,
        }
    }

    /// Refuses id-based edits until `sheet` has been listed again.
    pub fn require_fresh_ids(&self, sheet: Sheet) -> Result<()> {
        let (stale, listing) = match sheet {
            Sheet::Ledger => (self.needs_reload, "list"),
            Sheet::Materials => (self.materials_need_reload, "material list"),
        };
        if stale {
            bail!("Rows were renumbered by a delete; run {} again before editing by id", listing);
        }
        Ok(())
    }

    pub fn mark_deleted(&mut self, sheet: Sheet) {
        *self.reload_flag(sheet) = true;
    }

    pub fn mark_reloaded(&mut self, sheet: Sheet) {
        *self.reload_flag(sheet) = false;
    }
}
