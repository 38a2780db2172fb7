use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use gigconnect::config;
use gigconnect::models::{Role, UserContext, UserId};

pub const USER_ID_ENV: &str = "GIGCONNECT_USER_ID";
pub const USER_NAME_ENV: &str = "GIGCONNECT_USER_NAME";
pub const ROLE_ENV: &str = "GIGCONNECT_ROLE";
pub const TOKEN_ENV: &str = "GIGCONNECT_TOKEN";

/// The signed-in user as stored on disk. The token is base64 encoded so it
/// is not readable at a glance.
#[derive(Serialize, Deserialize, Clone)]
pub struct SavedLogin {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    token: String,
}

impl SavedLogin {
    pub fn new(user: &UserContext) -> Self {
        SavedLogin {
            id: user.id.clone(),
            name: user.name.clone(),
            role: user.role,
            token: BASE64.encode(&user.token),
        }
    }

    pub fn into_user(self) -> Result<UserContext> {
        let token = BASE64
            .decode(&self.token)
            .map_err(|e| anyhow!("Saved token is not valid base64: {}", e))?;
        let token = String::from_utf8(token).context("Saved token is not UTF-8")?;
        Ok(UserContext {
            id: self.id,
            name: self.name,
            role: self.role,
            token,
        })
    }
}

fn login_path() -> Result<PathBuf> {
    Ok(config::config_dir()?.join("login.json"))
}

pub fn save_login(user: &UserContext) -> Result<()> {
    save_login_to(&login_path()?, user)
}

pub fn save_login_to(path: &Path, user: &UserContext) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, &SavedLogin::new(user))?;
    info!("Login saved for user {}", user.id);
    Ok(())
}

pub fn load_login() -> Result<Option<UserContext>> {
    load_login_from(&login_path()?)
}

/// Read the saved login. A corrupt file is removed and treated as signed out.
pub fn load_login_from(path: &Path) -> Result<Option<UserContext>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let parsed = serde_json::from_str::<SavedLogin>(&contents)
        .map_err(anyhow::Error::from)
        .and_then(SavedLogin::into_user);

    match parsed {
        Ok(user) => {
            info!("Loaded saved login for user {} from {}", user.id, path.display());
            Ok(Some(user))
        }
        Err(e) => {
            warn!("Discarding corrupt login file {}: {}", path.display(), e);
            fs::remove_file(path).with_context(|| format!("Removing {}", path.display()))?;
            Ok(None)
        }
    }
}

pub fn remove_login() -> Result<bool> {
    remove_login_at(&login_path()?)
}

pub fn remove_login_at(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path).with_context(|| format!("Removing {}", path.display()))?;
    info!("Saved login removed");
    Ok(true)
}

/// User context from `GIGCONNECT_*` variables, when id and token are both set.
pub fn login_from_env<F>(lookup: F) -> Result<Option<UserContext>>
where
    F: Fn(&str) -> Option<String>,
{
    let (id, token) = match (lookup(USER_ID_ENV), lookup(TOKEN_ENV)) {
        (Some(id), Some(token)) => (id, token),
        _ => return Ok(None),
    };
    let role = match lookup(ROLE_ENV) {
        Some(role) => role.parse::<Role>().map_err(|e| anyhow!(e))?,
        None => Role::Client,
    };
    let name = lookup(USER_NAME_ENV).unwrap_or_else(|| format!("User {}", id));

    Ok(Some(UserContext {
        id: UserId::from(id),
        name,
        role,
        token,
    }))
}

/// Environment first, then the saved file.
pub fn current_user() -> Result<Option<UserContext>> {
    if let Some(user) = login_from_env(|key| std::env::var(key).ok())? {
        info!("Using login from environment for user {}", user.id);
        return Ok(Some(user));
    }
    load_login()
}
