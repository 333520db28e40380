//! Connection settings from a TOML file and the environment.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::connection::{Connection, Credential, DEFAULT_TIMEOUT_SECS};
use crate::error::{PlexError, Result};
use crate::paginate::DEFAULT_PAGE_SIZE;

/// Settings needed to open a session against one Plex server.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlexConfig {
    pub server_url: String,
    pub token: String,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
    pub page_size: usize,
}

impl Default for PlexConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:32400".to_string(),
            token: String::new(),
            username: String::new(),
            password: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl fmt::Debug for PlexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlexConfig")
            .field("server_url", &self.server_url)
            .field("token", &redacted(&self.token))
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("timeout_secs", &self.timeout_secs)
            .field("page_size", &self.page_size)
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl PlexConfig {
    /// Load `path` if given, then apply `PLEX_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PlexError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| PlexError::Config(format!("invalid config in {}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PlexError::Config(format!("invalid config: {e}")))
    }

    /// Override fields from variables resolved by `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PLEX_URL") {
            self.server_url = url;
        }
        if let Some(token) = lookup("PLEX_TOKEN") {
            self.token = token;
        }
        if let Some(username) = lookup("PLEX_USERNAME") {
            self.username = username;
        }
        if let Some(password) = lookup("PLEX_PASSWORD") {
            self.password = password;
        }
        if let Some(timeout) = lookup("PLEX_TIMEOUT_SECS") {
            self.timeout_secs = timeout
                .trim()
                .parse()
                .map_err(|_| PlexError::Config(format!("PLEX_TIMEOUT_SECS is not a number: {timeout}")))?;
        }
        if let Some(size) = lookup("PLEX_PAGE_SIZE") {
            self.page_size = size
                .trim()
                .parse()
                .map_err(|_| PlexError::Config(format!("PLEX_PAGE_SIZE is not a number: {size}")))?;
        }
        Ok(())
    }

    pub fn credential(&self) -> Credential {
        Credential::new(self.username.clone(), self.password.clone())
    }

    /// Build a validated connection from these settings.
    pub fn into_connection(self) -> Result<Connection> {
        if self.page_size == 0 {
            return Err(PlexError::Config("page_size must be at least 1".to_string()));
        }
        Ok(Connection::new(self.credential(), &self.server_url, &self.token)?
            .with_timeout(self.timeout_secs))
    }
}
