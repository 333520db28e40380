//! Session state for a single Plex server.
//!
//! # Design
//! `Connection` holds the server URL, the auth token, the credential the
//! token was derived from, and the default headers every request carries. It
//! never performs I/O. The header map is only ever handed out as a clone so
//! callers cannot mutate the defaults other requests rely on.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::auth::Authenticator;
use crate::error::{PlexError, Result};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const PRODUCT_NAME: &str = "plex-core";

/// Username/password pair used to (re)derive a token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_empty(&self) -> bool {
        self.username.trim().is_empty() || self.password.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authentication state and default headers for one server session.
#[derive(Debug, Clone)]
pub struct Connection {
    server_url: String,
    token: String,
    credential: Credential,
    headers: BTreeMap<String, String>,
    timeout_secs: u64,
}

impl Connection {
    /// Validate inputs and build a connection with the default header set.
    ///
    /// Fails with `InvalidArgument` if the credential or token is empty.
    pub fn new(credential: Credential, server_url: &str, token: &str) -> Result<Self> {
        if credential.is_empty() {
            return Err(PlexError::InvalidArgument(
                "credential must have a username and password".to_string(),
            ));
        }
        if token.trim().is_empty() {
            return Err(PlexError::InvalidArgument("token must not be empty".to_string()));
        }
        let trimmed = server_url.trim();
        if trimmed.is_empty() {
            return Err(PlexError::InvalidArgument("server url must not be empty".to_string()));
        }
        let server_url = trimmed.strip_suffix('/').unwrap_or(trimmed).to_string();

        Ok(Self {
            server_url,
            token: token.to_string(),
            credential,
            headers: default_headers(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// A fresh copy of the default headers.
    pub fn headers(&self) -> BTreeMap<String, String> {
        self.headers.clone()
    }

    /// Identifier this session presents to the server.
    pub fn client_identifier(&self) -> &str {
        self.headers
            .get("X-Plex-Client-Identifier")
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Re-derive the token from the stored credential and store it.
    ///
    /// Only the token changes; headers, URL and credential stay as they were.
    pub async fn refresh_token(&mut self, authenticator: &dyn Authenticator) -> Result<String> {
        let token = authenticator.sign_in(&self.credential).await?;
        if token.trim().is_empty() {
            return Err(PlexError::Authentication(
                "sign-in returned an empty token".to_string(),
            ));
        }
        tracing::debug!(server = %self.server_url, "token refreshed");
        self.token = token.clone();
        Ok(token)
    }
}

fn default_headers() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("X-Plex-Platform".to_string(), std::env::consts::OS.to_string());
    headers.insert(
        "X-Plex-Platform-Version".to_string(),
        std::env::consts::ARCH.to_string(),
    );
    headers.insert("X-Plex-Provides".to_string(), "controller".to_string());
    headers.insert("X-Plex-Product".to_string(), PRODUCT_NAME.to_string());
    headers.insert(
        "X-Plex-Version".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    headers.insert("X-Plex-Device-Name".to_string(), PRODUCT_NAME.to_string());
    headers.insert(
        "X-Plex-Client-Identifier".to_string(),
        Uuid::new_v4().to_string(),
    );
    headers
}
