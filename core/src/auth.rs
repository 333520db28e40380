//! Token derivation from stored credentials.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::connection::{Credential, PRODUCT_NAME};
use crate::error::{PlexError, Result};

pub const PLEX_TV_SIGN_IN_URL: &str = "https://plex.tv/users/sign_in.json";

const SIGN_IN_TIMEOUT: Duration = Duration::from_secs(15);

/// Exchanges a credential for a fresh auth token.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn sign_in(&self, credential: &Credential) -> Result<String>;
}

/// Signs in against plex.tv (or a compatible endpoint) with HTTP basic auth.
#[derive(Debug, Clone)]
pub struct PlexTvAuthenticator {
    http: Client,
    url: String,
    client_identifier: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct SignInResponse {
    user: SignInUser,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInUser {
    auth_token: String,
}

impl PlexTvAuthenticator {
    pub fn new(client_identifier: impl Into<String>) -> Result<Self> {
        Self::with_url(PLEX_TV_SIGN_IN_URL, client_identifier)
    }

    /// Sign in against a different endpoint, e.g. a local mock.
    pub fn with_url(url: impl Into<String>, client_identifier: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(SIGN_IN_TIMEOUT)
            .build()
            .map_err(|e| PlexError::Config(format!("could not build sign-in HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            client_identifier: client_identifier.into(),
            timeout: SIGN_IN_TIMEOUT,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Upper bound on one sign-in round trip.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Authenticator for PlexTvAuthenticator {
    async fn sign_in(&self, credential: &Credential) -> Result<String> {
        let response = self
            .http
            .post(&self.url)
            .basic_auth(credential.username(), Some(credential.password()))
            .header("X-Plex-Client-Identifier", &self.client_identifier)
            .header("X-Plex-Product", PRODUCT_NAME)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| PlexError::Authentication(format!("sign-in request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlexError::Authentication(format!(
                "sign-in rejected with HTTP {}",
                status.as_u16()
            )));
        }

        let body: SignInResponse = response
            .json()
            .await
            .map_err(|e| PlexError::Authentication(format!("unexpected sign-in response: {e}")))?;
        if body.user.auth_token.is_empty() {
            return Err(PlexError::Authentication(
                "sign-in response carried no token".to_string(),
            ));
        }
        Ok(body.user.auth_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;

    struct FixedToken(&'static str);

    #[async_trait]
    impl Authenticator for FixedToken {
        async fn sign_in(&self, _credential: &Credential) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Rejecting;

    #[async_trait]
    impl Authenticator for Rejecting {
        async fn sign_in(&self, credential: &Credential) -> Result<String> {
            Err(PlexError::Authentication(format!(
                "no account for {}",
                credential.username()
            )))
        }
    }

    fn connection() -> Connection {
        Connection::new(Credential::new("alice", "pw"), "http://h/", "old").unwrap()
    }

    #[tokio::test]
    async fn refresh_replaces_only_the_token() {
        let mut conn = connection();
        let headers = conn.headers();
        let token = conn.refresh_token(&FixedToken("new")).await.unwrap();
        assert_eq!(token, "new");
        assert_eq!(conn.token(), "new");
        assert_eq!(conn.server_url(), "http://h");
        assert_eq!(conn.headers(), headers);
        assert_eq!(conn.credential().username(), "alice");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_old_token() {
        let mut conn = connection();
        let err = conn.refresh_token(&Rejecting).await.unwrap_err();
        assert!(matches!(err, PlexError::Authentication(_)));
        assert_eq!(conn.token(), "old");
    }

    #[tokio::test]
    async fn empty_token_from_authenticator_is_rejected() {
        let mut conn = connection();
        let err = conn.refresh_token(&FixedToken("")).await.unwrap_err();
        assert!(matches!(err, PlexError::Authentication(_)));
        assert_eq!(conn.token(), "old");
    }

    #[test]
    fn default_url_is_plex_tv() {
        let auth = PlexTvAuthenticator::new("id").unwrap();
        assert_eq!(auth.url(), PLEX_TV_SIGN_IN_URL);
        assert_eq!(auth.timeout(), SIGN_IN_TIMEOUT);
    }

    #[test]
    fn custom_url_keeps_sign_in_timeout() {
        let auth = PlexTvAuthenticator::with_url("http://127.0.0.1:9/users/sign_in.json", "id").unwrap();
        assert_eq!(auth.url(), "http://127.0.0.1:9/users/sign_in.json");
        assert_eq!(auth.timeout(), Duration::from_secs(15));
    }
}
