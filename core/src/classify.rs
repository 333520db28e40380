//! Advisory diagnosis of failed HTTP calls.
//!
//! Classification never changes control flow: the dispatcher still hands the
//! envelope back untouched and a transport error still propagates. The
//! diagnosis only adds an operator-readable log line.

use std::fmt;

use crate::error::PlexError;

/// Operator-readable explanation of a non-success status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnosis {
    Unauthorized,
    Forbidden { url: String },
    NotFound { url: String },
    ServerError { url: String },
    Unexpected { status: u16, url: String },
}

impl Diagnosis {
    pub fn status(&self) -> Option<u16> {
        match self {
            Diagnosis::Unauthorized => Some(401),
            Diagnosis::Forbidden { .. } => Some(403),
            Diagnosis::NotFound { .. } => Some(404),
            Diagnosis::ServerError { .. } => Some(500),
            Diagnosis::Unexpected { status, .. } => Some(*status),
        }
    }

    /// Emit the diagnosis as a warning.
    pub fn report(&self) {
        tracing::warn!(status = ?self.status(), "{self}");
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnosis::Unauthorized => {
                write!(f, "authentication failed: check that the Plex token is valid")
            }
            Diagnosis::Forbidden { url } => {
                write!(f, "permission denied: the token may not access {url}")
            }
            Diagnosis::NotFound { url } => write!(f, "resource not found: {url}"),
            Diagnosis::ServerError { url } => {
                write!(f, "Plex server error at {url}: try again later")
            }
            Diagnosis::Unexpected { status, url } => {
                write!(f, "unexpected HTTP error {status} from {url}")
            }
        }
    }
}

/// Diagnose `status` for a request to `url`; `None` when the status is not an error.
pub fn classify(status: u16, url: &str) -> Option<Diagnosis> {
    let url = url.to_string();
    match status {
        100..=399 => None,
        401 => Some(Diagnosis::Unauthorized),
        403 => Some(Diagnosis::Forbidden { url }),
        404 => Some(Diagnosis::NotFound { url }),
        500 => Some(Diagnosis::ServerError { url }),
        status => Some(Diagnosis::Unexpected { status, url }),
    }
}

/// Describe a caught error for an operator.
pub fn describe_error(err: &PlexError) -> String {
    match err {
        PlexError::Transport { url, source } if source.is_timeout() => {
            format!("request to {url} timed out: the server may be busy or unreachable")
        }
        PlexError::Transport { url, source } if source.is_connect() => {
            format!("could not connect to {url}: check the server address and that Plex is running")
        }
        PlexError::Status { diagnosis, .. } => diagnosis.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_redirect_are_not_diagnosed() {
        assert_eq!(classify(200, "/x"), None);
        assert_eq!(classify(204, "/x"), None);
        assert_eq!(classify(302, "/x"), None);
    }

    #[test]
    fn not_found_echoes_url() {
        let message = classify(404, "/library/999").unwrap().to_string();
        assert!(message.contains("not found"));
        assert!(message.contains("/library/999"));
    }

    #[test]
    fn unauthorized_mentions_token() {
        let diagnosis = classify(401, "/library/sections").unwrap();
        assert_eq!(diagnosis, Diagnosis::Unauthorized);
        assert!(diagnosis.to_string().contains("token"));
    }

    #[test]
    fn server_error_suggests_retry() {
        let message = classify(500, "/identity").unwrap().to_string();
        assert!(message.contains("try again later"));
    }

    #[test]
    fn other_statuses_are_unexpected() {
        let diagnosis = classify(418, "/teapot").unwrap();
        assert_eq!(diagnosis.status(), Some(418));
        assert_eq!(diagnosis.to_string(), "unexpected HTTP error 418 from /teapot");
        assert!(matches!(classify(502, "/x"), Some(Diagnosis::Unexpected { status: 502, .. })));
    }

    #[test]
    fn describe_passes_status_diagnosis_through() {
        let err = PlexError::Status {
            status: 403,
            diagnosis: Diagnosis::Forbidden {
                url: "/admin".to_string(),
            },
        };
        assert!(describe_error(&err).starts_with("permission denied"));
        let err = PlexError::Authentication("bad password".to_string());
        assert_eq!(describe_error(&err), "authentication failed: bad password");
    }
}
