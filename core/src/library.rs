//! Typed Plex library operations built on the dispatcher and paginator.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::classify::{classify, Diagnosis};
use crate::client::PlexClient;
use crate::error::{PlexError, Result};
use crate::http::{encode_path_segment, Envelope, Format, PlexRequest};
use crate::paginate::DEFAULT_PAGE_SIZE;
use crate::types::{Identity, LibrarySection, MediaItem};

impl PlexClient {
    /// `GET /identity`.
    pub async fn server_identity(&self) -> Result<Identity> {
        let envelope = self.send(PlexRequest::get("identity")).await?;
        let envelope = require_success(envelope)?;
        let container = envelope
            .content()
            .get("MediaContainer")
            .cloned()
            .unwrap_or(Value::Null);
        serde_json::from_value(container).map_err(|e| PlexError::Decode {
            format: Format::Json,
            message: e.to_string(),
        })
    }

    /// Every library section on the server.
    pub async fn library_sections(&self) -> Result<Vec<LibrarySection>> {
        let items = self
            .paginate(PlexRequest::get("library/sections"), DEFAULT_PAGE_SIZE)
            .await?;
        decode_items(items)
    }

    /// Every item in one section, fetched `page_size` at a time.
    pub async fn section_items(&self, section_key: &str, page_size: usize) -> Result<Vec<MediaItem>> {
        let endpoint = section_endpoint(section_key, "all")?;
        let items = self.paginate(PlexRequest::get(endpoint), page_size).await?;
        decode_items(items)
    }

    /// Ask the server to rescan one section.
    pub async fn refresh_section(&self, section_key: &str) -> Result<()> {
        let endpoint = section_endpoint(section_key, "refresh")?;
        let envelope = self.send(PlexRequest::get(endpoint)).await?;
        require_success(envelope)?;
        tracing::info!(section = section_key, "library refresh requested");
        Ok(())
    }
}

fn section_endpoint(section_key: &str, action: &str) -> Result<String> {
    Ok(format!("library/sections/{}/{action}", encode_path_segment(section_key)?))
}

fn require_success(envelope: Envelope) -> Result<Envelope> {
    if envelope.is_success() {
        return Ok(envelope);
    }
    let status = envelope.status();
    let diagnosis = classify(status, envelope.url()).unwrap_or_else(|| Diagnosis::Unexpected {
        status,
        url: envelope.url().to_string(),
    });
    Err(PlexError::Status { status, diagnosis })
}

fn decode_items<T: DeserializeOwned>(items: Vec<Value>) -> Result<Vec<T>> {
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).map_err(|e| PlexError::Decode {
                format: Format::Json,
                message: e.to_string(),
            })
        })
        .collect()
}
