//! Offset/limit pagination over Plex list endpoints.
//!
//! # Design
//! The paginator keeps a single cursor per call and fetches strictly in
//! sequence: whether another page exists is only known from the length of
//! the previous one. A page shorter than the page size ends the loop, so a
//! result set that is an exact multiple of the page size costs one extra,
//! empty request.
//!
//! Item lists are found by probing an ordered list of container shapes. A
//! response matching none of them ends pagination the same way an empty
//! library does.

use serde_json::Value;

use crate::client::PlexClient;
use crate::error::Result;
use crate::http::{HttpMethod, PlexRequest};

pub const DEFAULT_PAGE_SIZE: usize = 100;

pub const START_PARAM: &str = "X-Plex-Container-Start";
pub const SIZE_PARAM: &str = "X-Plex-Container-Size";

/// Where a page's items live inside a decoded response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerShape {
    pub container: &'static str,
    pub items: &'static str,
}

/// Library/section listings first, then media metadata listings.
pub const DEFAULT_SHAPES: &[ContainerShape] = &[
    ContainerShape {
        container: "MediaContainer",
        items: "Directory",
    },
    ContainerShape {
        container: "MediaContainer",
        items: "Metadata",
    },
];

/// Pull the item list out of `content` using the first matching shape.
pub fn extract_items(content: &Value, shapes: &[ContainerShape]) -> Option<Vec<Value>> {
    shapes.iter().find_map(|shape| {
        match content.get(shape.container)?.get(shape.items)? {
            Value::Array(items) => Some(items.clone()),
            // Decoded XML with a single child still arrives as an array, but
            // a hand-built JSON response may carry a lone object.
            item @ Value::Object(_) => Some(vec![item.clone()]),
            _ => None,
        }
    })
}

#[derive(Debug, Clone)]
pub struct Paginator {
    page_size: usize,
    start_param: String,
    size_param: String,
    shapes: Vec<ContainerShape>,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new()
    }
}

impl Paginator {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            start_param: START_PARAM.to_string(),
            size_param: SIZE_PARAM.to_string(),
            shapes: DEFAULT_SHAPES.to_vec(),
        }
    }

    /// Items per page; zero is treated as one.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Query parameter names carrying the offset and page length.
    pub fn params(mut self, start: impl Into<String>, size: impl Into<String>) -> Self {
        self.start_param = start.into();
        self.size_param = size.into();
        self
    }

    pub fn shapes(mut self, shapes: &[ContainerShape]) -> Self {
        self.shapes = shapes.to_vec();
        self
    }

    pub fn get_page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch every page of `request` and concatenate the items in arrival order.
    ///
    /// A transport failure on the first page is returned as an error. On a
    /// later page it is logged and the items gathered so far are returned.
    #[tracing::instrument(skip(self, client, request), fields(endpoint = %request.endpoint, page_size = self.page_size))]
    pub async fn fetch_all(&self, client: &PlexClient, request: PlexRequest) -> Result<Vec<Value>> {
        let mut items: Vec<Value> = Vec::new();
        let mut offset = 0usize;

        loop {
            let mut page_request = request.clone();
            page_request.method = HttpMethod::Get;
            page_request.body = None;
            page_request.set_query(self.start_param.as_str(), offset.to_string());
            page_request.set_query(self.size_param.as_str(), self.page_size.to_string());

            let envelope = match client.send(page_request).await {
                Ok(envelope) => envelope,
                Err(e) if offset == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!(offset, collected = items.len(), "pagination interrupted: {e}");
                    return Ok(items);
                }
            };

            let Some(page) = extract_items(envelope.content(), &self.shapes) else {
                tracing::debug!(offset, status = envelope.status(), "no item container; stopping");
                break;
            };

            let received = page.len();
            items.extend(page);
            offset += self.page_size;
            tracing::debug!(received, total = items.len(), "page received");

            if received < self.page_size {
                break;
            }
        }

        Ok(items)
    }
}
