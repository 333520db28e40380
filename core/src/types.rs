//! Typed views of the Plex resources this crate reads.
//!
//! Field names follow Plex's JSON (`Accept: application/json`) responses.
//! Unknown fields are ignored so newer servers do not break decoding.

use serde::{Deserialize, Serialize};

/// Server identity reported by `/identity`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub machine_identifier: String,
    pub version: String,
    #[serde(default)]
    pub claimed: bool,
}

/// One library section from `/library/sections`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibrarySection {
    pub key: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// One entry from a section listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub rating_key: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
}
