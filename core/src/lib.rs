//! Asynchronous client core for the Plex Media Server HTTP API.
//!
//! # Overview
//! Builds requests from plain `PlexRequest` descriptors, dispatches them over
//! `reqwest`, and returns decoded `Envelope`s whatever the status code. On top
//! of that sit an offset/limit paginator, an advisory status classifier, and
//! a handful of typed library operations.
//!
//! # Design
//! - `Connection` holds session state and never performs I/O.
//! - `PlexClient` owns the connection behind an async `RwLock`; token refresh
//!   takes the write lock so it cannot interleave with request construction.
//! - Every body decodes to a `serde_json::Value`, including XML, so the
//!   paginator probes a single shape regardless of wire format.
//! - Decode failures yield empty content instead of failing the call;
//!   transport failures propagate.

pub mod auth;
pub mod classify;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod library;
pub mod paginate;
pub mod types;

pub use auth::{Authenticator, PlexTvAuthenticator};
pub use classify::{classify, describe_error, Diagnosis};
pub use client::PlexClient;
pub use config::PlexConfig;
pub use connection::{Connection, Credential};
pub use error::{PlexError, Result};
pub use http::{build_url, encode_path_segment, encode_query, Envelope, Format, HttpMethod, PlexRequest};
pub use paginate::{ContainerShape, Paginator, DEFAULT_SHAPES};
pub use types::{Identity, LibrarySection, MediaItem};
