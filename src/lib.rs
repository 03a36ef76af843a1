//! watchpage server crate.
//!
//! Serves a single `GET /watch` route: the request's content id is resolved against the
//! streams API, one format (or every format) is picked according to the configured
//! [`SelectionPolicy`], and an HTML page embedding the media URL is rendered.

pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod render;
pub mod request;
pub mod runtime;
pub mod select;

pub use crate::config::{ConfigError, WatchConfig, WatchConfigBuilder};
pub use crate::context::{PageSettings, RequestMetadata, WatchContext, WatchState};
pub use crate::error::{Result, WatchError};
pub use crate::handler::{PageError, watch};
pub use crate::render::{PageRenderer, PlayerMode, RenderResult};
pub use crate::request::{MissingParameter, StreamRequest, WatchQuery};
pub use crate::runtime::{WatchRuntime, app, run, serve};
pub use crate::select::{FormatNotFound, Selection, SelectionPolicy, select};
pub use watchpage_streams::{
    FormatDescriptor, Itag, StreamResponse, StreamsClient, StreamsEndpoint, StreamsError,
};
