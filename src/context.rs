use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use watchpage_streams::{StreamResponse, StreamsClient, StreamsError};

use crate::render::{PageRenderer, PlayerMode};
use crate::select::SelectionPolicy;

/// Headers that may carry an edge-assigned request id, in order of preference.
const REQUEST_ID_HEADERS: [&str; 3] = ["x-request-id", "x-vercel-id", "cf-ray"];

/// Immutable settings shared by every request.
#[derive(Clone, Debug, Default)]
pub struct PageSettings {
    pub site_name: String,
    pub policy: SelectionPolicy,
    pub player: PlayerMode,
}

/// Everything the runtime attaches to the router as a request extension.
#[derive(Clone, Debug)]
pub struct WatchState {
    pub streams: StreamsClient,
    pub settings: Arc<PageSettings>,
}

/// Request-scoped handle exposing the streams client, page settings and request metadata.
#[derive(Clone, Debug)]
pub struct WatchContext {
    metadata: RequestMetadata,
    state: WatchState,
}

impl WatchContext {
    /// Returns the request metadata parsed from headers.
    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    /// Returns the shared page settings.
    pub fn settings(&self) -> &PageSettings {
        &self.state.settings
    }

    /// Returns a renderer configured with the site name and player mode.
    pub fn renderer(&self) -> PageRenderer<'_> {
        let settings = self.settings();
        PageRenderer::new(&settings.site_name, settings.player)
    }

    /// Fetches the stream metadata for `content_id`.
    pub async fn fetch(&self, content_id: &str) -> Result<StreamResponse, StreamsError> {
        self.state.streams.fetch(content_id).await
    }
}

/// Request details used to correlate log lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    pub request_id: Option<String>,
    pub client_ip: Option<String>,
    pub path: String,
}

impl RequestMetadata {
    fn from_parts(parts: &Parts) -> Self {
        let headers = &parts.headers;
        let request_id = REQUEST_ID_HEADERS
            .iter()
            .find_map(|name| headers.get(*name))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_owned());
        let client_ip = headers
            .get("x-forwarded-for")
            .or_else(|| headers.get("x-real-ip"))
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let path = parts.uri.path().to_owned();

        Self {
            request_id,
            client_ip,
            path,
        }
    }
}

/// Errors emitted when a handler requests [`WatchContext`] but the runtime did not set it up.
#[derive(Debug, Error)]
pub enum WatchContextRejection {
    #[error("watch state missing from request extensions")]
    MissingState,
}

impl IntoResponse for WatchContextRejection {
    fn into_response(self) -> Response {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let message = self.to_string();
        (status, message).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for WatchContext
where
    S: Send + Sync,
{
    type Rejection = WatchContextRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let state = parts
            .extensions
            .get::<WatchState>()
            .cloned()
            .ok_or(WatchContextRejection::MissingState)?;

        let metadata = RequestMetadata::from_parts(parts);

        Ok(Self { metadata, state })
    }
}
