use std::collections::HashMap;

use axum::extract::Query;
use axum::http::StatusCode;
use thiserror::Error;
use watchpage_streams::StreamsError;

use crate::context::WatchContext;
use crate::render::{PageRenderer, RenderResult, messages};
use crate::request::{MissingParameter, StreamRequest, WatchQuery};
use crate::select::{FormatNotFound, Selection, select};

/// Failure conditions of the watch pipeline. Each one ends in a rendered page.
#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    MissingParameter(#[from] MissingParameter),
    #[error("upstream request failed: {0}")]
    UpstreamHttp(StreamsError),
    #[error("upstream response could not be parsed: {0}")]
    UpstreamParse(StreamsError),
    #[error(transparent)]
    FormatNotFound(#[from] FormatNotFound),
}

impl From<StreamsError> for PageError {
    fn from(err: StreamsError) -> Self {
        if err.is_parse() {
            PageError::UpstreamParse(err)
        } else {
            PageError::UpstreamHttp(err)
        }
    }
}

impl PageError {
    /// Status served for this failure. Upstream trouble is a bad gateway, not a server fault.
    pub fn status(&self) -> StatusCode {
        match self {
            PageError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            PageError::UpstreamHttp(_) | PageError::UpstreamParse(_) => StatusCode::BAD_GATEWAY,
            PageError::FormatNotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Renders the error page. Upstream details never reach the visitor.
    pub fn render(&self, renderer: &PageRenderer<'_>, content_id: &str) -> RenderResult {
        match self {
            PageError::MissingParameter(missing) => renderer.missing_parameter(*missing),
            PageError::UpstreamHttp(_) | PageError::UpstreamParse(_) => {
                renderer.error(content_id, self.status(), messages::UPSTREAM_FAILURE)
            }
            PageError::FormatNotFound(err) => renderer.not_found(content_id, err),
        }
    }
}

/// `GET /watch?v=<id>[&itag=<selector>]`.
pub async fn watch(
    context: WatchContext,
    Query(params): Query<HashMap<String, String>>,
) -> RenderResult {
    let renderer = context.renderer();
    let query = WatchQuery::from(params);
    let content_id = query.v.clone().unwrap_or_default();

    match resolve(&context, query).await {
        Ok(page) => page,
        Err(err) => err.render(&renderer, content_id.trim()),
    }
}

async fn resolve(context: &WatchContext, query: WatchQuery) -> Result<RenderResult, PageError> {
    let settings = context.settings();
    let request = StreamRequest::validate(query, &settings.policy)?;
    let metadata = context.metadata();

    tracing::debug!(
        content_id = %request.content_id,
        selector = request.format_selector.as_deref(),
        policy = %settings.policy,
        request_id = metadata.request_id.as_deref(),
        client_ip = metadata.client_ip.as_deref(),
        path = %metadata.path,
        "resolving watch page"
    );

    let streams = context.fetch(&request.content_id).await.map_err(|err| {
        tracing::warn!(
            content_id = %request.content_id,
            status = err.status(),
            request_id = metadata.request_id.as_deref(),
            error = %err,
            "streams api request failed"
        );
        PageError::from(err)
    })?;

    let selection = select(&settings.policy, &request, &streams.formats).map_err(|err| {
        tracing::info!(
            content_id = %request.content_id,
            formats = streams.formats.len(),
            error = %err,
            "no matching format"
        );
        PageError::from(err)
    })?;

    let renderer = context.renderer();
    let page = match selection {
        Selection::Playable(format) => renderer.player(&request.content_id, format),
        Selection::AudioOnly(format) => {
            tracing::info!(
                content_id = %request.content_id,
                itag = %format.itag,
                "selected format is audio only"
            );
            renderer.audio_only(&request.content_id, format)
        }
        Selection::All(formats) => renderer.format_list(&request.content_id, formats),
    };

    Ok(page)
}
