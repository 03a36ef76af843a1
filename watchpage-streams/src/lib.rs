use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tokio::time;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(8);
const STREAMS_PATH: [&str; 3] = ["api", "2", "streams"];

/// Public streams API the watch page was built against.
pub const DEFAULT_STREAMS_BASE_URL: &str = "https://siawaseok.f5.si";

/// Marks an audio-only rendition in the `vcodec` field.
pub const NO_VIDEO_CODEC: &str = "none";

/// Base URL of the streams API, e.g. `https://siawaseok.f5.si`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamsEndpoint {
    base: Url,
}

impl StreamsEndpoint {
    /// Returns the parsed base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }
}

impl Default for StreamsEndpoint {
    fn default() -> Self {
        Self {
            base: Url::parse(DEFAULT_STREAMS_BASE_URL)
                .expect("default streams base URL is valid"),
        }
    }
}

impl FromStr for StreamsEndpoint {
    type Err = StreamsEndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let base = Url::parse(value)
            .map_err(|_| StreamsEndpointParseError::InvalidStreamsEndpoint(value.to_owned()))?;

        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(StreamsEndpointParseError::InvalidStreamsEndpoint(
                value.to_owned(),
            ));
        }

        Ok(Self { base })
    }
}

impl fmt::Display for StreamsEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.as_str())
    }
}

/// Errors encountered while parsing a [`StreamsEndpoint`] from a string.
#[derive(Debug, Error, Clone)]
pub enum StreamsEndpointParseError {
    #[error("invalid streams endpoint: {0}")]
    InvalidStreamsEndpoint(String),
}

/// Client for the `/api/2/streams/{id}` metadata endpoint.
///
/// Every call to [`StreamsClient::fetch`] issues exactly one `GET` request. There is no
/// retry and no caching; the whole exchange (connect, headers, body) is bounded by the
/// configured timeout.
///
/// # Errors
/// [`StreamsClient::fetch`] returns [`StreamsError`] when the upstream answers with a
/// non-success status, the exchange times out or fails at the transport level, or the
/// body does not match the expected schema.
///
/// # Examples
/// ```ignore
/// use watchpage_streams::{StreamsClient, StreamsEndpoint};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let client = StreamsClient::new("https://siawaseok.f5.si".parse::<StreamsEndpoint>()?)?;
/// let streams = client.fetch("dQw4w9WgXcQ").await?;
/// println!("{} formats", streams.formats.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct StreamsClient {
    inner: Arc<StreamsClientInner>,
}

#[derive(Debug)]
struct StreamsClientInner {
    endpoint: StreamsEndpoint,
    http: Client,
    timeout: Duration,
}

impl StreamsClient {
    /// Builds a client for the endpoint using the default timeout.
    ///
    /// # Errors
    /// Returns [`StreamsError::Transport`] if the HTTP client cannot be initialized.
    pub fn new(endpoint: StreamsEndpoint) -> Result<Self, StreamsError> {
        Self::with_timeout(endpoint, DEFAULT_FETCH_TIMEOUT)
    }

    /// Builds a client that bounds every fetch by `timeout`.
    ///
    /// # Errors
    /// Returns [`StreamsError::Transport`] if the HTTP client cannot be initialized.
    pub fn with_timeout(
        endpoint: StreamsEndpoint,
        timeout: Duration,
    ) -> Result<Self, StreamsError> {
        let http = Client::builder()
            .user_agent(concat!("watchpage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| StreamsError::Transport(err.to_string()))?;

        Ok(Self {
            inner: Arc::new(StreamsClientInner {
                endpoint,
                http,
                timeout,
            }),
        })
    }

    /// Returns the endpoint backing this client.
    pub fn endpoint(&self) -> &StreamsEndpoint {
        &self.inner.endpoint
    }

    /// Returns the per-fetch timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Builds `<base>/api/2/streams/{content_id}`, encoding the id as one path segment.
    pub fn streams_url(&self, content_id: &str) -> Url {
        let mut url = self.inner.endpoint.base.clone();
        // cannot-be-a-base URLs are rejected when the endpoint is parsed
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(STREAMS_PATH)
                .push(content_id);
        }
        url
    }

    /// Fetches the stream metadata for `content_id`.
    ///
    /// # Errors
    /// See [`StreamsError`].
    pub async fn fetch(&self, content_id: &str) -> Result<StreamResponse, StreamsError> {
        let url = self.streams_url(content_id);
        tracing::debug!(%url, "fetching stream metadata");

        match time::timeout(self.inner.timeout, self.exchange(url)).await {
            Ok(result) => result,
            Err(_) => Err(StreamsError::Timeout(self.inner.timeout)),
        }
    }

    async fn exchange(&self, url: Url) -> Result<StreamResponse, StreamsError> {
        let response = self
            .inner
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| StreamsError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamsError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| StreamsError::Transport(err.to_string()))?;

        StreamResponse::from_slice(&body)
    }
}

/// Top-level body returned by the streams endpoint.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StreamResponse {
    /// Renditions in upstream order; a missing or `null` field reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub formats: Vec<FormatDescriptor>,
}

impl StreamResponse {
    /// Parses a response body, mapping schema violations to [`StreamsError::Parse`].
    pub fn from_slice(body: &[u8]) -> Result<Self, StreamsError> {
        serde_json::from_slice(body).map_err(|err| StreamsError::Parse(err.to_string()))
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<FormatDescriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<FormatDescriptor>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One encoded rendition of the requested content.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub itag: Itag,
    pub url: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
}

impl FormatDescriptor {
    /// A rendition carries video iff `vcodec` is present and not `"none"`.
    pub fn is_video_capable(&self) -> bool {
        self.vcodec
            .as_deref()
            .is_some_and(|codec| codec != NO_VIDEO_CODEC)
    }

    /// Resolution label suitable for display.
    pub fn display_resolution(&self) -> &str {
        match self.resolution.as_deref() {
            Some(value) if value.eq_ignore_ascii_case("audio only") => "Audio Only",
            Some(value) if !value.is_empty() => value,
            _ if !self.is_video_capable() => "Audio Only",
            _ => "unknown",
        }
    }
}

/// Opaque rendition identifier.
///
/// The upstream sends itags either as JSON strings or JSON numbers; both are kept in their
/// textual form so `96` and `"96"` compare equal.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "RawItag")]
pub struct Itag(String);

impl Itag {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Itag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Itag {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawItag {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawItag> for Itag {
    fn from(raw: RawItag) -> Self {
        match raw {
            RawItag::Text(text) => Self(text),
            RawItag::Number(number) => Self(number.to_string()),
        }
    }
}

/// Errors emitted by [`StreamsClient`] when the upstream exchange fails.
#[derive(Debug, Error)]
pub enum StreamsError {
    #[error("streams api returned status {0}")]
    Status(u16),
    #[error("streams api timed out after {0:?}")]
    Timeout(Duration),
    #[error("streams api transport error: {0}")]
    Transport(String),
    #[error("invalid streams payload: {0}")]
    Parse(String),
}

impl StreamsError {
    /// Whether the upstream answered but the body did not match the schema.
    pub fn is_parse(&self) -> bool {
        matches!(self, StreamsError::Parse(_))
    }

    /// Upstream HTTP status, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            StreamsError::Status(status) => Some(*status),
            _ => None,
        }
    }
}
