use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use watchpage_streams::{FormatDescriptor, Itag};

use crate::request::StreamRequest;

/// Itag of the HLS rendition the watch page historically embeds.
pub const DEFAULT_FIXED_ITAG: &str = "96";

/// How a format is picked out of the upstream list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Always play the rendition with this itag.
    FixedPreferred { itag: Itag },
    /// Play the rendition named by the caller's `itag` query parameter.
    CallerSpecified,
    /// Render every rendition.
    EnumerateAll,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::FixedPreferred {
            itag: Itag::new(DEFAULT_FIXED_ITAG),
        }
    }
}

impl SelectionPolicy {
    /// Whether requests must carry a format selector.
    pub fn requires_selector(&self) -> bool {
        matches!(self, SelectionPolicy::CallerSpecified)
    }
}

impl FromStr for SelectionPolicy {
    type Err = PolicyParseError;

    /// Accepts `fixed`, `fixed:<itag>`, `caller` and `all`, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let (name, argument) = match value.split_once(':') {
            Some((name, argument)) => (name.trim(), Some(argument.trim())),
            None => (value, None),
        };

        match (name.to_ascii_lowercase().as_str(), argument) {
            ("fixed", None) => Ok(Self::default()),
            ("fixed", Some(itag)) if !itag.is_empty() => Ok(Self::FixedPreferred {
                itag: Itag::new(itag),
            }),
            ("caller", None) => Ok(Self::CallerSpecified),
            ("all", None) => Ok(Self::EnumerateAll),
            _ => Err(PolicyParseError::InvalidPolicy(value.to_owned())),
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::FixedPreferred { itag } => write!(f, "fixed:{itag}"),
            SelectionPolicy::CallerSpecified => f.write_str("caller"),
            SelectionPolicy::EnumerateAll => f.write_str("all"),
        }
    }
}

/// Errors encountered while parsing a [`SelectionPolicy`] from a string.
#[derive(Debug, Error, Clone)]
pub enum PolicyParseError {
    #[error("invalid selection policy: {0}")]
    InvalidPolicy(String),
}

/// Outcome of a successful selection. Borrows from the upstream list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    /// A single rendition to embed in the player.
    Playable(&'a FormatDescriptor),
    /// The caller picked a rendition without a video track.
    AudioOnly(&'a FormatDescriptor),
    /// Every rendition, in upstream order.
    All(&'a [FormatDescriptor]),
}

/// No rendition satisfied the policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatNotFound {
    #[error("fixed format {0} not found")]
    Fixed(Itag),
    #[error("requested format {0} not found")]
    Requested(String),
    #[error("upstream listed no formats")]
    Empty,
}

/// Applies `policy` to the upstream list. First match wins.
pub fn select<'a>(
    policy: &SelectionPolicy,
    request: &StreamRequest,
    formats: &'a [FormatDescriptor],
) -> Result<Selection<'a>, FormatNotFound> {
    match policy {
        SelectionPolicy::FixedPreferred { itag } => formats
            .iter()
            .find(|format| format.itag == *itag)
            .map(Selection::Playable)
            .ok_or_else(|| FormatNotFound::Fixed(itag.clone())),
        SelectionPolicy::CallerSpecified => {
            let selector = request.format_selector.as_deref().unwrap_or_default();
            let format = formats
                .iter()
                .find(|format| format.itag == *selector)
                .ok_or_else(|| FormatNotFound::Requested(selector.to_owned()))?;

            if format.is_video_capable() {
                Ok(Selection::Playable(format))
            } else {
                Ok(Selection::AudioOnly(format))
            }
        }
        SelectionPolicy::EnumerateAll if formats.is_empty() => Err(FormatNotFound::Empty),
        SelectionPolicy::EnumerateAll => Ok(Selection::All(formats)),
    }
}
