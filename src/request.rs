use std::collections::HashMap;

use thiserror::Error;

use crate::select::SelectionPolicy;

/// Query parameter carrying the content id.
pub const CONTENT_ID_PARAM: &str = "v";
/// Query parameter carrying the format selector.
pub const FORMAT_SELECTOR_PARAM: &str = "itag";

/// Raw `/watch` query, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatchQuery {
    pub v: Option<String>,
    pub itag: Option<String>,
}

impl From<HashMap<String, String>> for WatchQuery {
    fn from(mut params: HashMap<String, String>) -> Self {
        Self {
            v: params.remove(CONTENT_ID_PARAM),
            itag: params.remove(FORMAT_SELECTOR_PARAM),
        }
    }
}

/// A validated request for one content id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRequest {
    pub content_id: String,
    pub format_selector: Option<String>,
}

/// A required query parameter was absent or blank.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("missing query parameter `{0}`")]
pub struct MissingParameter(pub &'static str);

impl StreamRequest {
    /// Checks that `v` (and `itag`, when the policy needs one) are present and non-blank.
    pub fn validate(query: WatchQuery, policy: &SelectionPolicy) -> Result<Self, MissingParameter> {
        let content_id = non_blank(query.v).ok_or(MissingParameter(CONTENT_ID_PARAM))?;

        let format_selector = if policy.requires_selector() {
            Some(non_blank(query.itag).ok_or(MissingParameter(FORMAT_SELECTOR_PARAM))?)
        } else {
            None
        };

        Ok(Self {
            content_id,
            format_selector,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(v: Option<&str>, itag: Option<&str>) -> WatchQuery {
        WatchQuery {
            v: v.map(str::to_owned),
            itag: itag.map(str::to_owned),
        }
    }

    #[test]
    fn builds_query_from_params() {
        let params = HashMap::from([
            ("v".to_owned(), "abc".to_owned()),
            ("itag".to_owned(), "18".to_owned()),
            ("t".to_owned(), "42".to_owned()),
        ]);

        assert_eq!(WatchQuery::from(params), query(Some("abc"), Some("18")));
    }

    #[test]
    fn requires_content_id() {
        let policy = SelectionPolicy::default();
        for missing in [query(None, None), query(Some(""), None), query(Some("  "), None)] {
            assert_eq!(
                StreamRequest::validate(missing, &policy),
                Err(MissingParameter("v"))
            );
        }
    }

    #[test]
    fn requires_selector_only_for_caller_policy() {
        let request =
            StreamRequest::validate(query(Some(" abc "), None), &SelectionPolicy::EnumerateAll)
                .unwrap();
        assert_eq!(request.content_id, "abc");
        assert!(request.format_selector.is_none());

        assert_eq!(
            StreamRequest::validate(
                query(Some("abc"), Some(" ")),
                &SelectionPolicy::CallerSpecified
            ),
            Err(MissingParameter("itag"))
        );

        let request = StreamRequest::validate(
            query(Some("abc"), Some("18")),
            &SelectionPolicy::CallerSpecified,
        )
        .unwrap();
        assert_eq!(request.format_selector.as_deref(), Some("18"));
    }

    #[test]
    fn selector_is_dropped_when_policy_ignores_it() {
        let request = StreamRequest::validate(
            query(Some("abc"), Some("18")),
            &SelectionPolicy::default(),
        )
        .unwrap();
        assert!(request.format_selector.is_none());
    }
}
