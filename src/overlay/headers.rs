//! Validation and application of user-defined header overrides.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identification header added to every overlaid request.
pub const PROXY_MARKER_HEADER: &str = "x-custom-header-proxy";

/// Headers that control HTTP framing and can't be overridden safely.
const RESERVED_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// One raw key/value row as entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HeaderRow {
    pub key: String,
    pub value: String,
}

impl HeaderRow {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for HeaderRow {
    fn from((key, value): (K, V)) -> Self {
        Self::new(key, value)
    }
}

/// Reasons a header set is rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HeaderError {
    /// Exactly one side of a row is blank.
    #[error("Please provide both key and value for all headers or remove incomplete ones (row {row})")]
    IncompleteHeaderPair { row: usize, key: String, value: String },

    /// Key is not a valid HTTP header token.
    #[error("Invalid header name: {0:?}")]
    InvalidHeaderName(String),

    /// Value contains bytes not allowed in a header value.
    #[error("Invalid value for header {0}")]
    InvalidHeaderValue(String),

    /// Header controls connection framing.
    #[error("Header {0} cannot be overridden")]
    ReservedHeader(String),
}

#[derive(Debug, Clone)]
struct OverlayEntry {
    display: String,
    name: HeaderName,
    value: HeaderValue,
}

/// A validated, ordered set of header overrides.
///
/// Names are unique case-insensitively. Built once per session by
/// [`validate`] and then only read.
#[derive(Debug, Clone, Default)]
pub struct OverlayHeaders {
    entries: Vec<OverlayEntry>,
}

/// Trim and validate a set of header rows.
///
/// Rows blank on both sides are dropped. Duplicate names keep the position of
/// the first occurrence and the value of the last.
pub fn validate<I>(rows: I) -> Result<OverlayHeaders, HeaderError>
where
    I: IntoIterator,
    I::Item: Into<HeaderRow>,
{
    let mut entries: Vec<OverlayEntry> = Vec::new();

    for (row, raw) in rows.into_iter().enumerate() {
        let raw = raw.into();
        let key = raw.key.trim();
        let value = raw.value.trim();

        match (key.is_empty(), value.is_empty()) {
            (true, true) => continue,
            (false, false) => {}
            _ => {
                return Err(HeaderError::IncompleteHeaderPair {
                    row,
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
        }

        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| HeaderError::InvalidHeaderName(key.to_string()))?;
        if RESERVED_HEADERS.contains(&name.as_str()) {
            return Err(HeaderError::ReservedHeader(key.to_string()));
        }
        let value = HeaderValue::from_str(value)
            .map_err(|_| HeaderError::InvalidHeaderValue(key.to_string()))?;

        match entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => existing.value = value,
            None => entries.push(OverlayEntry {
                display: key.to_string(),
                name,
                value,
            }),
        }
    }

    Ok(OverlayHeaders { entries })
}

impl OverlayHeaders {
    /// Override every configured header on `headers` and add the marker.
    ///
    /// Any existing value for a configured name is removed first, so repeated
    /// headers from the client never survive next to the configured one.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for entry in &self.entries {
            headers.remove(&entry.name);
            headers.insert(entry.name.clone(), entry.value.clone());
        }
        headers.insert(
            HeaderName::from_static(PROXY_MARKER_HEADER),
            HeaderValue::from_static("true"),
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured headers as `(display name, value)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|e| (e.display.as_str(), &e.value))
    }

    /// Display names as the user typed them.
    pub fn display_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.display.as_str())
    }

    /// JSON object of display name → value.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .entries
            .iter()
            .map(|e| {
                (
                    e.display.clone(),
                    serde_json::Value::String(String::from_utf8_lossy(e.value.as_bytes()).into_owned()),
                )
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pairs: &[(&str, &str)]) -> Vec<HeaderRow> {
        pairs.iter().map(|(k, v)| HeaderRow::new(*k, *v)).collect()
    }

    #[test]
    fn trims_and_keeps_order() {
        let headers = validate(rows(&[(" Authorization ", " Bearer abc "), ("X-Flag", "on")])).unwrap();
        let collected: Vec<_> = headers.iter().map(|(k, v)| (k.to_string(), v.to_str().unwrap().to_string())).collect();
        assert_eq!(
            collected,
            vec![
                ("Authorization".to_string(), "Bearer abc".to_string()),
                ("X-Flag".to_string(), "on".to_string()),
            ]
        );
    }

    #[test]
    fn blank_rows_are_dropped() {
        let headers = validate(rows(&[("", ""), ("  ", "\t"), ("X-A", "1")])).unwrap();
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn key_without_value_is_incomplete() {
        let err = validate(rows(&[("X", "")])).unwrap_err();
        assert!(matches!(err, HeaderError::IncompleteHeaderPair { row: 0, .. }));
    }

    #[test]
    fn value_without_key_is_incomplete() {
        let err = validate(rows(&[("X-A", "1"), ("   ", "orphan")])).unwrap_err();
        assert!(matches!(err, HeaderError::IncompleteHeaderPair { row: 1, .. }));
    }

    #[test]
    fn duplicate_names_last_value_wins() {
        let headers = validate(rows(&[("X-Token", "old"), ("X-Other", "1"), ("x-token", "new")])).unwrap();
        assert_eq!(headers.len(), 2);
        let (first, value) = headers.iter().next().unwrap();
        assert_eq!(first, "X-Token");
        assert_eq!(value, "new");
    }

    #[test]
    fn rejects_bad_names_and_framing_headers() {
        assert!(matches!(
            validate(rows(&[("Bad Header", "x")])),
            Err(HeaderError::InvalidHeaderName(_))
        ));
        assert!(matches!(
            validate(rows(&[("X-A", "line\nbreak")])),
            Err(HeaderError::InvalidHeaderValue(_))
        ));
        assert!(matches!(
            validate(rows(&[("Content-Length", "5")])),
            Err(HeaderError::ReservedHeader(_))
        ));
    }

    #[test]
    fn apply_overrides_case_insensitively() {
        let overlay = validate(rows(&[("Authorization", "Bearer abc")])).unwrap();
        let mut headers = HeaderMap::new();
        headers.append("authorization", HeaderValue::from_static("Bearer stale"));
        headers.append("AUTHORIZATION", HeaderValue::from_static("Bearer stale-2"));
        headers.insert("accept", HeaderValue::from_static("*/*"));

        overlay.apply(&mut headers);

        let values: Vec<_> = headers.get_all("authorization").iter().collect();
        assert_eq!(values, vec![&HeaderValue::from_static("Bearer abc")]);
        assert_eq!(headers.get("accept").unwrap(), "*/*");
        assert_eq!(headers.get(PROXY_MARKER_HEADER).unwrap(), "true");
    }

    #[test]
    fn apply_with_empty_overlay_still_marks() {
        let overlay = OverlayHeaders::default();
        let mut headers = HeaderMap::new();
        overlay.apply(&mut headers);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-Custom-Header-Proxy").unwrap(), "true");
    }

    #[test]
    fn to_json_uses_display_names() {
        let overlay = validate(rows(&[("Authorization", "Bearer abc")])).unwrap();
        assert_eq!(overlay.to_json(), serde_json::json!({"Authorization": "Bearer abc"}));
    }
}
