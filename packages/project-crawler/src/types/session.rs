//! Injected session state with secure memory.
//!
//! Uses the `secrecy` crate so cookie values never end up in logs, debug
//! output or error messages.

use secrecy::{ExposeSecret, SecretBox};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::SessionError;

/// A secret string that won't be logged or displayed.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    /// Create a new secret string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Expose the secret value for use.
    ///
    /// Only call this when building the outgoing request.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque cookie/header bundle supplied to the renderer before each fetch.
///
/// The orchestrator never looks inside; only renderers expose the values.
#[derive(Clone, Default)]
pub struct SessionState {
    cookies: BTreeMap<String, SecretString>,
    headers: BTreeMap<String, SecretString>,
}

#[derive(Deserialize)]
struct SessionFile {
    #[serde(default)]
    cookies: CookieList,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

/// Browser exports give a list of objects; hand-written files use a map.
#[derive(Deserialize)]
#[serde(untagged)]
enum CookieList {
    Map(BTreeMap<String, String>),
    List(Vec<CookieEntry>),
}

impl Default for CookieList {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

#[derive(Deserialize)]
struct CookieEntry {
    name: String,
    value: String,
}

impl SessionState {
    /// A session with no cookies or headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a session bundle from JSON.
    ///
    /// Accepts `{"cookies": {name: value}, "headers": {name: value}}` or a
    /// browser export `{"cookies": [{"name": .., "value": ..}]}`.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let file: SessionFile = serde_json::from_str(json)?;

        let cookies = match file.cookies {
            CookieList::Map(map) => map,
            CookieList::List(list) => list.into_iter().map(|c| (c.name, c.value)).collect(),
        };

        Ok(Self {
            cookies: cookies
                .into_iter()
                .map(|(k, v)| (k, SecretString::new(v)))
                .collect(),
            headers: file
                .headers
                .into_iter()
                .map(|(k, v)| (k, SecretString::new(v)))
                .collect(),
        })
    }

    /// Load a session bundle from a JSON file.
    pub async fn load(path: &Path) -> Result<Self, SessionError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// Add a cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), SecretString::new(value));
        self
    }

    /// Add an extra request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), SecretString::new(value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.headers.is_empty()
    }

    /// Cookie names, for logging.
    pub fn cookie_names(&self) -> impl Iterator<Item = &str> {
        self.cookies.keys().map(String::as_str)
    }

    /// The `Cookie` header value, exposing the secrets.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value.expose()))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Extra headers, exposing the secrets.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.expose()))
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_not_in_debug() {
        let session = SessionState::new().with_cookie("sessionid", "super-secret-cookie");
        let debug = format!("{:?}", session);
        assert!(debug.contains("sessionid"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_secret_not_in_display() {
        let secret = SecretString::new("super-secret");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_cookie_header() {
        let session = SessionState::new()
            .with_cookie("b", "2")
            .with_cookie("a", "1");
        assert_eq!(session.cookie_header().as_deref(), Some("a=1; b=2"));
        assert!(SessionState::new().cookie_header().is_none());
    }

    #[test]
    fn test_from_json_map_and_list() {
        let map = SessionState::from_json(
            r#"{"cookies": {"sid": "abc"}, "headers": {"Referer": "https://example.com"}}"#,
        )
        .unwrap();
        assert_eq!(map.cookie_header().as_deref(), Some("sid=abc"));
        assert_eq!(
            map.headers().collect::<Vec<_>>(),
            vec![("Referer", "https://example.com")]
        );

        let list = SessionState::from_json(
            r#"{"cookies": [{"name": "sid", "value": "abc", "domain": ".example.com"}]}"#,
        )
        .unwrap();
        assert_eq!(list.cookie_header().as_deref(), Some("sid=abc"));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(SessionState::from_json("not json").is_err());
    }
}
