//! Front-door request head as seen by the router.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// HTTP methods the front door can route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Options,
    Head,
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// All supported methods, in bucket order.
    pub const ALL: [Method; 7] = [
        Method::Options,
        Method::Head,
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Head => "HEAD",
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| GatewayError::UnsupportedMethod(s.to_string()))
    }
}

/// The parts of an inbound request that routing and event building need.
///
/// Header names are stored lower-cased; repeated headers keep every value
/// in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayRequest {
    /// Method as received, which may be outside [`Method::ALL`].
    pub method: String,
    /// Path without the query string.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Lower-cased header name to values.
    pub headers: BTreeMap<String, Vec<String>>,
}

impl GatewayRequest {
    /// Create a request from a method and a `path?query` target.
    pub fn new(method: impl Into<String>, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };
        let path = if path.is_empty() { "/" } else { path };

        Self {
            method: method.into(),
            path: path.to_string(),
            query,
            headers: BTreeMap::new(),
        }
    }

    /// Build from the head of a hyper request.
    pub fn from_parts(parts: &hyper::http::request::Parts) -> Self {
        let mut request = Self::new(parts.method.as_str(), "");
        request.path = parts.uri.path().to_string();
        request.query = parts.uri.query().map(str::to_string);

        for (name, value) in &parts.headers {
            request
                .headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        request
    }

    /// Append a header value.
    pub fn header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .entry(key.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// All values of a header, looked up case-insensitively.
    pub fn header_values(&self, key: &str) -> &[String] {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Header values folded into one comma separated string.
    pub fn get_header(&self, key: &str) -> Option<String> {
        let values = self.header_values(key);
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    /// Every header folded into a single value.
    pub fn single_value_headers(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .map(|(name, values)| (name.clone(), values.join(", ")))
            .collect()
    }

    /// All decoded values of a query parameter, in order.
    pub fn query_values(&self, key: &str) -> Vec<String> {
        let Some(query) = self.query.as_deref() else {
            return Vec::new();
        };
        url::form_urlencoded::parse(query.as_bytes())
            .filter(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
            .collect()
    }

    /// The first decoded value of a query parameter.
    pub fn query_value(&self, key: &str) -> Option<String> {
        self.query_values(key).into_iter().next()
    }
}
