//! Front-door response shaped from a function runtime's raw output.

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

const INTERNAL_SERVER_ERROR: u16 = 500;

/// Response written back to the front-door caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Single-valued headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Repeated headers, written after `headers`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub multi_value_headers: BTreeMap<String, Vec<String>>,
    /// Response body.
    #[serde(default)]
    pub body: String,
}

/// Shape a function is expected to return.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionOutput {
    status_code: u16,
    #[serde(default)]
    headers: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    multi_value_headers: Option<BTreeMap<String, Vec<Value>>>,
    #[serde(default)]
    body: Option<String>,
}

fn header_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl ProxyResponse {
    /// Create an empty response with the given status code.
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
            multi_value_headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    /// Create a response with a JSON body.
    pub fn json(status_code: u16, value: &Value) -> Self {
        Self::new(status_code)
            .header("content-type", "application/json")
            .body(value.to_string())
    }

    /// Add a header to the response.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the response body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Classify the complete raw output of a function runtime.
    ///
    /// Output carrying a `statusCode` is passed through. Any other JSON
    /// value becomes a 500 served as `application/json`, and anything
    /// that is not JSON (or is empty JSON) becomes a 500 served as
    /// `text/plain`. In both error cases the raw output is the body.
    pub fn from_output(raw: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(raw).ok();

        match parsed {
            Some(Value::Object(map)) if map.contains_key("statusCode") => {
                match serde_json::from_value::<FunctionOutput>(Value::Object(map)) {
                    Ok(output) => Self::from_function_output(output),
                    Err(e) => {
                        warn!("Function output has an unusable statusCode: {}", e);
                        Self::internal_error("application/json", raw)
                    }
                }
            }
            Some(value) if !is_empty_json(&value) => Self::internal_error("application/json", raw),
            _ => Self::internal_error("text/plain", raw),
        }
    }

    fn from_function_output(output: FunctionOutput) -> Self {
        let headers = output
            .headers
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, header_text(v)))
            .collect();
        let multi_value_headers = output
            .multi_value_headers
            .unwrap_or_default()
            .into_iter()
            .map(|(k, vs)| (k, vs.into_iter().map(header_text).collect()))
            .collect();

        Self {
            status_code: output.status_code,
            headers,
            multi_value_headers,
            body: output.body.unwrap_or_default(),
        }
    }

    fn internal_error(content_type: &str, raw: &str) -> Self {
        Self::new(INTERNAL_SERVER_ERROR)
            .header("content-type", content_type)
            .body(raw)
    }

    /// Build the hyper response written to the caller.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let status = hyper::StatusCode::from_u16(self.status_code).unwrap_or_else(|_| {
            warn!(
                "Invalid status code {}, falling back to 500 Internal Server Error",
                self.status_code
            );
            hyper::StatusCode::INTERNAL_SERVER_ERROR
        });

        let mut response = Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        let single = self.headers.into_iter().map(|(k, v)| (k, vec![v]));
        for (name, values) in single.chain(self.multi_value_headers) {
            let Ok(name) = hyper::header::HeaderName::from_bytes(name.as_bytes()) else {
                warn!("Dropping invalid header name {:?}", name);
                continue;
            };
            headers.remove(&name);
            for value in values {
                match hyper::header::HeaderValue::from_str(&value) {
                    Ok(value) => {
                        headers.append(name.clone(), value);
                    }
                    Err(_) => warn!("Dropping invalid value for header {}", name),
                }
            }
        }
        response
    }
}

fn is_empty_json(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

impl Default for ProxyResponse {
    fn default() -> Self {
        Self::new(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_through_function_response() {
        let response = ProxyResponse::from_output(r#"{"statusCode":201,"headers":{},"body":"ok"}"#);
        assert_eq!(response.status_code, 201);
        assert!(response.headers.is_empty());
        assert_eq!(response.body, "ok");
    }

    #[test]
    fn test_non_string_header_values_are_stringified() {
        let response = ProxyResponse::from_output(
            r#"{"statusCode":200,"headers":{"x-count":3},"multiValueHeaders":{"set-cookie":["a=1","b=2"]}}"#,
        );
        assert_eq!(response.headers.get("x-count").map(String::as_str), Some("3"));
        assert_eq!(response.multi_value_headers["set-cookie"], vec!["a=1", "b=2"]);
        assert_eq!(response.body, "");
    }

    #[test]
    fn test_unexpected_json_shape_is_internal_error() {
        let raw = r#"{"unexpected":"shape"}"#;
        let response = ProxyResponse::from_output(raw);
        assert_eq!(response.status_code, 500);
        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(response.body, raw);
    }

    #[test]
    fn test_plain_text_is_internal_error() {
        let response = ProxyResponse::from_output("not json at all");
        assert_eq!(response.status_code, 500);
        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("text/plain")
        );
        assert_eq!(response.body, "not json at all");
    }

    #[test]
    fn test_empty_object_is_plain_text_error() {
        let response = ProxyResponse::from_output("{}");
        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("text/plain")
        );
    }

    #[test]
    fn test_into_response() {
        let response = ProxyResponse::new(404)
            .header("content-type", "text/plain")
            .body("missing")
            .into_response();
        assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["content-type"], "text/plain");
    }

    #[test]
    fn test_invalid_status_falls_back_to_500() {
        let response = ProxyResponse::new(42).into_response();
        assert_eq!(response.status(), hyper::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
