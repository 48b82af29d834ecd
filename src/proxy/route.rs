//! Compiled routes mapping a method and path template to a function runtime.

use crate::error::{GatewayError, Result};
use crate::http::{GatewayRequest, Method};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameter requirements declared for an endpoint, name to "required".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParameters {
    #[serde(default)]
    pub paths: BTreeMap<String, bool>,
    #[serde(default)]
    pub querystrings: BTreeMap<String, bool>,
    #[serde(default)]
    pub headers: BTreeMap<String, bool>,
}

/// Everything needed to register one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    /// Function serving this endpoint.
    pub function_name: String,
    /// HTTP method, matched case-insensitively.
    pub method: String,
    /// Path template with `{name}` placeholders.
    pub path: String,
    /// Host port where the function runtime listens.
    pub port: u16,
    #[serde(default)]
    pub parameters: RequestParameters,
}

impl RouteConfig {
    pub fn new(
        function_name: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            method: method.into(),
            path: path.into(),
            port,
            parameters: RequestParameters::default(),
        }
    }

    /// Declare a path parameter.
    pub fn path_param(mut self, name: impl Into<String>, required: bool) -> Self {
        self.parameters.paths.insert(name.into(), required);
        self
    }

    /// Declare a query string parameter.
    pub fn query_param(mut self, name: impl Into<String>, required: bool) -> Self {
        self.parameters.querystrings.insert(name.into(), required);
        self
    }

    /// Declare a header parameter.
    pub fn header_param(mut self, name: impl Into<String>, required: bool) -> Self {
        self.parameters.headers.insert(name.into(), required);
        self
    }
}

/// Compile a path template into an anchored pattern.
///
/// Every `{name}` segment becomes a named group matching `.+`, so a
/// parameter can also absorb `/`. Two parameters without a literal
/// segment between them are therefore ambiguous: the first one takes as
/// much as it can. A trailing slash is optional.
pub fn compile_path(template: &str) -> Result<Regex> {
    let segments: Vec<String> = template
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match placeholder(segment) {
            Some(name) => format!("(?P<{}>.+)", name),
            None => regex::escape(segment),
        })
        .collect();

    let pattern = format!("^/{}/?$", segments.join("/"));
    Regex::new(&pattern).map_err(|source| GatewayError::InvalidPathTemplate {
        template: template.to_string(),
        source,
    })
}

fn placeholder(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

/// A registered endpoint.
#[derive(Debug, Clone)]
pub struct Route {
    config: RouteConfig,
    method: Method,
    pattern: Regex,
}

impl Route {
    /// Compile a route from its configuration.
    pub fn new(config: RouteConfig) -> Result<Self> {
        let method = config.method.parse::<Method>()?;
        let pattern = compile_path(&config.path)?;
        Ok(Self {
            config,
            method,
            pattern,
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    pub fn function_name(&self) -> &str {
        &self.config.function_name
    }

    /// Host port of the backing function runtime.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Check whether the request path fits this route's template.
    pub fn matches(&self, request: &GatewayRequest) -> bool {
        self.pattern.is_match(&request.path)
    }

    /// Collect every violated query and header requirement.
    ///
    /// Path parameters are not checked: a request that lacks one does not
    /// match the route in the first place.
    pub fn validate(&self, request: &GatewayRequest) -> Vec<String> {
        let mut errors = Vec::new();

        for (name, required) in &self.config.parameters.querystrings {
            if *required && request.query_value(name).is_none() {
                errors.push(format!("query parameter \"{}\" is required", name));
            }
        }

        for (name, required) in &self.config.parameters.headers {
            let present = request
                .header_values(name)
                .iter()
                .any(|value| !value.is_empty());
            if *required && !present {
                errors.push(format!("header parameter \"{}\" is required", name));
            }
        }

        errors
    }

    /// Declared path parameters captured from the request path.
    pub fn path_params(&self, request: &GatewayRequest) -> BTreeMap<String, String> {
        let Some(captures) = self.pattern.captures(&request.path) else {
            return BTreeMap::new();
        };

        self.config
            .parameters
            .paths
            .keys()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.clone(), m.as_str().to_string()))
            })
            .collect()
    }

    /// First non-empty value of each declared query parameter.
    pub fn query_params(&self, request: &GatewayRequest) -> BTreeMap<String, String> {
        self.config
            .parameters
            .querystrings
            .keys()
            .filter_map(|name| {
                request
                    .query_value(name)
                    .filter(|value| !value.is_empty())
                    .map(|value| (name.clone(), value))
            })
            .collect()
    }

    /// Every value of each declared query parameter that has at least one.
    pub fn multi_query_params(&self, request: &GatewayRequest) -> BTreeMap<String, Vec<String>> {
        self.config
            .parameters
            .querystrings
            .keys()
            .filter_map(|name| {
                let values = request.query_values(name);
                (!values.is_empty()).then(|| (name.clone(), values))
            })
            .collect()
    }
}
