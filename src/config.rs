//! Service file decoding.
//!
//! The service file lists the functions of a service, how their containers
//! run and which HTTP endpoints they serve:
//!
//! ```yaml
//! service: shop
//! provider:
//!   architecture: arm64
//!   environment:
//!     STAGE: local
//! custom:
//!   rust:
//!     local:
//!       envFile: .env.local
//!       dockerArgs: --network shop
//! functions:
//!   orders:
//!     handler: shop.orders
//!     rust:
//!       port: 9001
//!     events:
//!       - http:
//!           method: get
//!           path: orders/{id}
//!           request:
//!             parameters:
//!               paths:
//!                 id: true
//!               querystrings:
//!                 verbose: false
//! ```

use crate::container::{Architecture, ContainerConfig};
use crate::error::{GatewayError, Result};
use crate::proxy::{RequestParameters, RouteConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub architecture: Architecture,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Defaults applied to every function's container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalDefaults {
    pub env_file: Option<String>,
    pub docker_args: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RustCustom {
    #[serde(default)]
    pub local: LocalDefaults,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CustomConfig {
    #[serde(default)]
    pub rust: RustCustom,
}

/// Per-function container overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FunctionOverrides {
    pub container_name: Option<String>,
    pub port: Option<u16>,
    pub env_file: Option<String>,
    pub docker_args: Option<String>,
    pub arch: Option<Architecture>,
    pub artifact: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HttpRequestConfig {
    #[serde(default)]
    pub parameters: RequestParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpEvent {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub request: HttpRequestConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EventConfig {
    pub http: Option<HttpEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FunctionConfig {
    /// `<package>` or `<package>.<binary>`.
    pub handler: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub rust: FunctionOverrides,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

impl FunctionConfig {
    /// Binary name the handler refers to.
    pub fn binary_name(&self) -> &str {
        self.handler
            .rsplit_once('.')
            .map(|(_, bin)| bin)
            .unwrap_or(&self.handler)
    }

    pub fn http_events(&self) -> impl Iterator<Item = &HttpEvent> {
        self.events.iter().filter_map(|e| e.http.as_ref())
    }
}

/// A decoded service file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceConfig {
    pub service: String,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub custom: CustomConfig,
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionConfig>,
}

impl ServiceConfig {
    /// Read and decode a service file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| GatewayError::Config(e.to_string()))
    }

    pub fn function(&self, name: &str) -> Result<&FunctionConfig> {
        self.functions
            .get(name)
            .ok_or_else(|| GatewayError::FunctionNotFound(name.to_string()))
    }

    /// Resolve how `name`'s container runs, relative to `src_path`.
    ///
    /// The artifact path is made absolute: docker reads a relative bind
    /// mount source as a volume name.
    pub fn container_config(&self, name: &str, src_path: &Path) -> Result<ContainerConfig> {
        let function = self.function(name)?;
        let src_path = std::path::absolute(src_path).map_err(|e| {
            GatewayError::Config(format!("cannot resolve {}: {}", src_path.display(), e))
        })?;
        let overrides = &function.rust;
        let defaults = &self.custom.rust.local;

        let mut env = self.provider.environment.clone();
        env.extend(function.environment.clone());

        let artifact = match &overrides.artifact {
            Some(path) => src_path.join(path),
            None => src_path
                .join("target/lambda")
                .join(function.binary_name())
                .join("bootstrap"),
        };

        Ok(ContainerConfig {
            container_name: overrides
                .container_name
                .clone()
                .unwrap_or_else(|| format!("{}_{}", self.service, name)),
            port: overrides.port.unwrap_or(0),
            env_file: overrides.env_file.clone().or_else(|| defaults.env_file.clone()),
            env,
            docker_args: overrides
                .docker_args
                .clone()
                .or_else(|| defaults.docker_args.clone()),
            arch: overrides.arch.unwrap_or(self.provider.architecture),
            artifact,
        })
    }

    /// Container configuration of every function.
    pub fn container_configs(&self, src_path: &Path) -> Result<BTreeMap<String, ContainerConfig>> {
        self.functions
            .keys()
            .map(|name| Ok((name.clone(), self.container_config(name, src_path)?)))
            .collect()
    }

    /// Functions that declare at least one HTTP endpoint.
    pub fn http_functions(&self) -> Vec<String> {
        self.functions
            .iter()
            .filter(|(_, f)| f.http_events().next().is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Routes of `name`, pointed at `port`.
    pub fn route_configs(&self, name: &str, port: u16) -> Result<Vec<RouteConfig>> {
        let function = self.function(name)?;
        Ok(function
            .http_events()
            .map(|event| RouteConfig {
                function_name: name.to_string(),
                method: event.method.clone(),
                path: event.path.clone(),
                port,
                parameters: event.request.parameters.clone(),
            })
            .collect())
    }
}
