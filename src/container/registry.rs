//! Containers of a service, keyed by function name.

use crate::container::{Container, ContainerConfig};
use crate::error::{GatewayError, Result};
use crate::process::CommandRunner;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Container table for one service.
///
/// Holds each function's container configuration and a lifecycle lock
/// shared by every snapshot of that function's container, so concurrent
/// `start`/`stop` calls on the same function are serialized.
pub struct ContainerRegistry {
    runner: Arc<dyn CommandRunner>,
    configs: BTreeMap<String, ContainerConfig>,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl ContainerRegistry {
    /// Create a registry for the given function configurations.
    pub fn new(runner: Arc<dyn CommandRunner>, configs: BTreeMap<String, ContainerConfig>) -> Self {
        Self {
            runner,
            configs,
            locks: RwLock::new(HashMap::new()),
        }
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        self.runner.clone()
    }

    /// Names of every registered function, sorted.
    pub fn function_names(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }

    pub fn config(&self, function_name: &str) -> Option<&ContainerConfig> {
        self.configs.get(function_name)
    }

    async fn lock_for(&self, function_name: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(function_name) {
            return lock.clone();
        }
        self.locks
            .write()
            .await
            .entry(function_name.to_string())
            .or_default()
            .clone()
    }

    /// Current snapshot of one function's container.
    pub async fn get(&self, function_name: &str) -> Result<Container> {
        let config = self
            .configs
            .get(function_name)
            .cloned()
            .ok_or_else(|| GatewayError::FunctionNotFound(function_name.to_string()))?;
        let lock = self.lock_for(function_name).await;

        debug!("Inspecting container for function '{}'", function_name);
        Container::inspect(function_name.to_string(), config, self.runner.clone(), lock).await
    }

    /// Snapshots for the named functions, or for all of them when `names`
    /// is empty. Unknown names are an error.
    pub async fn select(&self, names: &[String]) -> Result<Vec<Container>> {
        let selected = if names.is_empty() {
            self.function_names()
        } else {
            if let Some(unknown) = names.iter().find(|n| !self.configs.contains_key(*n)) {
                return Err(GatewayError::FunctionNotFound(unknown.clone()));
            }
            names.to_vec()
        };

        let mut containers = Vec::with_capacity(selected.len());
        for name in &selected {
            containers.push(self.get(name).await?);
        }
        Ok(containers)
    }
}
