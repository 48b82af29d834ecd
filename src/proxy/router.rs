//! Method-bucketed route table for the front door.

use crate::error::Result;
use crate::http::{GatewayRequest, Method};
use crate::proxy::route::{Route, RouteConfig};
use std::collections::HashMap;
use tracing::info;

/// Ordered routes, one bucket per supported method.
///
/// Built once before serving and read-only afterwards. Lookup returns the
/// first registered route that matches; there is no longest-match rule.
#[derive(Debug, Default)]
pub struct Router {
    routes: HashMap<Method, Vec<Route>>,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and append a route to its method's bucket.
    pub fn push(&mut self, config: RouteConfig) -> Result<()> {
        let route = Route::new(config)?;
        info!(
            "API Gateway route added: {} {} -> {} (port {})",
            route.method(),
            route.config().path,
            route.function_name(),
            route.port()
        );
        self.routes.entry(route.method()).or_default().push(route);
        Ok(())
    }

    /// Find the first route in the request method's bucket that matches.
    pub fn dispatch(&self, request: &GatewayRequest) -> Option<&Route> {
        let method = request.method.parse::<Method>().ok()?;
        self.routes
            .get(&method)?
            .iter()
            .find(|route| route.matches(request))
    }

    /// Whether any route is registered.
    pub fn has_routes(&self) -> bool {
        self.routes.values().any(|bucket| !bucket.is_empty())
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_routes()
    }

    /// Every route, grouped by method in bucket order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        Method::ALL
            .iter()
            .filter_map(|method| self.routes.get(method))
            .flatten()
    }
}
