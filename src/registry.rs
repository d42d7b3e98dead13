//! Registration of APIs and process-wide middleware.

use std::sync::Arc;

use tracing::debug;

use crate::api::Api;
use crate::dispatcher::{Dispatcher, Target};
use crate::error::RegistryError;
use crate::harness;
use crate::middleware::Middleware;
use crate::router::RouteTable;

/// Collects everything a service serves, then freezes it into a
/// [`Dispatcher`].
///
/// ```rust
/// use trellis::{Api, Method, Registry, Route, VoidHandler};
/// use trellis::middleware::Trace;
///
/// let dispatcher = Registry::new()
///     .middleware(Trace)
///     .add_api(Api::new("/mock", "testung").route(Route::new("/void", Method::Get, VoidHandler)))
///     .build()
///     .unwrap();
///
/// // one route plus the warning and critical self-test endpoints
/// assert_eq!(dispatcher.route_count(), 3);
/// ```
pub struct Registry {
    middleware: Vec<Arc<dyn Middleware>>,
    apis: Vec<Api>,
    self_tests: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self { middleware: Vec::new(), apis: Vec::new(), self_tests: true }
    }

    /// Adds process-wide middleware, run before any API or route middleware.
    pub fn middleware(mut self, mw: impl Middleware) -> Self {
        self.middleware.push(Arc::new(mw));
        self
    }

    pub fn add_api(mut self, api: Api) -> Self {
        self.apis.push(api);
        self
    }

    /// Whether to mount `/test/{apiRoot}/warning|critical`. On by default.
    pub fn self_tests(mut self, enabled: bool) -> Self {
        self.self_tests = enabled;
        self
    }

    /// Validates every route and freezes the registry.
    ///
    /// API routes are matched before self-test endpoints, and within an API
    /// in the order they were added.
    pub fn build(self) -> Result<Dispatcher, RegistryError> {
        let mut table = RouteTable::new();
        let mut apis: Vec<Arc<Api>> = Vec::with_capacity(self.apis.len());

        for mut api in self.apis {
            if apis.iter().any(|a| a.root == api.root) {
                return Err(RegistryError::DuplicateApi(api.root));
            }
            api.finalize();
            let api = Arc::new(api);

            for route in &api.routes {
                let path = api.full_path(&route.path);
                let target = Target { api: Arc::clone(&api), route: route.clone() };
                table
                    .insert(&path, route.methods, target)
                    .map_err(|source| RegistryError::Route { api: api.name.clone(), source })?;
                debug!(api = %api.name, methods = %route.methods, %path, "route registered");
            }
            apis.push(api);
        }

        if self.self_tests {
            for api in &apis {
                for route in harness::endpoints(api) {
                    let path = route.path.clone();
                    let methods = route.methods;
                    let target = Target { api: Arc::clone(api), route };
                    table
                        .insert(&path, methods, target)
                        .map_err(|source| RegistryError::Route { api: api.name.clone(), source })?;
                }
            }
        }

        Ok(Dispatcher::new(table, self.middleware, apis))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
