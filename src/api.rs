//! APIs and routes: the declarative registration surface.
//!
//! ```rust
//! use serde_json::json;
//! use trellis::{Api, Method, Route, TestDescriptor, VoidHandler, handler_fn};
//! use trellis::middleware::SetHeader;
//!
//! let api = Api::new("/mock", "testung")
//!     .with_version("1.0")
//!     .with_title("Testung API!")
//!     .with_doc("Our fancy testung API")
//!     .allow_insecure(true)
//!     .middleware(SetHeader::from_static("x-middleware-message", "Global middleware"))
//!     .route(
//!         Route::new("/test2", Method::Get, handler_fn(|_ctx| Box::pin(async {
//!             Ok(json!({ "YO": "YO" }))
//!         })))
//!         .with_description("test2")
//!         .test(TestDescriptor::critical(|_t| Box::pin(async {}))),
//!     )
//!     .route(Route::new("/testvoid", Method::Get, VoidHandler));
//!
//! assert_eq!(api.full_path("/test2"), "/mock/test2");
//! ```

use std::fmt;
use std::sync::Arc;

use crate::handler::Handler;
use crate::harness::TestDescriptor;
use crate::method::MethodSet;
use crate::middleware::Middleware;
use crate::render::{JsonRenderer, Renderer};

// ── Route ─────────────────────────────────────────────────────────────────────

/// A path pattern, its methods, its handler, route-local middleware and an
/// optional self-test.
#[derive(Clone)]
pub struct Route {
    pub(crate) path: String,
    pub(crate) description: String,
    pub(crate) methods: MethodSet,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) renderer: Option<Arc<dyn Renderer>>,
    pub(crate) test: Option<TestDescriptor>,
}

impl Route {
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves
    /// them. The pattern is validated when the registry is built.
    pub fn new(path: impl Into<String>, methods: impl Into<MethodSet>, handler: impl Handler) -> Self {
        Self {
            path: path.into(),
            description: String::new(),
            methods: methods.into(),
            handler: Arc::new(handler),
            middleware: Vec::new(),
            renderer: None,
            test: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends route-local middleware. Runs after process-wide and API
    /// middleware.
    pub fn middleware(mut self, mw: impl Middleware) -> Self {
        self.middleware.push(Arc::new(mw));
        self
    }

    /// Overrides the API's renderers for this route only.
    pub fn renderer(mut self, renderer: impl Renderer) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn test(mut self, test: TestDescriptor) -> Self {
        self.test = Some(test);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn methods(&self) -> MethodSet {
        self.methods
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("middleware", &self.middleware.len())
            .field("test", &self.test)
            .finish_non_exhaustive()
    }
}

// ── Api ───────────────────────────────────────────────────────────────────────

/// A versioned group of routes under one root path, sharing middleware and
/// renderers.
///
/// Requests are refused with `403` unless the fronting proxy marks them as
/// HTTPS (`X-Forwarded-Proto: https`) or the API sets
/// [`allow_insecure`](Api::allow_insecure).
pub struct Api {
    pub(crate) root: String,
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) title: String,
    pub(crate) doc: String,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) routes: Vec<Route>,
    pub(crate) renderers: Vec<Arc<dyn Renderer>>,
    pub(crate) allow_insecure: bool,
}

impl Api {
    /// Trailing slashes on `root` are dropped; `/mock/` and `/mock` are the
    /// same API.
    pub fn new(root: impl Into<String>, name: impl Into<String>) -> Self {
        let mut root = root.into();
        while root.len() > 1 && root.ends_with('/') {
            root.pop();
        }
        Self {
            root,
            name: name.into(),
            version: String::new(),
            title: String::new(),
            doc: String::new(),
            middleware: Vec::new(),
            routes: Vec::new(),
            renderers: Vec::new(),
            allow_insecure: false,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Appends API-wide middleware. Runs after process-wide middleware and
    /// before route middleware.
    pub fn middleware(mut self, mw: impl Middleware) -> Self {
        self.middleware.push(Arc::new(mw));
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Adds a renderer. The first one added is the default; the others are
    /// reachable through `Accept` negotiation. With none, JSON is used.
    pub fn renderer(mut self, renderer: impl Renderer) -> Self {
        self.renderers.push(Arc::new(renderer));
        self
    }

    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// The root without slashes, as used in self-test endpoint paths.
    pub fn root_name(&self) -> &str {
        self.root.trim_matches('/')
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn is_insecure_allowed(&self) -> bool {
        self.allow_insecure
    }

    /// `root + route_path`.
    pub fn full_path(&self, route_path: &str) -> String {
        if self.root == "/" {
            return route_path.to_owned();
        }
        format!("{}{}", self.root, route_path)
    }

    /// Fills in defaults that only make sense once registration is done.
    pub(crate) fn finalize(&mut self) {
        if self.renderers.is_empty() {
            self.renderers.push(Arc::new(JsonRenderer));
        }
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("root", &self.root)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("routes", &self.routes)
            .field("allow_insecure", &self.allow_insecure)
            .finish_non_exhaustive()
    }
}
