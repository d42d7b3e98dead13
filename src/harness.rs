//! Embedded self-tests reachable over HTTP.
//!
//! A route may carry a [`TestDescriptor`]: a severity and an async procedure.
//! For every API the registry mounts two endpoints,
//!
//! ```text
//! GET /test/{apiRoot}/warning
//! GET /test/{apiRoot}/critical
//! ```
//!
//! each of which runs the API's procedures of that severity, in registration
//! order, one after another. Procedures issue real requests through the same
//! [`Dispatcher::dispatch`] path that serves live traffic and record failures
//! on their [`TestContext`]. The endpoint answers `text/plain` with one line
//! per procedure, and `500` if any of them failed:
//!
//! ```text
//! [PASS] GET /mock/test (warning)
//! [FAIL] GET /mock/users/{id} (warning): unexpected status 404 Not Found
//! 1 passed, 1 failed
//! ```
//!
//! A procedure runs on its own tokio task, so a panic is reported as a
//! failure instead of tearing down the connection.

use std::fmt::{self, Write};
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http::header::{HeaderMap, HeaderName};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinError;
use tracing::{info, warn};

use crate::api::{Api, Route};
use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::handler::{BoxFuture, Handler, Outcome};
use crate::method::{Method, MethodSet};
use crate::params::Params;
use crate::render::TextRenderer;
use crate::request::{HEADER_FORWARDED_PROTO, Request};
use crate::response::Response;
use crate::router::format_path;

/// Which self-test endpoint runs a procedure.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning  => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Procedure = dyn for<'a> Fn(&'a mut TestContext) -> BoxFuture<'a, ()> + Send + Sync;

/// A severity-tagged test procedure attached to a route.
///
/// ```rust
/// use trellis::{Method, Params, TestDescriptor};
///
/// let test = TestDescriptor::warning(|t| Box::pin(async move {
///     let req = t.new_request(Method::Get, Params::from([("foo", "bar"), ("bar", "baz")]), None);
///     match t.json_request::<serde_json::Value>(req).await {
///         Ok(v) if v.as_object().is_some_and(|m| !m.is_empty()) => {}
///         Ok(_) => t.fail("value not serialized"),
///         Err(e) => t.fail(format!("request failed: {e}")),
///     }
/// }));
/// # let _ = test;
/// ```
#[derive(Clone)]
pub struct TestDescriptor {
    severity: Severity,
    pub(crate) procedure: Arc<Procedure>,
}

impl TestDescriptor {
    pub fn new<F>(severity: Severity, procedure: F) -> Self
    where
        F: for<'a> Fn(&'a mut TestContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        Self { severity, procedure: Arc::new(procedure) }
    }

    pub fn warning<F>(procedure: F) -> Self
    where
        F: for<'a> Fn(&'a mut TestContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        Self::new(Severity::Warning, procedure)
    }

    pub fn critical<F>(procedure: F) -> Self
    where
        F: for<'a> Fn(&'a mut TestContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        Self::new(Severity::Critical, procedure)
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }
}

impl fmt::Debug for TestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDescriptor")
            .field("severity", &self.severity)
            .finish_non_exhaustive()
    }
}

// ── TestContext ───────────────────────────────────────────────────────────────

/// What a procedure sees: its route, a way to run requests against the live
/// dispatcher, and a failure log. Fresh for every run.
pub struct TestContext {
    dispatcher: Dispatcher,
    path: String,
    methods: MethodSet,
    inherited: HeaderMap,
    failures: Vec<String>,
}

impl TestContext {
    /// Full path pattern of the route under test, placeholders included.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn methods(&self) -> MethodSet {
        self.methods
    }

    /// A request against the route under test.
    ///
    /// `params` fill the path placeholders and are also sent as the query
    /// string. The triggering request's `X-Forwarded-Proto` is carried over.
    pub fn new_request(&self, method: Method, params: Params, body: Option<Bytes>) -> Request {
        let path = format_path(&self.path, &params);
        let mut builder = Request::builder(method, path)
            .query_params(params)
            .headers(&self.inherited);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        builder.build()
    }

    /// Runs `req` through the dispatcher.
    pub async fn execute(&self, req: Request) -> Response {
        self.dispatcher.dispatch(req).await
    }

    /// Runs `req` and decodes a `200` JSON body into `T`. Any other status is
    /// an error carrying the status and body.
    pub async fn json_request<T: DeserializeOwned>(&self, req: Request) -> Result<T, Error> {
        let res = self.execute(req).await;
        if res.status() != StatusCode::OK {
            return Err(Error::new(format!(
                "unexpected status {}: {}",
                res.status(),
                res.text().trim_end()
            )));
        }
        Ok(serde_json::from_slice(res.body())?)
    }

    /// Records a failure. The procedure keeps running.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.failures.push(message.into());
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

// ── Endpoints ─────────────────────────────────────────────────────────────────

struct Case {
    /// `GET|POST /root/path`
    identifier: String,
    path: String,
    methods: MethodSet,
    test: TestDescriptor,
}

struct HarnessEndpoint {
    api: String,
    severity: Severity,
    cases: Vec<Case>,
}

/// The warning and critical endpoints for `api`, with full paths.
pub(crate) fn endpoints(api: &Api) -> [Route; 2] {
    [Severity::Warning, Severity::Critical].map(|severity| {
        let cases = api
            .routes
            .iter()
            .filter_map(|route| {
                let test = route.test.as_ref().filter(|t| t.severity == severity)?;
                let path = api.full_path(&route.path);
                Some(Case {
                    identifier: format!("{} {}", route.methods, path),
                    path,
                    methods: route.methods,
                    test: test.clone(),
                })
            })
            .collect();

        let endpoint = HarnessEndpoint { api: api.root_name().to_owned(), severity, cases };
        Route::new(format!("/test/{}/{}", api.root_name(), severity), Method::Get, endpoint)
            .with_description(format!("{severity} self-tests for {}", api.name))
            .renderer(TextRenderer)
    })
}

impl Handler for HarnessEndpoint {
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let Some(dispatcher) = ctx.dispatcher().cloned() else {
                return Err(Error::new("self-tests need a dispatcher"));
            };
            let inherited = inherited_headers(ctx.request().headers());

            info!(api = %self.api, severity = %self.severity, cases = self.cases.len(), "running self-tests");

            let mut transcript = String::new();
            let mut failed = 0;
            for case in &self.cases {
                let tc = TestContext {
                    dispatcher: dispatcher.clone(),
                    path: case.path.clone(),
                    methods: case.methods,
                    inherited: inherited.clone(),
                    failures: Vec::new(),
                };
                let procedure = Arc::clone(&case.test.procedure);
                let run = tokio::spawn(async move {
                    let mut tc = tc;
                    procedure(&mut tc).await;
                    tc.failures
                });
                let failures = run.await.unwrap_or_else(|e| vec![join_failure(e)]);

                if failures.is_empty() {
                    let _ = writeln!(transcript, "[PASS] {} ({})", case.identifier, self.severity);
                } else {
                    failed += 1;
                    warn!(test = %case.identifier, severity = %self.severity, ?failures, "self-test failed");
                    let _ = writeln!(
                        transcript,
                        "[FAIL] {} ({}): {}",
                        case.identifier,
                        self.severity,
                        failures.join("; ")
                    );
                }
            }
            let _ = writeln!(transcript, "{} passed, {} failed", self.cases.len() - failed, failed);

            if failed > 0 {
                ctx.response_mut().set_status(StatusCode::INTERNAL_SERVER_ERROR);
            }
            Ok(Value::String(transcript))
        })
    }
}

fn inherited_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    if let Some(proto) = headers.get(HEADER_FORWARDED_PROTO) {
        out.insert(HeaderName::from_static(HEADER_FORWARDED_PROTO), proto.clone());
    }
    out
}

fn join_failure(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("procedure aborted: {err}");
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    format!("procedure panicked: {message}")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use http::header::HeaderValue;
    use serde_json::json;

    use super::*;
    use crate::handler::{VoidHandler, handler_fn};
    use crate::registry::Registry;

    fn get(path: &str) -> Request {
        Request::builder(Method::Get, path).build()
    }

    fn echo() -> impl Handler {
        handler_fn(|ctx| {
            Box::pin(async move {
                Ok(json!({
                    "id": ctx.request().param("id"),
                    "q": ctx.request().query("q"),
                }))
            })
        })
    }

    #[tokio::test]
    async fn runs_only_the_requested_severity() {
        static CRITICAL_RAN: AtomicBool = AtomicBool::new(false);

        let d = Registry::new()
            .add_api(
                Api::new("/mock", "testung")
                    .allow_insecure(true)
                    .route(Route::new("/a", Method::Get, VoidHandler).test(TestDescriptor::warning(|t| {
                        Box::pin(async move {
                            let req = t.new_request(Method::Get, Params::new(), None);
                            if let Err(e) = t.json_request::<Value>(req).await {
                                t.fail(e.to_string());
                            }
                        })
                    })))
                    .route(Route::new("/b", Method::Get, VoidHandler).test(TestDescriptor::critical(|_t| {
                        Box::pin(async {
                            CRITICAL_RAN.store(true, Ordering::SeqCst);
                        })
                    }))),
            )
            .build()
            .unwrap();

        let res = d.dispatch(get("/test/mock/warning")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));
        let text = res.text();
        assert!(text.contains("[PASS] GET /mock/a (warning)"), "{text}");
        assert!(text.contains("1 passed, 0 failed"), "{text}");
        assert!(!CRITICAL_RAN.load(Ordering::SeqCst));

        let res = d.dispatch(get("/test/mock/critical")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.text().contains("[PASS] GET /mock/b (critical)"));
        assert!(CRITICAL_RAN.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failures_do_not_abort_the_run() {
        let d = Registry::new()
            .add_api(
                Api::new("/svc", "svc")
                    .allow_insecure(true)
                    .route(Route::new("/bad", Method::Get, VoidHandler).test(TestDescriptor::warning(|t| {
                        Box::pin(async move {
                            t.fail("first");
                            t.fail("second");
                        })
                    })))
                    .route(Route::new("/boom", Method::Get, VoidHandler).test(TestDescriptor::warning(|_t| {
                        Box::pin(async {
                            let explode = true;
                            if explode {
                                panic!("kaboom");
                            }
                        })
                    })))
                    .route(Route::new("/ok", Method::Get, VoidHandler).test(TestDescriptor::warning(|_t| {
                        Box::pin(async {})
                    }))),
            )
            .build()
            .unwrap();

        let res = d.dispatch(get("/test/svc/warning")).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = res.text();
        assert!(text.contains("[FAIL] GET /svc/bad (warning): first; second"), "{text}");
        assert!(text.contains("[FAIL] GET /svc/boom (warning): procedure panicked: kaboom"), "{text}");
        assert!(text.contains("[PASS] GET /svc/ok (warning)"), "{text}");
        assert!(text.contains("1 passed, 2 failed"), "{text}");
    }

    #[tokio::test]
    async fn requests_fill_placeholders_and_query() {
        let d = Registry::new()
            .add_api(Api::new("/u", "users").allow_insecure(true).route(
                Route::new("/users/{id}", Method::Get, echo()).test(TestDescriptor::critical(|t| {
                    Box::pin(async move {
                        let req = t.new_request(Method::Get, Params::from([("id", "7"), ("q", "x")]), None);
                        if req.path() != "/u/users/7" {
                            t.fail(format!("path {}", req.path()));
                        }
                        match t.json_request::<Value>(req).await {
                            Ok(v) if v == json!({ "id": "7", "q": "x" }) => {}
                            Ok(v) => t.fail(format!("body {v}")),
                            Err(e) => t.fail(e.to_string()),
                        }
                        let unbound = t.new_request(Method::Get, Params::new(), None);
                        if unbound.path() != "/u/users/{id}" {
                            t.fail(format!("unbound path {}", unbound.path()));
                        }
                    })
                })),
            ))
            .build()
            .unwrap();

        let res = d.dispatch(get("/test/u/critical")).await;
        assert_eq!(res.status(), StatusCode::OK, "{}", res.text());
    }

    #[tokio::test]
    async fn sub_requests_inherit_transport() {
        let d = Registry::new()
            .add_api(Api::new("/sec", "secure").route(
                Route::new("/x", Method::Get, VoidHandler).test(TestDescriptor::warning(|t| {
                    Box::pin(async move {
                        let req = t.new_request(Method::Get, Params::new(), None);
                        if let Err(e) = t.json_request::<Value>(req).await {
                            t.fail(e.to_string());
                        }
                    })
                })),
            ))
            .build()
            .unwrap();

        let res = d.dispatch(get("/test/sec/warning")).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = d
            .dispatch(
                Request::builder(Method::Get, "/test/sec/warning")
                    .header(
                        HeaderName::from_static("x-forwarded-proto"),
                        HeaderValue::from_static("https"),
                    )
                    .build(),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK, "{}", res.text());
    }

    #[tokio::test]
    async fn no_tests_still_reports() {
        let d = Registry::new()
            .add_api(Api::new("/e", "empty").allow_insecure(true))
            .build()
            .unwrap();
        let res = d.dispatch(get("/test/e/critical")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text(), "0 passed, 0 failed\n");
    }

    #[test]
    fn descriptor_severity() {
        let t = TestDescriptor::critical(|_t| Box::pin(async {}));
        assert_eq!(t.severity(), Severity::Critical);
        assert_eq!(Severity::Warning.to_string(), "warning");
    }
}
