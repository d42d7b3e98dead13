//! Request dispatch: route resolution, chain execution, timing and rendering.
//!
//! # Pipeline
//!
//! ```text
//! Request
//!   ↓ RouteTable::resolve           404 / 405 rendered here, no middleware
//!   ↓ transport check               403 unless secure or allow_insecure
//!   ↓ Chain::build(global, api, route)
//!   ↓ chain.run(&mut ctx)           timed
//!   ↓ Err(Hijacked)?                response returned exactly as written
//!   ↓ x-processing-time, x-request-id
//!   ↓ renderer: route override → Accept negotiation → JSON
//! Response
//! ```
//!
//! The dispatcher is the single place where an [`Error`] becomes a status
//! code. It is immutable once built and cheap to clone; the server and the
//! self-test harness both drive requests through [`Dispatcher::dispatch`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use http::header::{ACCEPT, ALLOW};
use http::request::Parts;
use tracing::{debug, error, warn};

use crate::api::{Api, Route};
use crate::context::Context;
use crate::error::{Error, ErrorCode};
use crate::handler::Outcome;
use crate::method::{Method, MethodSet};
use crate::middleware::{Chain, Middleware};
use crate::render::{Envelope, JsonRenderer, Renderer, negotiate, write_envelope, write_error};
use crate::request::{HEADER_REQUEST_ID, Request, request_id_from};
use crate::response::Response;
use crate::router::{Resolution, RouteTable};

/// Milliseconds spent in the middleware chain, three decimals.
pub const HEADER_PROCESSING_TIME: &str = "x-processing-time";

/// What a route-table entry resolves to.
pub(crate) struct Target {
    pub(crate) api: Arc<Api>,
    pub(crate) route: Route,
}

struct Inner {
    routes: RouteTable<Target>,
    middleware: Vec<Arc<dyn Middleware>>,
    apis: Vec<Arc<Api>>,
}

/// The frozen routing state of a service.
///
/// Produced by [`Registry::build`](crate::Registry::build). Clones share the
/// same table.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub(crate) fn new(
        routes: RouteTable<Target>,
        middleware: Vec<Arc<dyn Middleware>>,
        apis: Vec<Arc<Api>>,
    ) -> Self {
        Self { inner: Arc::new(Inner { routes, middleware, apis }) }
    }

    /// Registered APIs, in registration order.
    pub fn apis(&self) -> impl Iterator<Item = &Api> {
        self.inner.apis.iter().map(|a| &**a)
    }

    /// Number of routes, self-test endpoints included.
    pub fn route_count(&self) -> usize {
        self.inner.routes.len()
    }

    /// Serves one request end to end. Never fails: every outcome, including
    /// unknown routes and render failures, becomes a response.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let started = Instant::now();

        let (target, params) = match self.inner.routes.resolve(req.method(), req.path()) {
            Resolution::Found(target, params) => (target, params),
            Resolution::NotFound => {
                let (res, err) = unresolved(req.method().as_str(), req.path(), MethodSet::empty());
                return finish(res, &req, Err(err), started, &JsonRenderer);
            }
            Resolution::MethodNotAllowed(allowed) => {
                let (res, err) = unresolved(req.method().as_str(), req.path(), allowed);
                return finish(res, &req, Err(err), started, &JsonRenderer);
            }
        };
        let renderer = select_renderer(target, &req);

        if !target.api.allow_insecure && !req.is_secure() {
            let err = Error::with_code("insecure access denied", ErrorCode::InsecureAccessDenied);
            return finish(Response::new(), &req, Err(err), started, renderer);
        }

        req.params = params;
        let chain = Chain::build(
            [
                &self.inner.middleware[..],
                &target.api.middleware[..],
                &target.route.middleware[..],
            ],
            Arc::clone(&target.route.handler),
        );

        let mut ctx = Context::with_dispatcher(req, self.clone());
        let outcome = chain.run(&mut ctx).await;
        let (req, res) = ctx.into_parts();

        if outcome.as_ref().is_err_and(Error::is_hijacked) {
            debug!(method = %req.method(), path = %req.path(), "response hijacked");
            return res;
        }
        finish(res, &req, outcome, started, renderer)
    }

    /// Answers a request whose method is none of the known ones: `405` with
    /// the methods the path does serve, or `404` if it serves none.
    pub(crate) fn reject_method(&self, head: &Parts) -> Response {
        let started = Instant::now();
        let path = head.uri.path();
        let (res, err) = unresolved(head.method.as_str(), path, self.inner.routes.allowed(path));
        reject(res, head, err, started)
    }

    /// Answers a request whose body could not be read with `400`.
    pub(crate) fn reject_body(&self, head: &Parts, cause: impl fmt::Display) -> Response {
        let started = Instant::now();
        let err = Error::with_code(format!("unreadable request body: {cause}"), ErrorCode::BadRequest);
        reject(Response::new(), head, err, started)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.inner.routes.len())
            .field("middleware", &self.inner.middleware.len())
            .field("apis", &self.inner.apis)
            .finish()
    }
}

/// Route override, then negotiation among the API's renderers.
fn select_renderer<'t>(target: &'t Target, req: &Request) -> &'t dyn Renderer {
    if let Some(r) = &target.route.renderer {
        return &**r;
    }
    negotiate(&target.api.renderers, req.header(ACCEPT.as_str())).unwrap_or(&JsonRenderer)
}

/// The `404` or `405` for a path no route serves with this method. `allowed`
/// goes out in the `Allow` header.
fn unresolved(method: &str, path: &str, allowed: MethodSet) -> (Response, Error) {
    let mut res = Response::new();
    if allowed.is_empty() {
        return (res, Error::with_code(format!("no route for {path}"), ErrorCode::NotFound));
    }
    let allow: Vec<&str> = allowed.iter().map(Method::as_str).collect();
    if let Err(e) = res.insert_header(ALLOW, allow.join(", ")) {
        warn!(error = %e, "could not set allow header");
    }
    let err = Error::with_code(format!("method {method} not allowed for {path}"), ErrorCode::MethodNotAllowed);
    (res, err)
}

/// Maps the outcome to a status, stamps the timing and request-id headers and
/// renders.
fn finish(
    mut res: Response,
    req: &Request,
    outcome: Outcome,
    started: Instant,
    renderer: &dyn Renderer,
) -> Response {
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let envelope = match outcome {
        Ok(value) => Envelope::success(value, elapsed_ms, req.request_id()),
        Err(err) => failure(&mut res, &err, elapsed_ms, req.request_id()),
    };
    stamp(&mut res, elapsed_ms, req.request_id());

    if let Err(e) = renderer.render(&envelope, &mut res, req) {
        warn!(path = %req.path(), error = %e, "render failed");
        write_error(&mut res, &format!("render error: {e}"));
    }

    log_served(req.method().as_str(), req.path(), &res, &envelope, elapsed_ms);
    res
}

/// [`finish`] for requests that never became a [`Request`]. Always JSON.
fn reject(mut res: Response, head: &Parts, err: Error, started: Instant) -> Response {
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    let request_id = request_id_from(&head.headers);

    let envelope = failure(&mut res, &err, elapsed_ms, &request_id);
    stamp(&mut res, elapsed_ms, &request_id);

    if let Err(e) = write_envelope(&envelope, &mut res) {
        write_error(&mut res, &format!("render error: {e}"));
    }

    log_served(head.method.as_str(), head.uri.path(), &res, &envelope, elapsed_ms);
    res
}

fn failure(res: &mut Response, err: &Error, elapsed_ms: f64, request_id: &str) -> Envelope {
    if let Some(status) = err.status() {
        res.set_status(status);
    }
    Envelope::failure(err, elapsed_ms, request_id)
}

fn stamp(res: &mut Response, elapsed_ms: f64, request_id: &str) {
    if let Err(e) = res.insert_header(HEADER_PROCESSING_TIME, format!("{elapsed_ms:.3}")) {
        warn!(error = %e, "could not set processing time header");
    }
    if let Err(e) = res.insert_header(HEADER_REQUEST_ID, request_id) {
        warn!(error = %e, "could not set request id header");
    }
}

fn log_served(method: &str, path: &str, res: &Response, envelope: &Envelope, elapsed_ms: f64) {
    let status = res.status();
    if status.is_server_error() {
        error!(
            method,
            path,
            status = status.as_u16(),
            error = %envelope.error_string,
            "request failed"
        );
    } else {
        debug!(method, path, status = status.as_u16(), elapsed_ms, "request served");
    }
}

impl Default for Dispatcher {
    /// A dispatcher with no routes; every request is a `404`.
    fn default() -> Self {
        Self::new(RouteTable::new(), Vec::new(), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;

    use http::StatusCode;
    use http::header::{HeaderName, HeaderValue};
    use serde_json::{Value, json};

    use super::*;
    use crate::api::Route;
    use crate::handler::handler_fn;
    use crate::middleware::{SetHeader, from_fn};
    use crate::registry::Registry;
    use crate::render::{RenderError, TextRenderer, render_fn};

    fn dispatcher(api: Api) -> Dispatcher {
        Registry::new().self_tests(false).add_api(api).build().unwrap()
    }

    fn get(path: &str) -> Request {
        Request::builder(Method::Get, path).build()
    }

    fn body_json(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[tokio::test]
    async fn success_is_bare_value_with_headers() {
        let d = dispatcher(Api::new("/a", "a").allow_insecure(true).route(Route::new(
            "/echo/{word}",
            Method::Get,
            handler_fn(|ctx| {
                Box::pin(async move { Ok(json!({ "word": ctx.request().param("word") })) })
            }),
        )));

        let res = d
            .dispatch(
                Request::builder(Method::Get, "/a/echo/hi")
                    .header(HeaderName::from_static("x-request-id"), HeaderValue::from_static("abc"))
                    .build(),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(&res), json!({ "word": "hi" }));
        assert_eq!(res.header("x-request-id"), Some("abc"));

        let pt = res.header(HEADER_PROCESSING_TIME).unwrap();
        assert!(pt.parse::<f64>().is_ok());
        assert_eq!(pt.split('.').nth(1).map(str::len), Some(3));
    }

    #[tokio::test]
    async fn errors_map_to_status_and_envelope() {
        let d = dispatcher(Api::new("/a", "a").allow_insecure(true).route(Route::new(
            "/deny",
            Method::Get,
            handler_fn(|_| Box::pin(async { Err(Error::with_code("who are you", ErrorCode::Unauthorized)) })),
        )));

        let res = d.dispatch(get("/a/deny")).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(&res);
        assert_eq!(body["errorString"], "who are you");
        assert_eq!(body["errorCode"], -9);
        assert!(body.get("response").is_none());
        assert!(body["requestId"].as_str().is_some_and(|s| !s.is_empty()));
    }

    #[tokio::test]
    async fn unresolved_requests() {
        let d = dispatcher(
            Api::new("/a", "a")
                .allow_insecure(true)
                .route(Route::new("/x", Method::Get | Method::Put, crate::VoidHandler)),
        );

        let res = d.dispatch(get("/a/nope")).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(&res)["errorCode"], -12);

        let res = d.dispatch(Request::builder(Method::Post, "/a/x").build()).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("GET, PUT"));
        assert!(res.header(HEADER_PROCESSING_TIME).is_some());
    }

    #[tokio::test]
    async fn insecure_transport_is_refused() {
        let d = dispatcher(Api::new("/a", "a").route(Route::new("/x", Method::Get, crate::VoidHandler)));

        let res = d.dispatch(get("/a/x")).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(&res)["errorCode"], -10);

        let res = d
            .dispatch(
                Request::builder(Method::Get, "/a/x")
                    .header(
                        HeaderName::from_static("x-forwarded-proto"),
                        HeaderValue::from_static("https"),
                    )
                    .build(),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn hijacked_response_is_untouched() {
        let d = dispatcher(Api::new("/a", "a").allow_insecure(true).route(Route::new(
            "/raw",
            Method::Get,
            handler_fn(|ctx| {
                Box::pin(async move {
                    ctx.response_mut().set_status(StatusCode::ACCEPTED);
                    let _ = ctx.response_mut().write_str("raw bytes");
                    Err(Error::hijacked())
                })
            }),
        )));

        let res = d.dispatch(get("/a/raw")).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(res.text(), "raw bytes");
        assert!(res.header(HEADER_PROCESSING_TIME).is_none());
    }

    #[tokio::test]
    async fn explicit_status_survives_success() {
        let d = dispatcher(Api::new("/a", "a").allow_insecure(true).route(Route::new(
            "/made",
            Method::Post,
            handler_fn(|ctx| {
                Box::pin(async move {
                    ctx.response_mut().set_status(StatusCode::CREATED);
                    Ok(json!({ "id": 1 }))
                })
            }),
        )));
        let res = d.dispatch(Request::builder(Method::Post, "/a/made").build()).await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn middleware_runs_global_api_route() {
        let d = Registry::new()
            .self_tests(false)
            .middleware(SetHeader::from_static("x-middleware-message", "process"))
            .add_api(
                Api::new("/a", "a")
                    .allow_insecure(true)
                    .middleware(SetHeader::from_static("x-middleware-message", "api"))
                    .route(
                        Route::new("/x", Method::Get, crate::VoidHandler)
                            .middleware(SetHeader::from_static("x-middleware-message", "route")),
                    ),
            )
            .build()
            .unwrap();

        let res = d.dispatch(get("/a/x")).await;
        assert_eq!(res.header_values("x-middleware-message"), vec!["process", "api", "route"]);
        assert_eq!(body_json(&res), json!({}));
    }

    #[tokio::test]
    async fn renderer_selection() {
        let d = dispatcher(
            Api::new("/a", "a")
                .allow_insecure(true)
                .renderer(crate::JsonRenderer)
                .renderer(TextRenderer)
                .route(Route::new(
                    "/s",
                    Method::Get,
                    handler_fn(|_| Box::pin(async { Ok(json!("hello")) })),
                ))
                .route(
                    Route::new("/forced", Method::Get, handler_fn(|_| Box::pin(async { Ok(json!("plain")) })))
                        .renderer(TextRenderer),
                ),
        );

        assert_eq!(d.dispatch(get("/a/s")).await.text(), r#""hello""#);

        let res = d
            .dispatch(
                Request::builder(Method::Get, "/a/s")
                    .header(ACCEPT, HeaderValue::from_static("text/plain"))
                    .build(),
            )
            .await;
        assert_eq!(res.text(), "hello");
        assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));

        assert_eq!(d.dispatch(get("/a/forced")).await.text(), "plain");
    }

    #[tokio::test]
    async fn render_failure_falls_back_to_text() {
        let broken = render_fn(
            |_env, res, _req| {
                res.write(b"half-written");
                Err(RenderError::Other("watwat".into()))
            },
            &["application/json"],
        );
        let d = dispatcher(
            Api::new("/a", "a")
                .allow_insecure(true)
                .renderer(broken)
                .route(Route::new("/x", Method::Get, crate::VoidHandler)),
        );

        let res = d.dispatch(get("/a/x")).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.text(), "render error: watwat\n");
    }

    #[tokio::test]
    async fn short_circuit_middleware_result_is_rendered() {
        let d = dispatcher(
            Api::new("/a", "a")
                .allow_insecure(true)
                .middleware(from_fn(|_ctx, _next| {
                    Box::pin(async { Err(Error::with_code("no token", ErrorCode::Unauthorized)) })
                }))
                .route(Route::new("/x", Method::Get, crate::VoidHandler)),
        );
        let res = d.dispatch(get("/a/x")).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(&res)["errorString"], "no token");
    }

    fn head(method: &str, uri: &str) -> Parts {
        let (parts, ()) = http::Request::builder()
            .method(method)
            .uri(uri)
            .header("x-request-id", "r-1")
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[tokio::test]
    async fn rejected_before_dispatch_still_gets_envelope() {
        let d = dispatcher(
            Api::new("/a", "a")
                .allow_insecure(true)
                .route(Route::new("/x", Method::Get | Method::Put, crate::VoidHandler)),
        );

        let res = d.reject_method(&head("BREW", "/a/x"));
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("GET, PUT"));
        assert_eq!(res.header("x-request-id"), Some("r-1"));
        assert!(res.header(HEADER_PROCESSING_TIME).is_some());
        assert_eq!(body_json(&res)["errorCode"], -13);

        let res = d.reject_method(&head("BREW", "/a/elsewhere"));
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(res.header("allow").is_none());

        let res = d.reject_body(&head("POST", "/a/x"), "connection reset");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert!(res.header(HEADER_PROCESSING_TIME).is_some());
        let body = body_json(&res);
        assert_eq!(body["errorCode"], -14);
        assert_eq!(body["errorString"], "unreadable request body: connection reset");
        assert_eq!(body["requestId"], "r-1");
    }

    #[tokio::test]
    async fn empty_dispatcher_is_all_not_found() {
        let res = Dispatcher::default().dispatch(get("/anything")).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
