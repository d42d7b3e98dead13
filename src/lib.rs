//! # trellis
//!
//! Declarative HTTP API composition for Rust services behind a reverse proxy,
//! with self-tests you can call over the network.
//!
//! ## The contract
//!
//! A service describes itself as data: [`Api`]s with a root path, shared
//! middleware and renderers, and [`Route`]s with a pattern, methods, a
//! handler, route middleware and an optional [`TestDescriptor`]. trellis owns
//! everything between the socket and the handler:
//!
//! - Route matching with `{name}` placeholders, in registration order
//! - Middleware chains: process-wide, then API, then route
//! - One error-to-status translation point, with coded JSON error envelopes
//! - Content-negotiated rendering (JSON, JSONP, plain text, your own)
//! - `GET /test/{apiRoot}/warning|critical`, running every declared test
//!   against the live dispatch path and reporting pass/fail
//!
//! TLS termination, rate limiting and body-size limits stay with the proxy.
//! The proxy reports TLS through `X-Forwarded-Proto: https`; APIs refuse
//! other requests unless they opt into [`Api::allow_insecure`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde::Deserialize;
//! use serde_json::json;
//! use trellis::middleware::{SetHeader, Trace};
//! use trellis::{
//!     Api, Bind, Context, Field, Input, Method, Outcome, Params, Registry, Route, Server,
//!     TestDescriptor,
//! };
//!
//! #[derive(Deserialize)]
//! struct Greet {
//!     name: String,
//!     greeting: Option<String>,
//! }
//!
//! impl Input for Greet {
//!     const FIELDS: &'static [Field] = &[Field::required("name"), Field::optional("greeting")];
//!
//!     async fn handle(self, _ctx: &mut Context) -> Outcome {
//!         let greeting = self.greeting.unwrap_or_else(|| "hello".to_owned());
//!         Ok(json!({ "message": format!("{greeting}, {}", self.name) }))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let api = Api::new("/greeter", "greeter")
//!         .with_version("1.0")
//!         .middleware(SetHeader::from_static("x-served-by", "greeter"))
//!         .route(
//!             Route::new("/greet/{name}", Method::Get, Bind::<Greet>::new())
//!                 .with_description("greets someone")
//!                 .test(TestDescriptor::critical(|t| Box::pin(async move {
//!                     let req = t.new_request(Method::Get, Params::from([("name", "ops")]), None);
//!                     if let Err(e) = t.json_request::<serde_json::Value>(req).await {
//!                         t.fail(e.to_string());
//!                     }
//!                 }))),
//!         );
//!
//!     let dispatcher = Registry::new()
//!         .middleware(Trace)
//!         .add_api(api)
//!         .build()
//!         .unwrap();
//!
//!     Server::bind("0.0.0.0:9944").serve(dispatcher).await.unwrap();
//! }
//! ```

mod api;
mod bind;
mod config;
mod context;
mod dispatcher;
mod error;
mod handler;
mod harness;
mod method;
mod params;
mod registry;
mod render;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use api::{Api, Route};
pub use bind::{Bind, Bound, Field, Input, bind_params};
pub use config::ServerConfig;
pub use context::Context;
pub use dispatcher::{Dispatcher, HEADER_PROCESSING_TIME};
pub use error::{
    ConfigError, Error, ErrorCode, RegistryError, RouteError, ServerError, is_hijacked,
};
pub use handler::{BoxFuture, Handler, HandlerFn, Outcome, VoidHandler, handler_fn};
pub use harness::{Severity, TestContext, TestDescriptor};
pub use method::{Method, MethodSet};
pub use params::Params;
pub use registry::Registry;
pub use render::{
    CALLBACK_PARAM, Envelope, JsonRenderer, RenderError, RenderFn, Renderer, TextRenderer,
    negotiate, render_fn, write_error,
};
pub use request::{HEADER_REQUEST_ID, Request, RequestBuilder};
pub use response::{ContentType, Response};
pub use router::{Pattern, Resolution, RouteTable, format_path};
pub use server::Server;
