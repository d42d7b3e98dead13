//! Minimal trellis example: one API, middleware at every level, typed input
//! and self-tests.
//!
//! Run with:
//!   RUST_LOG=trellis=debug,info cargo run --example basic
//!
//! Try:
//!   curl 'http://localhost:9944/mock/test?foo=f&bar=b'
//!   curl 'http://localhost:9944/mock/test?foo=f&bar=b&callback=show'
//!   curl  http://localhost:9944/mock/test
//!   curl  http://localhost:9944/mock/users/42
//!   curl  http://localhost:9944/test/mock/warning
//!   curl  http://localhost:9944/test/mock/critical

use serde::Deserialize;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use trellis::middleware::{SetHeader, Trace};
use trellis::{
    Api, Bind, Context, ErrorCode, Field, Input, Method, Outcome, Params, Registry, Route, Server,
    ServerConfig, TestDescriptor, VoidHandler, errorf, handler_fn,
};

#[derive(Deserialize)]
struct Echo {
    foo: String,
    bar: String,
}

impl Input for Echo {
    const FIELDS: &'static [Field] = &[Field::required("foo"), Field::required("bar")];

    async fn handle(self, _ctx: &mut Context) -> Outcome {
        Ok(json!({ "foo": self.foo, "bar": self.bar }))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_toml("connection_timeout_secs = 30").expect("config");

    let api = Api::new("/mock", "testung")
        .with_version("1.0")
        .with_title("Testung API!")
        .with_doc("Our fancy testung API")
        .allow_insecure(true)
        .middleware(SetHeader::from_static("x-middleware-message", "Global middleware"))
        .route(
            Route::new("/test", Method::Get, Bind::<Echo>::new())
                .with_description("echoes foo and bar")
                .middleware(SetHeader::from_static("x-middleware-message", "Private middleware"))
                .test(TestDescriptor::warning(|t| {
                    Box::pin(async move {
                        let req = t.new_request(Method::Get, Params::from([("foo", "bar"), ("bar", "baz")]), None);
                        match t.json_request::<Value>(req).await {
                            Ok(v) if v.as_object().is_some_and(|m| !m.is_empty()) => {}
                            Ok(_) => t.fail("value not serialized"),
                            Err(e) => t.fail(format!("request failed: {e}")),
                        }
                    })
                })),
        )
        .route(
            Route::new(
                "/users/{id}",
                Method::Get,
                handler_fn(|ctx| {
                    Box::pin(async move {
                        match ctx.request().param("id") {
                            Some("0") => Err(trellis::Error::with_code("no such user", ErrorCode::NotFound)),
                            Some(id) => Ok(json!({ "id": id, "name": "alice" })),
                            None => Err(errorf!("route without id")),
                        }
                    })
                }),
            )
            .with_description("looks up a user")
            .test(TestDescriptor::critical(|t| {
                Box::pin(async move {
                    let req = t.new_request(Method::Get, Params::from([("id", "42")]), None);
                    if let Err(e) = t.json_request::<Value>(req).await {
                        t.fail(e.to_string());
                    }
                })
            })),
        )
        .route(Route::new("/testvoid", Method::Get, VoidHandler).with_description("testvoid"));

    let dispatcher = Registry::new()
        .middleware(Trace)
        .self_tests(config.self_tests)
        .add_api(api)
        .build()
        .expect("invalid routes");

    Server::from_config(&config)
        .expect("invalid config")
        .serve(dispatcher)
        .await
        .expect("server error");
}
