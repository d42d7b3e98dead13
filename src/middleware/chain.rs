//! Per-request composition of middleware around a handler.

use std::sync::Arc;

use crate::bind::{bind_params, missing_error};
use crate::context::Context;
use crate::handler::{BoxFuture, Handler, Outcome};

use super::{Middleware, Next};

/// An immutable middleware chain terminated by a handler.
///
/// Built fresh for every request from ordered segments (process-wide, API,
/// route) that are concatenated as given. Execution order is exactly the
/// concatenation order; the last middleware's [`Next`] is the handler.
pub struct Chain {
    middleware: Vec<Arc<dyn Middleware>>,
    handler: Arc<dyn Handler>,
}

impl Chain {
    pub fn build<'s, I>(segments: I, handler: Arc<dyn Handler>) -> Self
    where
        I: IntoIterator<Item = &'s [Arc<dyn Middleware>]>,
    {
        let middleware = segments.into_iter().flatten().cloned().collect();
        Self { middleware, handler }
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    pub async fn run(&self, ctx: &mut Context) -> Outcome {
        Next::new(&self.middleware, &*self.handler).run(ctx).await
    }
}

/// The end of every chain: presence validation of the handler's declared
/// fields, then the handler itself.
pub(super) fn terminal<'b>(handler: &'b dyn Handler, ctx: &'b mut Context) -> BoxFuture<'b, Outcome> {
    let fields = handler.fields();
    if fields.iter().any(|f| f.required) {
        let bound = bind_params(fields, &ctx.request().values());
        if !bound.missing.is_empty() {
            let err = missing_error(&bound.missing);
            return Box::pin(async move { Err(err) });
        }
    }
    handler.handle(ctx)
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;
    use std::sync::atomic::{AtomicBool, Ordering};

    use serde_json::{Value, json};

    use super::*;
    use crate::bind::Field;
    use crate::error::{Error, ErrorCode};
    use crate::handler::handler_fn;
    use crate::method::Method;
    use crate::middleware::{SetHeader, from_fn};
    use crate::request::Request;

    fn ctx() -> Context {
        Context::new(Request::builder(Method::Get, "/").build())
    }

    fn writer(text: &'static str) -> Arc<dyn Middleware> {
        Arc::new(from_fn(move |ctx, next| {
            Box::pin(async move {
                let _ = ctx.response_mut().write_str(text);
                next.run(ctx).await
            })
        }))
    }

    #[tokio::test]
    async fn runs_in_registration_order() {
        let end: Arc<dyn Handler> = Arc::new(handler_fn(|ctx| {
            Box::pin(async move {
                let _ = ctx.response_mut().write_str("mw3");
                Ok(Value::Null)
            })
        }));
        let chain = Chain::build([&[writer("mw1,")][..], &[writer("mw2,")][..]], end);
        assert_eq!(chain.len(), 2);

        let mut ctx = ctx();
        chain.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.response().text(), "mw1,mw2,mw3");
    }

    #[tokio::test]
    async fn headers_follow_segment_order() {
        let global: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(SetHeader::from_static("x-middleware-message", "global"))];
        let api: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(SetHeader::from_static("x-middleware-message", "api"))];
        let route: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(SetHeader::from_static("x-middleware-message", "route"))];
        let end: Arc<dyn Handler> = Arc::new(crate::VoidHandler);

        let chain = Chain::build([&global[..], &api[..], &route[..]], end);
        let mut ctx = ctx();
        chain.run(&mut ctx).await.unwrap();
        assert_eq!(
            ctx.response().header_values("x-middleware-message"),
            vec!["global", "api", "route"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_the_rest() {
        static HANDLER_RAN: AtomicBool = AtomicBool::new(false);
        static LATER_RAN: AtomicBool = AtomicBool::new(false);

        let reject: Arc<dyn Middleware> = Arc::new(from_fn(|ctx, _next| {
            Box::pin(async move {
                let _ = ctx.response_mut().append_header("x-rejected-by", "auth");
                Err(Error::with_code("no token", ErrorCode::Unauthorized))
            })
        }));
        let later: Arc<dyn Middleware> = Arc::new(from_fn(|ctx, next| {
            Box::pin(async move {
                LATER_RAN.store(true, Ordering::SeqCst);
                next.run(ctx).await
            })
        }));
        let end: Arc<dyn Handler> = Arc::new(handler_fn(|_ctx| {
            Box::pin(async {
                HANDLER_RAN.store(true, Ordering::SeqCst);
                Ok(Value::Null)
            })
        }));

        let chain = Chain::build([&[writer("first,"), reject, later][..]], end);
        let mut ctx = ctx();
        let err = chain.run(&mut ctx).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::Unauthorized);
        assert!(!HANDLER_RAN.load(Ordering::SeqCst));
        assert!(!LATER_RAN.load(Ordering::SeqCst));
        assert_eq!(ctx.response().text(), "first,");
        assert_eq!(ctx.response().header("x-rejected-by"), Some("auth"));
    }

    #[tokio::test]
    async fn short_circuit_value_is_the_result() {
        let cached: Arc<dyn Middleware> =
            Arc::new(from_fn(|_ctx, _next| Box::pin(async { Ok(json!({ "cached": true })) })));
        let end: Arc<dyn Handler> =
            Arc::new(handler_fn(|_ctx| Box::pin(async { Ok(json!({ "cached": false })) })));

        let chain = Chain::build([&[cached][..]], end);
        let mut ctx = ctx();
        assert_eq!(chain.run(&mut ctx).await.unwrap(), json!({ "cached": true }));
    }

    #[tokio::test]
    async fn writes_after_next_are_kept() {
        let wrap: Arc<dyn Middleware> = Arc::new(from_fn(|ctx, next| {
            Box::pin(async move {
                let _ = ctx.response_mut().write_str("<");
                let outcome = next.run(ctx).await;
                let _ = ctx.response_mut().write_str(">");
                outcome
            })
        }));
        let end: Arc<dyn Handler> = Arc::new(handler_fn(|ctx| {
            Box::pin(async move {
                let _ = ctx.response_mut().write_str("body");
                Ok(Value::Null)
            })
        }));
        let chain = Chain::build([&[wrap][..]], end);
        let mut ctx = ctx();
        chain.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.response().text(), "<body>");
    }

    static STRICT_RAN: AtomicBool = AtomicBool::new(false);

    struct Strict;

    impl Handler for Strict {
        fn handle<'a>(&'a self, _ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
            Box::pin(async {
                STRICT_RAN.store(true, Ordering::SeqCst);
                Ok(Value::Null)
            })
        }

        fn fields(&self) -> &[Field] {
            const FIELDS: &[Field] =
                &[Field::required("foo"), Field::required("bar"), Field::optional("baz")];
            FIELDS
        }
    }

    #[tokio::test]
    async fn missing_required_fields_are_rejected_before_the_handler() {
        let chain = Chain::build([&[writer("seen,")][..]], Arc::new(Strict));
        let mut ctx = Context::new(Request::builder(Method::Get, "/").query("foo", "f").build());
        let err = chain.run(&mut ctx).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
        assert!(err.message().contains("bar"));
        assert!(!err.message().contains("foo"));
        assert!(!STRICT_RAN.load(Ordering::SeqCst));
        // middleware still ran
        assert_eq!(ctx.response().text(), "seen,");
    }
}
