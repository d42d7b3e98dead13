//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns: structured tracing, request-id injection,
//! authentication-header inspection, response headers.
//!
//! A middleware receives the request [`Context`] and a [`Next`] bound to the
//! rest of the chain. Calling [`Next::run`] hands control down the chain;
//! not calling it short-circuits, and whatever the middleware returns becomes
//! the result of the whole chain. `Next` is consumed by `run`, so it can be
//! invoked at most once.
//!
//! ```rust
//! use std::fmt::Write;
//! use trellis::middleware;
//!
//! let mw = middleware::from_fn(|ctx, next| Box::pin(async move {
//!     let _ = write!(ctx.response_mut(), "before,");
//!     let outcome = next.run(ctx).await;
//!     let _ = write!(ctx.response_mut(), ",after");
//!     outcome
//! }));
//! # let _ = mw;
//! ```

mod chain;
mod header;
mod trace;

use std::sync::Arc;

use crate::context::Context;
use crate::handler::{BoxFuture, Handler, Outcome};

pub use chain::Chain;
pub use header::SetHeader;
pub use trace::Trace;

/// A request-processing step wrapped around the rest of the chain.
pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome>;
}

/// The remainder of a chain, as seen from one middleware.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(rest: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Handler) -> Self {
        Self { rest, endpoint }
    }

    /// Runs the rest of the chain: the next middleware, or the handler once
    /// every middleware has been entered.
    ///
    /// The context borrow only lasts as long as the returned future, so the
    /// caller can keep writing to the response after awaiting it.
    pub fn run<'b>(self, ctx: &'b mut Context) -> BoxFuture<'b, Outcome>
    where
        'a: 'b,
    {
        match self.rest.split_first() {
            Some((head, rest)) => head.handle(ctx, Next::new(rest, self.endpoint)),
            None => chain::terminal(self.endpoint, ctx),
        }
    }
}

// ── Function middleware ───────────────────────────────────────────────────────

/// Newtype wrapper that turns a closure into a [`Middleware`].
pub struct MiddlewareFn<F>(F);

impl<F> Middleware for MiddlewareFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        (self.0)(ctx, next)
    }
}

/// Wraps a closure as middleware.
pub fn from_fn<F>(f: F) -> MiddlewareFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    MiddlewareFn(f)
}
