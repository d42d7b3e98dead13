//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! Routes hold handlers of different concrete types, so each one is erased
//! behind `Arc<dyn Handler>`. A handler borrows the request [`Context`] for
//! the duration of its future, which is why the future is boxed with the
//! borrow's lifetime:
//!
//! ```text
//! handler_fn(|ctx| Box::pin(async move { … }))   ← user writes this
//!        ↓ Route::new(path, methods, handler)
//! Arc<dyn Handler>                               ← stored on the route
//!        ↓ at request time, end of the chain
//! handler.handle(&mut ctx)                       ← one vtable call
//!        ↓
//! BoxFuture<'_, Outcome>                         ← Ok(value) | Err(error)
//! ```
//!
//! There are two flavours of implementation:
//!
//! - **function** handlers, [`handler_fn`], wrapping a closure;
//! - **value** handlers, any struct implementing [`Handler`] and holding its
//!   own configuration. [`Bind`](crate::Bind) is the typed-input variant that
//!   builds a fresh input value per request.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::bind::Field;
use crate::context::Context;
use crate::error::Error;

/// A heap-allocated future borrowing request state for `'a`.
///
/// `Send` lets tokio move it across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every handler and middleware produces: a value to render, or an
/// error to map to a status.
pub type Outcome = Result<Value, Error>;

/// Produces a result or an error for one request.
pub trait Handler: Send + Sync + 'static {
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome>;

    /// Input fields this handler declares. Required ones are checked for
    /// presence before [`handle`](Handler::handle) runs; a missing one fails
    /// the request with [`ErrorCode::BadRequest`](crate::ErrorCode::BadRequest).
    fn fields(&self) -> &[Field] {
        &[]
    }
}

// ── Function handlers ─────────────────────────────────────────────────────────

/// Newtype wrapper that turns a closure into a [`Handler`].
pub struct HandlerFn<F>(F);

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        (self.0)(ctx)
    }
}

/// Wraps a closure as a handler.
///
/// ```rust
/// use serde_json::json;
/// use trellis::handler_fn;
///
/// let hello = handler_fn(|ctx| Box::pin(async move {
///     let name = ctx.request().param("name").unwrap_or("world").to_owned();
///     Ok(json!({ "hello": name }))
/// }));
/// # let _ = hello;
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    HandlerFn(f)
}

// ── VoidHandler ───────────────────────────────────────────────────────────────

/// Answers every request with an empty JSON object.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoidHandler;

impl Handler for VoidHandler {
    fn handle<'a>(&'a self, _ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        Box::pin(async { Ok(Value::Object(serde_json::Map::new())) })
    }
}
