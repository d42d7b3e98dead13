//! Binding request parameters into typed handler input.
//!
//! A handler input is a plain struct that derives `Deserialize`, lists the
//! parameters it reads in [`Input::FIELDS`], and implements
//! [`Input::handle`]. Wrapped in [`Bind`], it becomes a route handler:
//!
//! ```rust
//! use serde::Deserialize;
//! use serde_json::json;
//! use trellis::{Bind, Context, Field, Input, Method, Outcome, Route};
//!
//! #[derive(Deserialize)]
//! struct Echo {
//!     foo: String,
//!     bar: String,
//! }
//!
//! impl Input for Echo {
//!     const FIELDS: &'static [Field] = &[Field::required("foo"), Field::required("bar")];
//!
//!     async fn handle(self, _ctx: &mut Context) -> Outcome {
//!         Ok(json!({ "foo": self.foo, "bar": self.bar }))
//!     }
//! }
//!
//! let route = Route::new("/echo", Method::Get, Bind::<Echo>::new());
//! # let _ = route;
//! ```
//!
//! Values are bound as JSON strings; optional fields should be `Option<String>`
//! (or carry `#[serde(default)]`).

use std::future::Future;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::{Error, ErrorCode};
use crate::handler::{BoxFuture, Handler, Outcome};
use crate::params::Params;

/// One declared input parameter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub required: bool,
}

impl Field {
    pub const fn required(name: &'static str) -> Self {
        Self { name, required: true }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self { name, required: false }
    }
}

/// The result of [`bind_params`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bound {
    /// Declared fields that were present, as JSON strings.
    pub values: Map<String, Value>,
    /// Required fields that were absent, in declaration order.
    pub missing: Vec<&'static str>,
}

/// Maps a declared input shape and the raw request parameters to the values
/// that bind and the required names that are missing. Pure: no I/O, no
/// dependence on anything but its arguments. Undeclared parameters are
/// ignored.
pub fn bind_params(shape: &[Field], raw: &Params) -> Bound {
    let mut bound = Bound::default();
    for field in shape {
        match raw.get(field.name) {
            Some(v) => {
                bound.values.insert(field.name.to_owned(), Value::String(v.to_owned()));
            }
            None if field.required => bound.missing.push(field.name),
            None => {}
        }
    }
    bound
}

/// The BadRequest error for a non-empty list of missing fields.
pub(crate) fn missing_error(missing: &[&str]) -> Error {
    Error::with_code(
        format!("missing required parameter(s): {}", missing.join(", ")),
        ErrorCode::BadRequest,
    )
}

/// A typed handler input. See the [module docs](self).
pub trait Input: DeserializeOwned + Send + 'static {
    /// Parameters this input reads.
    const FIELDS: &'static [Field];

    fn handle(self, ctx: &mut Context) -> impl Future<Output = Outcome> + Send;
}

/// Adapts an [`Input`] type into a [`Handler`]. A fresh `T` is bound from
/// the request parameters on every call.
pub struct Bind<T>(PhantomData<fn() -> T>);

impl<T: Input> Bind<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Input> Default for Bind<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Input> Handler for Bind<T> {
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            // Required fields were checked by the chain before this runs.
            let bound = bind_params(T::FIELDS, &ctx.request().values());
            let input: T = serde_json::from_value(Value::Object(bound.values)).map_err(|e| {
                Error::with_code(format!("invalid parameters: {e}"), ErrorCode::BadRequest)
            })?;
            input.handle(ctx).await
        })
    }

    fn fields(&self) -> &[Field] {
        T::FIELDS
    }
}
