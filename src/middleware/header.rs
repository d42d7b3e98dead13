use http::header::{HeaderName, HeaderValue};

use crate::context::Context;
use crate::handler::{BoxFuture, Outcome};

use super::{Middleware, Next};

/// Appends a fixed response header, then continues the chain.
///
/// Appending (rather than replacing) means several `SetHeader`s with the same
/// name leave one value each, in chain order.
#[derive(Clone, Debug)]
pub struct SetHeader {
    name: HeaderName,
    value: HeaderValue,
}

impl SetHeader {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }

    /// # Panics
    ///
    /// Panics if `name` is not a lowercase header name or `value` contains
    /// characters not allowed in a header value.
    pub fn from_static(name: &'static str, value: &'static str) -> Self {
        Self::new(HeaderName::from_static(name), HeaderValue::from_static(value))
    }
}

impl Middleware for SetHeader {
    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        ctx.response_mut()
            .headers_mut()
            .append(self.name.clone(), self.value.clone());
        next.run(ctx)
    }
}
