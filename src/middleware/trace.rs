use std::time::Instant;

use tracing::{Instrument, debug, info_span, warn};

use crate::context::Context;
use crate::handler::{BoxFuture, Outcome};

use super::{Middleware, Next};

/// Wraps the rest of the chain in a `request` span carrying method, path and
/// request id, and logs how the chain finished.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        let req = ctx.request();
        let span = info_span!(
            "request",
            method = %req.method(),
            path = %req.path(),
            request_id = %req.request_id(),
        );
        Box::pin(
            async move {
                let started = Instant::now();
                let outcome = next.run(ctx).await;
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                match &outcome {
                    Ok(_) => debug!(elapsed_ms, "chain completed"),
                    Err(e) if e.is_hijacked() => debug!(elapsed_ms, "response hijacked"),
                    Err(e) => warn!(elapsed_ms, code = ?e.code(), error = %e, "chain failed"),
                }
                outcome
            }
            .instrument(span),
        )
    }
}
