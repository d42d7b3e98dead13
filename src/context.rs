//! Per-request state shared by the middleware chain and the handler.

use crate::dispatcher::Dispatcher;
use crate::request::Request;
use crate::response::Response;

/// The request being served and the response being built for it.
///
/// Created fresh for every request and dropped once the response is sent;
/// nothing in it is shared with other requests.
pub struct Context {
    request: Request,
    response: Response,
    dispatcher: Option<Dispatcher>,
}

impl Context {
    /// A context with no dispatcher attached. Enough to drive a chain or a
    /// handler directly in tests.
    pub fn new(request: Request) -> Self {
        Self { request, response: Response::new(), dispatcher: None }
    }

    pub(crate) fn with_dispatcher(request: Request, dispatcher: Dispatcher) -> Self {
        Self { request, response: Response::new(), dispatcher: Some(dispatcher) }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub(crate) fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.as_ref()
    }

    pub fn into_parts(self) -> (Request, Response) {
        (self.request, self.response)
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}
