//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`; no new connections are made.
//! 2. Letting every in-flight connection task run to completion. Requests in
//!    progress finish; idle keep-alive connections close once the idle
//!    timeout passes.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Keep `connection_timeout_secs` below `terminationGracePeriodSeconds` so an
//! idle keep-alive connection cannot hold up the exit.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ConfigError, ServerError};
use crate::method::Method;
use crate::request::Request;

const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

enum Listen {
    Addr(SocketAddr),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    listen: Listen,
    connection_timeout: Option<Duration>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string. Use
    /// [`from_config`](Server::from_config) to get an error instead.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use trellis::Server;
    /// let server = Server::bind("0.0.0.0:9944");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { listen: Listen::Addr(addr), connection_timeout: Some(DEFAULT_CONNECTION_TIMEOUT) }
    }

    /// Serves on an already bound listener, e.g. one bound to port `0` in
    /// tests.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self {
            listen: Listen::Listener(listener),
            connection_timeout: Some(DEFAULT_CONNECTION_TIMEOUT),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            listen: Listen::Addr(config.listen_addr()?),
            connection_timeout: config.connection_timeout(),
        })
    }

    /// How long an HTTP/1 connection may sit waiting for the next request
    /// head; `None` disables it.
    pub fn connection_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Starts accepting connections and dispatching them through
    /// `dispatcher`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight connections completing).
    pub async fn serve(self, dispatcher: Dispatcher) -> Result<(), ServerError> {
        self.serve_with_shutdown(dispatcher, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops accepting when `signal`
    /// resolves instead of on OS signals.
    pub async fn serve_with_shutdown<F>(self, dispatcher: Dispatcher, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = match self.listen {
            Listen::Addr(addr) => TcpListener::bind(addr).await?,
            Listen::Listener(listener) => listener,
        };
        let idle_timeout = self.connection_timeout;

        info!(addr = %listener.local_addr()?, routes = dispatcher.route_count(), "trellis listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal immediately stops
                // accepting new connections, even if more are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = dispatcher.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection, not once
                        // per connection.
                        let svc = service_fn(move |req| {
                            let dispatcher = dispatcher.clone();
                            async move { handle(dispatcher, req).await }
                        });

                        let mut builder = ConnBuilder::new(TokioExecutor::new());
                        if let Some(limit) = idle_timeout {
                            // Covers the wait for each request head, so an idle
                            // keep-alive connection is closed but a slow handler
                            // is not cut off.
                            builder.http1().timer(TokioTimer::new()).header_read_timeout(limit);
                        }
                        // TODO: bound idle HTTP/2 connections as well.
                        let result = builder.serve_connection(io, svc).await;
                        if let Err(e) = result {
                            debug!(peer = %remote_addr, "connection closed: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("trellis stopped");
        Ok(())
    }
}

// ── Request entry ─────────────────────────────────────────────────────────────

/// Reads the body, converts the request and hands it to the dispatcher.
///
/// The error type is [`Infallible`]: every failure becomes a response, so
/// hyper never sees an error.
async fn handle(
    dispatcher: Dispatcher,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let Ok(method) = Method::try_from(&parts.method) else {
        debug!(method = %parts.method, "unsupported method");
        return Ok(dispatcher.reject_method(&parts).into_inner());
    };

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(path = %parts.uri.path(), "unreadable request body: {e}");
            return Ok(dispatcher.reject_body(&parts, e).into_inner());
        }
    };

    Ok(dispatcher.dispatch(Request::from_parts(method, parts, body)).await.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_controls_idle_timeout() {
        let cfg = ServerConfig::from_toml("listen = \"127.0.0.1:0\"\nconnection_timeout_secs = 0").unwrap();
        let server = Server::from_config(&cfg).unwrap();
        assert_eq!(server.connection_timeout, None);
        assert!(matches!(server.listen, Listen::Addr(a) if a.port() == 0));

        let cfg = ServerConfig { listen: "nope".into(), ..Default::default() };
        assert!(Server::from_config(&cfg).is_err());
    }

    #[tokio::test]
    async fn stops_on_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::from_listener(listener).connection_timeout(Some(Duration::from_secs(1)));
        server
            .serve_with_shutdown(Dispatcher::default(), async {})
            .await
            .unwrap();
    }
}
