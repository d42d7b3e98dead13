use tokio::net::TcpListener;
use trellis::{Dispatcher, Server};

/// Serves `dispatcher` on an ephemeral local port for the rest of the test
/// and returns its base URL.
pub async fn spawn(dispatcher: Dispatcher) -> String {
    spawn_with(dispatcher, |server| server).await
}

/// Like [`spawn`], with a chance to adjust the server first.
pub async fn spawn_with(dispatcher: Dispatcher, configure: impl FnOnce(Server) -> Server) -> String {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = configure(Server::from_listener(listener));
    tokio::spawn(async move {
        server
            .serve_with_shutdown(dispatcher, std::future::pending())
            .await
            .unwrap();
    });
    format!("http://{addr}")
}
