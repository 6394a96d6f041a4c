use std::net::SocketAddr;
use std::thread::{self, JoinHandle};

use axum::Router;
use camino::Utf8PathBuf;
use console::style;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::error::WatchError;

/// Static file server for the output directory.
#[derive(Debug)]
pub struct HttpServer {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<anyhow::Result<()>>>,
}

impl HttpServer {
    /// Binds before returning, so a taken port is reported to the caller
    /// instead of killing a background thread.
    pub fn start(root: Utf8PathBuf, port: u16) -> Result<Self, WatchError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let bind_err = |source| WatchError::Bind { addr, source };

        let listener = std::net::TcpListener::bind(addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let addr = listener.local_addr().map_err(bind_err)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(WatchError::Runtime)?;

        let (stop, stopped) = oneshot::channel();

        info!(
            "starting a HTTP server on {}",
            style(format!("http://localhost:{}/", addr.port())).yellow()
        );

        let thread = thread::spawn(move || runtime.block_on(serve(listener, root, stopped)));

        Ok(Self {
            addr,
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Lets open connections drain, then joins the server thread.
    pub fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            stop.send(()).ok();
        }

        if let Some(thread) = self.thread.take() {
            match thread.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("HTTP server failed: {e:#}"),
                Err(_) => error!("HTTP server thread panicked"),
            }
        }
    }
}

async fn serve(
    listener: std::net::TcpListener,
    root: Utf8PathBuf,
    stopped: oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::from_std(listener)?;

    let router = Router::new()
        .fallback_service(ServeDir::new(root))
        .layer(CorsLayer::permissive());

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            stopped.await.ok();
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};

    use super::*;

    fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(
            stream,
            "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        )
        .unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_serves_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        std::fs::write(root.join("index.html"), "<p>hello</p>").unwrap();

        let server = HttpServer::start(root, 0).unwrap();

        let response = get(server.addr(), "/index.html");
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("<p>hello</p>"));

        let response = get(server.addr(), "/missing.html");
        assert!(response.starts_with("HTTP/1.1 404"), "{response}");

        server.stop();
    }

    #[test]
    fn test_port_in_use() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = HttpServer::start(Utf8PathBuf::from("."), port).unwrap_err();
        assert!(matches!(err, WatchError::Bind { .. }));
    }
}
