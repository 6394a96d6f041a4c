use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tungstenite::WebSocket;

use crate::error::WatchError;

/// Message pushed to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Signal {
    /// Reload the whole page.
    Reload,
    /// Swap the stylesheet served at `path` without reloading.
    Css { path: String },
}

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

/// WebSocket hub that broadcasts [`Signal`]s to every open tab.
#[derive(Debug)]
pub struct Hub {
    port: u16,
    tx: Sender<Signal>,
    stop: Arc<AtomicBool>,
}

impl Hub {
    pub fn bind(port: u16) -> Result<Self, WatchError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let bind_err = |source| WatchError::Bind { addr, source };

        let listener = TcpListener::bind(addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let port = listener.local_addr().map_err(bind_err)?.port();

        let clients = Arc::new(Mutex::new(vec![]));
        let stop = Arc::new(AtomicBool::new(false));

        new_thread_ws_incoming(listener, clients.clone(), stop.clone());
        let tx = new_thread_ws_reload(clients);

        Ok(Self { port, tx, stop })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Fire-and-forget broadcast.
    pub fn push(&self, signal: Signal) {
        if self.tx.send(signal).is_err() {
            tracing::warn!("live reload hub is gone, dropping signal");
        }
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn new_thread_ws_incoming(server: TcpListener, clients: Clients, stop: Arc<AtomicBool>) {
    thread::spawn(move || {
        while !stop.load(Ordering::SeqCst) {
            let stream = match server.accept() {
                Ok((stream, _)) => stream,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                    continue;
                }
                Err(e) => {
                    tracing::warn!("live reload accept failed: {e}");
                    continue;
                }
            };

            if let Err(e) = stream.set_nonblocking(false) {
                tracing::warn!("live reload socket setup failed: {e}");
                continue;
            }

            match tungstenite::accept(stream) {
                Ok(socket) => clients.lock().unwrap().push(socket),
                Err(e) => tracing::warn!("live reload handshake failed: {e}"),
            }
        }
    });
}

fn new_thread_ws_reload(clients: Clients) -> Sender<Signal> {
    let (tx, rx) = std::sync::mpsc::channel::<Signal>();

    thread::spawn(move || {
        while let Ok(signal) = rx.recv() {
            let text = match serde_json::to_string(&signal) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("couldn't encode live reload signal: {e}");
                    continue;
                }
            };

            let mut clients = clients.lock().unwrap();
            let mut broken = vec![];

            for (i, socket) in clients.iter_mut().enumerate() {
                match socket.send(text.clone().into()) {
                    Ok(_) => {}
                    Err(tungstenite::error::Error::Io(e)) => {
                        if e.kind() == ErrorKind::BrokenPipe {
                            broken.push(i);
                        }
                    }
                    Err(tungstenite::error::Error::ConnectionClosed)
                    | Err(tungstenite::error::Error::AlreadyClosed) => broken.push(i),
                    Err(e) => {
                        tracing::error!("live reload send failed: {e:?}");
                    }
                }
            }

            for i in broken.into_iter().rev() {
                clients.remove(i);
            }

            // Close all but the last 10 connections
            let len = clients.len();
            if len > 10 {
                for mut socket in clients.drain(0..len - 10) {
                    socket.close(None).ok();
                }
            }
        }
    });

    tx
}
