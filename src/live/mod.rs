//! Development server: static files over HTTP plus a WebSocket channel
//! that tells open tabs to refresh.

mod http;
mod reload;

use std::sync::atomic::{AtomicBool, Ordering};

pub use crate::live::http::HttpServer;
pub use crate::live::reload::{Hub, Signal};

use crate::config::Config;
use crate::error::WatchError;

static ACTIVE: AtomicBool = AtomicBool::new(false);

/// The one live server a process may own.
#[derive(Debug)]
pub struct LiveServer {
    http: HttpServer,
    hub: Hub,
}

impl LiveServer {
    pub fn start(config: &Config) -> Result<Self, WatchError> {
        if ACTIVE.swap(true, Ordering::SeqCst) {
            return Err(WatchError::AlreadyRunning);
        }

        let started = Hub::bind(config.reload_port).and_then(|hub| {
            let http = HttpServer::start(config.output.clone(), config.port)?;
            Ok(Self { http, hub })
        });

        if started.is_err() {
            ACTIVE.store(false, Ordering::SeqCst);
        }

        started
    }

    pub fn push(&self, signal: Signal) {
        tracing::debug!(?signal, "live push");
        self.hub.push(signal);
    }

    pub fn http_port(&self) -> u16 {
        self.http.addr().port()
    }

    pub fn reload_port(&self) -> u16 {
        self.hub.port()
    }

    pub fn stop(self) {
        self.http.stop();
        drop(self.hub);
        ACTIVE.store(false, Ordering::SeqCst);
    }
}
