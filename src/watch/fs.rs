use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camino::Utf8PathBuf;
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{Debouncer, RecommendedCache, new_debouncer};

use crate::error::WatchError;
use crate::watch::Dispatcher;

const POLL: Duration = Duration::from_millis(100);

/// Forwards debounced file-system notifications to a [`Dispatcher`].
pub struct FsWatcher {
    debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FsWatcher {
    /// Watches every root recursively. Raw notifications are merged over
    /// `window` before they reach the dispatcher.
    pub fn spawn(
        dispatcher: Arc<Dispatcher>,
        roots: &[Utf8PathBuf],
        window: Duration,
    ) -> Result<Self, WatchError> {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(window, None, tx)?;

        for root in roots {
            tracing::info!("watching {root}");
            debouncer.watch(root.as_std_path(), RecursiveMode::Recursive)?;
        }

        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let events = match rx.recv_timeout(POLL) {
                        Ok(Ok(events)) => events,
                        Ok(Err(errors)) => {
                            for e in errors {
                                tracing::error!("watch error: {e:?}");
                            }
                            continue;
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };

                    let paths: Vec<PathBuf> = events
                        .iter()
                        .filter(|de| {
                            matches!(
                                de.event.kind,
                                EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
                            )
                        })
                        .flat_map(|de| de.event.paths.iter().cloned())
                        .collect();

                    if paths.is_empty() {
                        continue;
                    }

                    let triggered = dispatcher.dispatch(&paths);
                    tracing::debug!(paths = paths.len(), triggered, "file change batch");
                }
            })
        };

        Ok(Self {
            debouncer: Some(debouncer),
            stop,
            thread: Some(thread),
        })
    }

    /// Stops watching. No further events reach the dispatcher once this
    /// returns.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        drop(self.debouncer.take());

        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("file watcher thread panicked");
        }
    }
}
