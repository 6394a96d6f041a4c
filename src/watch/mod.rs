//! Watch mode is implemented as a three-part system:
//!
//! 1. **Bindings**: each binding pairs a set of absolute glob patterns with
//!    the node to re-run. Every binding owns a worker thread that walks the
//!    state machine below.
//! 2. **File watcher** ([`fs`]): uses `notify` with `notify-debouncer-full` to
//!    monitor the static roots of all patterns recursively and feeds batches
//!    of changed paths into the [`Dispatcher`].
//! 3. **Live reload** ([`crate::live`]): nodes bound here end with a task
//!    that pushes a reload signal to connected browsers.
//!
//! ## The state machine
//!
//! ```text
//! Idle --event--> Triggered --window elapsed--> Running --done--> Idle
//!                     ^                            |
//!                     |                          event
//!                     |                            v
//!                     +-----------done--------- Queued
//! ```
//!
//! Events arriving while Triggered push the deadline back, events arriving
//! while Running or Queued collapse into one follow-up run. A failed run is
//! logged and the binding returns to Idle until the next change.

pub mod fs;
pub mod paths;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glob::{MatchOptions, Pattern};

use crate::engine::Runner;
use crate::graph::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Idle,
    Triggered,
    Running,
    Queued,
}

struct State {
    phase: BindingState,
    deadline: Instant,
    runs: usize,
    closed: bool,
}

struct Slot {
    name: Arc<str>,
    patterns: Vec<Pattern>,
    node: Node,
    state: Mutex<State>,
    wake: Condvar,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// `*` stops at a path separator, only `**` descends.
    fn matches(&self, path: &Path) -> bool {
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        self.patterns.iter().any(|p| p.matches_path_with(path, options))
    }

    fn trigger(&self, debounce: Duration) {
        let mut state = self.lock();

        state.deadline = Instant::now() + debounce;
        state.phase = match state.phase {
            BindingState::Idle | BindingState::Triggered => BindingState::Triggered,
            BindingState::Running | BindingState::Queued => BindingState::Queued,
        };

        self.wake.notify_all();
    }

    /// Blocks until the binding should run. Returns `false` once the binding
    /// was closed and the worker should exit.
    fn wait_for_trigger(&self) -> bool {
        let mut state = self.lock();

        while state.phase == BindingState::Idle && !state.closed {
            state = self.wake.wait(state).unwrap();
        }

        // Let the burst settle.
        while state.phase == BindingState::Triggered && !state.closed {
            let now = Instant::now();
            if now >= state.deadline {
                break;
            }

            let timeout = state.deadline - now;
            state = self.wake.wait_timeout(state, timeout).unwrap().0;
        }

        if state.closed {
            state.phase = BindingState::Idle;
            self.wake.notify_all();
            return false;
        }

        state.phase = BindingState::Running;
        true
    }

    fn finish_run(&self) {
        let mut state = self.lock();

        state.runs += 1;
        state.phase = match state.phase {
            BindingState::Queued if !state.closed => BindingState::Triggered,
            _ => BindingState::Idle,
        };

        self.wake.notify_all();
    }
}

/// Re-runs bound nodes when their patterns see a change.
pub struct Dispatcher {
    runner: Runner,
    debounce: Duration,
    accepting: AtomicBool,
    slots: Vec<Arc<Slot>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(runner: Runner, debounce: Duration) -> Self {
        Self {
            runner,
            debounce,
            accepting: AtomicBool::new(true),
            slots: Vec::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a binding and starts its worker in the Idle state.
    pub fn watch(&mut self, name: &str, patterns: Vec<Pattern>, node: Node) {
        let slot = Arc::new(Slot {
            name: Arc::from(name),
            patterns,
            node,
            state: Mutex::new(State {
                phase: BindingState::Idle,
                deadline: Instant::now(),
                runs: 0,
                closed: false,
            }),
            wake: Condvar::new(),
        });

        let worker = {
            let slot = slot.clone();
            let runner = self.runner.clone();
            thread::spawn(move || work(&slot, &runner))
        };

        self.slots.push(slot);
        self.workers.lock().unwrap().push(worker);
    }

    /// Feeds a change event to a single binding by name.
    pub fn trigger(&self, name: &str) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            return false;
        }

        match self.slots.iter().find(|slot| &*slot.name == name) {
            Some(slot) => {
                slot.trigger(self.debounce);
                true
            }
            None => false,
        }
    }

    /// Feeds a batch of changed paths to every binding whose patterns match
    /// any of them. Returns the number of bindings triggered.
    pub fn dispatch<P: AsRef<Path>>(&self, paths: &[P]) -> usize {
        if !self.accepting.load(Ordering::SeqCst) {
            return 0;
        }

        let mut triggered = 0;
        for slot in &self.slots {
            if paths.iter().any(|path| slot.matches(path.as_ref())) {
                tracing::debug!(binding = %slot.name, "change matched");
                slot.trigger(self.debounce);
                triggered += 1;
            }
        }

        triggered
    }

    pub fn state(&self, name: &str) -> Option<BindingState> {
        self.slot(name).map(|slot| slot.lock().phase)
    }

    /// Number of completed runs of a binding, failed ones included.
    pub fn runs(&self, name: &str) -> Option<usize> {
        self.slot(name).map(|slot| slot.lock().runs)
    }

    /// Waits until every binding is Idle. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let limit = Instant::now() + timeout;

        for slot in &self.slots {
            let remaining = limit.saturating_duration_since(Instant::now());
            let (_state, result) = slot
                .wake
                .wait_timeout_while(slot.lock(), remaining, |state| {
                    state.phase != BindingState::Idle
                })
                .unwrap();

            if result.timed_out() {
                return false;
            }
        }

        true
    }

    /// Stops accepting events, drops runs that have not started yet and
    /// waits for in-flight runs to finish.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);

        for slot in &self.slots {
            let mut state = slot.lock();
            state.closed = true;
            slot.wake.notify_all();
        }

        let workers: Vec<_> = self.workers.lock().unwrap().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("watch worker panicked");
            }
        }
    }

    fn slot(&self, name: &str) -> Option<&Arc<Slot>> {
        self.slots.iter().find(|slot| &*slot.name == name)
    }
}

fn work(slot: &Slot, runner: &Runner) {
    while slot.wait_for_trigger() {
        tracing::info!(binding = %slot.name, "change detected, re-running {}", slot.node);

        if let Err(e) = runner.run(&slot.node) {
            tracing::error!(
                binding = %slot.name,
                failures = e.failures().len(),
                "rebuild failed, waiting for the next change\n{e}"
            );
        }

        slot.finish_run();
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    use super::*;
    use crate::error::TaskError;
    use crate::graph::{serial, task};
    use crate::task::Mode;
    use crate::Config;

    const WINDOW: Duration = Duration::from_millis(60);
    const PATIENCE: Duration = Duration::from_secs(10);

    fn dispatcher() -> Dispatcher {
        let runner = Runner::new(Arc::new(Config::default()), Mode::Dev);
        Dispatcher::new(runner, WINDOW)
    }

    fn counter(name: &'static str) -> (Node, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let node = {
            let count = count.clone();
            serial([task(name, move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            })])
        };
        (node, count)
    }

    /// A task that reports when it starts and blocks until released.
    fn gated() -> (Node, mpsc::Receiver<()>, mpsc::Sender<()>, Arc<AtomicUsize>) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);
        let release_rx = Mutex::new(release_rx);
        let count = Arc::new(AtomicUsize::new(0));

        let node = {
            let count = count.clone();
            serial([task("gated", move |_| {
                started_tx.lock().unwrap().send(()).ok();
                release_rx.lock().unwrap().recv().ok();
                count.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            })])
        };

        (node, started_rx, release_tx, count)
    }

    #[test]
    fn test_burst_while_idle_runs_once() {
        let (node, count) = counter("styles");
        let mut dispatcher = dispatcher();
        dispatcher.watch("styles", vec![], node);

        for _ in 0..10 {
            assert!(dispatcher.trigger("styles"));
        }

        assert!(dispatcher.wait_idle(PATIENCE));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.runs("styles"), Some(1));

        dispatcher.shutdown();
    }

    #[test]
    fn test_burst_while_running_queues_one_follow_up() {
        let (node, started, release, count) = gated();
        let mut dispatcher = dispatcher();
        dispatcher.watch("html", vec![], node);

        dispatcher.trigger("html");
        started.recv_timeout(PATIENCE).unwrap();
        assert_eq!(dispatcher.state("html"), Some(BindingState::Running));

        for _ in 0..10 {
            dispatcher.trigger("html");
        }
        assert_eq!(dispatcher.state("html"), Some(BindingState::Queued));

        release.send(()).unwrap();
        started.recv_timeout(PATIENCE).unwrap();
        release.send(()).unwrap();

        assert!(dispatcher.wait_idle(PATIENCE));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.runs("html"), Some(2));

        dispatcher.shutdown();
    }

    #[test]
    fn test_failed_run_returns_to_idle_without_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let node = {
            let attempts = attempts.clone();
            serial([task("script", move |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(TaskError::transform("js/script.js", "unexpected token"))
            })])
        };

        let mut dispatcher = dispatcher();
        dispatcher.watch("script", vec![], node);

        dispatcher.trigger("script");
        assert!(dispatcher.wait_idle(PATIENCE));
        thread::sleep(WINDOW * 3);

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.state("script"), Some(BindingState::Idle));

        dispatcher.trigger("script");
        assert!(dispatcher.wait_idle(PATIENCE));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        dispatcher.shutdown();
    }

    #[test]
    fn test_dispatch_matches_patterns() {
        let (styles, styles_count) = counter("styles");
        let (html, html_count) = counter("html");

        let mut dispatcher = dispatcher();
        dispatcher.watch("styles", vec![Pattern::new("/site/sass/**/*.scss").unwrap()], styles);
        dispatcher.watch("html", vec![Pattern::new("/site/*.html").unwrap()], html);

        let paths = [
            PathBuf::from("/site/sass/blocks/header.scss"),
            PathBuf::from("/site/sass/style.scss"),
            PathBuf::from("/site/js/script.js"),
        ];
        assert_eq!(dispatcher.dispatch(&paths), 1);

        assert!(dispatcher.wait_idle(PATIENCE));
        assert_eq!(styles_count.load(Ordering::SeqCst), 1);
        assert_eq!(html_count.load(Ordering::SeqCst), 0);

        dispatcher.shutdown();
    }

    #[test]
    fn test_single_star_stays_in_its_directory() {
        let (html, html_count) = counter("html");

        let mut dispatcher = dispatcher();
        dispatcher.watch("html", vec![Pattern::new("/site/*.html").unwrap()], html);

        let nested = [
            PathBuf::from("/site/partials/header.html"),
            PathBuf::from("/site/build/index.html"),
        ];
        assert_eq!(dispatcher.dispatch(&nested), 0);
        assert_eq!(dispatcher.state("html"), Some(BindingState::Idle));

        assert_eq!(dispatcher.dispatch(&[PathBuf::from("/site/index.html")]), 1);
        assert!(dispatcher.wait_idle(PATIENCE));
        assert_eq!(html_count.load(Ordering::SeqCst), 1);

        dispatcher.shutdown();
    }

    #[test]
    fn test_shutdown_lets_in_flight_run_finish() {
        let (node, started, release, count) = gated();
        let mut dispatcher = dispatcher();
        dispatcher.watch("html", vec![], node);

        dispatcher.trigger("html");
        started.recv_timeout(PATIENCE).unwrap();
        dispatcher.trigger("html");

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            release.send(()).unwrap();
        });

        dispatcher.shutdown();
        releaser.join().unwrap();

        // The queued follow-up was dropped, the in-flight run completed.
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.state("html"), Some(BindingState::Idle));
        assert!(!dispatcher.trigger("html"));
    }

    #[test]
    fn test_trigger_unknown_binding() {
        let dispatcher = dispatcher();
        assert!(!dispatcher.trigger("missing"));
        assert_eq!(dispatcher.state("missing"), None);
    }
}
