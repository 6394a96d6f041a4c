//! State of one `dev` invocation: the live server and the installed
//! watchers. Both are created by leaf tasks of the dev graph and torn down
//! together by [`DevSession::shutdown`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::engine::Runner;
use crate::error::WatchError;
use crate::graph::Node;
use crate::live::{LiveServer, Signal};
use crate::task::{Task, TaskContext, TaskResult};
use crate::transform::STYLESHEET;
use crate::watch::fs::FsWatcher;
use crate::watch::paths::{collapse_watch_paths, resolve_watch_path};
use crate::watch::{BindingState, Dispatcher};

/// Globs relative to the source root paired with the node they re-run.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    pub name: &'static str,
    pub globs: Vec<&'static str>,
    pub node: Node,
}

struct Watching {
    dispatcher: Arc<Dispatcher>,
    watcher: FsWatcher,
}

#[derive(Default)]
struct Inner {
    live: Mutex<Option<LiveServer>>,
    watching: Mutex<Option<Watching>>,
}

#[derive(Clone, Default)]
pub struct DevSession {
    inner: Arc<Inner>,
}

impl DevSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_server(&self, config: &Config) -> Result<(), WatchError> {
        let mut live = self.inner.live.lock().unwrap();
        if live.is_some() {
            return Err(WatchError::AlreadyRunning);
        }

        *live = Some(LiveServer::start(config)?);
        Ok(())
    }

    /// Sends a signal to connected browsers. Returns `false` when no server
    /// is running.
    pub fn push(&self, signal: Signal) -> bool {
        match &*self.inner.live.lock().unwrap() {
            Some(live) => {
                live.push(signal);
                true
            }
            None => {
                tracing::debug!(?signal, "no live server, signal dropped");
                false
            }
        }
    }

    /// Registers every binding and starts watching the file system. Globs
    /// whose static root does not exist are logged and skipped.
    pub fn install_watch(&self, runner: &Runner, bindings: Vec<WatchBinding>) -> Result<(), WatchError> {
        let mut watching = self.inner.watching.lock().unwrap();
        if watching.is_some() {
            return Err(WatchError::AlreadyRunning);
        }

        let config = runner.config();
        let mut dispatcher = Dispatcher::new(runner.clone(), config.debounce);
        let mut roots = HashSet::new();

        for binding in bindings {
            let mut patterns = Vec::with_capacity(binding.globs.len());

            for glob in &binding.globs {
                match resolve_watch_path(config.source_path(glob)) {
                    Ok((root, pattern)) => {
                        roots.insert(root);
                        patterns.push(pattern);
                    }
                    Err(e) => tracing::error!("{e}"),
                }
            }

            dispatcher.watch(binding.name, patterns, binding.node);
        }

        let dispatcher = Arc::new(dispatcher);
        let roots = collapse_watch_paths(roots);

        let watcher = match FsWatcher::spawn(dispatcher.clone(), &roots, config.debounce) {
            Ok(watcher) => watcher,
            Err(e) => {
                dispatcher.shutdown();
                return Err(e);
            }
        };

        *watching = Some(Watching {
            dispatcher,
            watcher,
        });

        Ok(())
    }

    pub fn binding_state(&self, name: &str) -> Option<BindingState> {
        let watching = self.inner.watching.lock().unwrap();
        watching.as_ref()?.dispatcher.state(name)
    }

    pub fn binding_runs(&self, name: &str) -> Option<usize> {
        let watching = self.inner.watching.lock().unwrap();
        watching.as_ref()?.dispatcher.runs(name)
    }

    /// Stops the watchers first, so no new runs start, lets in-flight runs
    /// finish, then stops the server.
    pub fn shutdown(&self) {
        let watching = self.inner.watching.lock().unwrap().take();
        if let Some(Watching {
            dispatcher,
            watcher,
        }) = watching
        {
            watcher.stop();
            dispatcher.shutdown();
        }

        let live = self.inner.live.lock().unwrap().take();
        if let Some(live) = live {
            live.stop();
        }

        tracing::info!("dev session stopped");
    }

    /// Leaf that starts the live server.
    pub fn server(&self) -> Node {
        Node::leaf(StartServer {
            session: self.clone(),
        })
    }

    /// Leaf that installs the given bindings.
    pub fn watcher(&self, runner: Runner, bindings: Vec<WatchBinding>) -> Node {
        Node::leaf(InstallWatch {
            session: self.clone(),
            runner,
            bindings,
        })
    }

    /// Leaf that swaps the stylesheet in open tabs.
    pub fn inject(&self) -> Node {
        Node::leaf(Push {
            name: "inject",
            session: self.clone(),
            signal: Signal::Css {
                path: format!("/{STYLESHEET}"),
            },
        })
    }

    /// Leaf that reloads open tabs.
    pub fn reload(&self) -> Node {
        Node::leaf(Push {
            name: "reload",
            session: self.clone(),
            signal: Signal::Reload,
        })
    }
}

struct StartServer {
    session: DevSession,
}

impl Task for StartServer {
    fn name(&self) -> &str {
        "server"
    }

    fn execute(&self, ctx: &TaskContext) -> TaskResult {
        self.session.start_server(ctx.config)?;
        Ok(vec![])
    }
}

struct InstallWatch {
    session: DevSession,
    runner: Runner,
    bindings: Vec<WatchBinding>,
}

impl Task for InstallWatch {
    fn name(&self) -> &str {
        "watch"
    }

    fn execute(&self, _: &TaskContext) -> TaskResult {
        self.session.install_watch(&self.runner, self.bindings.clone())?;
        Ok(vec![])
    }
}

struct Push {
    name: &'static str,
    session: DevSession,
    signal: Signal,
}

impl Task for Push {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, _: &TaskContext) -> TaskResult {
        self.session.push(self.signal.clone());
        Ok(vec![])
    }
}

/// Blocks until the process receives SIGINT or SIGTERM.
pub fn wait_for_shutdown() -> std::io::Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(shutdown_signal())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    use camino::Utf8PathBuf;

    use super::*;
    use crate::graph::{serial, task};
    use crate::io::write_file;
    use crate::task::Mode;

    #[test]
    fn test_push_without_server() {
        let session = DevSession::new();
        assert!(!session.push(Signal::Reload));
    }

    #[test]
    fn test_file_change_reruns_binding() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().canonicalize().unwrap()).unwrap();
        let config = Config {
            source: root.join("source"),
            output: root.join("build"),
            debounce: Duration::from_millis(50),
            ..Config::default()
        };
        write_file(&config.source_path("sass/style.scss"), "a{}").unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let node = {
            let count = count.clone();
            serial([task("styles", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            })])
        };

        let session = DevSession::new();
        let runner = Runner::new(Arc::new(config.clone()), Mode::Dev);
        let bindings = vec![
            WatchBinding {
                name: "styles",
                globs: vec!["sass/**/*.scss"],
                node,
            },
            WatchBinding {
                name: "script",
                globs: vec!["js/script.js"],
                node: serial([]),
            },
        ];
        session.install_watch(&runner, bindings).unwrap();
        assert_eq!(session.binding_state("styles"), Some(BindingState::Idle));

        // Give the backend a moment to register its watches.
        thread::sleep(Duration::from_millis(200));
        write_file(&config.source_path("sass/blocks/header.scss"), ".h{}").unwrap();

        let limit = Instant::now() + Duration::from_secs(10);
        while count.load(Ordering::SeqCst) == 0 && Instant::now() < limit {
            thread::sleep(Duration::from_millis(20));
        }

        session.shutdown();
        assert!(count.load(Ordering::SeqCst) >= 1);
        assert_eq!(session.binding_runs("styles"), None);
    }
}
