use std::fmt::{self, Display};
use std::net::SocketAddr;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KumadeError {
    #[error("Invalid task graph:\n{0}")]
    Schedule(#[from] ScheduleError),

    #[error("Build failed:\n{0}")]
    Run(#[from] RunError),

    #[error("Couldn't start watch mode:\n{0}")]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by a single leaf task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The underlying transformation rejected its input.
    #[error("{path}: {message}")]
    Transform { path: Utf8PathBuf, message: String },

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't compile glob pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error(transparent)]
    Startup(#[from] WatchError),

    #[error("Task panicked: {0}")]
    Panic(String),
}

impl TaskError {
    pub fn transform(path: impl Into<Utf8PathBuf>, message: impl Display) -> Self {
        Self::Transform {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A leaf failure together with the labels of the nodes that led to it.
#[derive(Debug)]
pub struct Failure {
    pub trace: Vec<Arc<str>>,
    pub error: TaskError,
}

impl Failure {
    pub fn trace(&self) -> String {
        self.trace.join(" > ")
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task '{}' failed: {}", self.trace(), self.error)
    }
}

/// Failure of a composite run. Holds at least one [`Failure`]; parallel nodes
/// aggregate every child failure.
#[derive(Debug)]
pub struct RunError {
    failures: Vec<Failure>,
}

impl RunError {
    pub(crate) fn new(failure: Failure) -> Self {
        Self {
            failures: vec![failure],
        }
    }

    pub(crate) fn merge(errors: impl IntoIterator<Item = RunError>) -> Option<Self> {
        let failures: Vec<_> = errors.into_iter().flat_map(|e| e.failures).collect();

        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    pub fn first(&self) -> &Failure {
        &self.failures[0]
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first())?;

        for other in &self.failures[1..] {
            write!(f, "\n{other}")?;
        }

        Ok(())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.first().error)
    }
}

/// Problems in the shape of a task graph, caught while the graph is built.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Task '{0}' is registered more than once")]
    Duplicate(String),

    #[error("Group '{parent}' refers to unknown task '{child}'")]
    Dangling { parent: String, child: String },

    #[error("Cycle detected in task graph at '{0}'")]
    Cycle(String),

    #[error("Unknown task '{0}'")]
    Unknown(String),

    #[error("Invalid selector pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error("Couldn't bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't resolve watch path '{0}': {1}")]
    Resolve(String, String),

    #[error("A live server is already running in this process")]
    AlreadyRunning,

    #[error("Failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
