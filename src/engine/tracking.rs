use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::error::Failure;
use crate::graph::Node;

/// State of a leaf task within one [`BuildRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

#[derive(Debug)]
struct Leaf {
    status: Status,
    execution: Option<TaskExecution>,
}

/// Ephemeral record of one graph execution.
///
/// Leaves are keyed by task name. A task that appears more than once in the
/// same graph shares a single entry, which reflects its latest transition.
#[derive(Debug)]
pub struct BuildRun {
    started: Instant,
    leaves: Mutex<HashMap<Arc<str>, Leaf>>,
    first_failure: OnceLock<String>,
}

impl BuildRun {
    pub fn new(node: &Node) -> Self {
        let leaves = node
            .leaves()
            .iter()
            .map(|task| {
                let leaf = Leaf {
                    status: Status::Pending,
                    execution: None,
                };
                (Arc::from(task.name()), leaf)
            })
            .collect();

        Self {
            started: Instant::now(),
            leaves: Mutex::new(leaves),
            first_failure: OnceLock::new(),
        }
    }

    pub(crate) fn start(&self, name: &Arc<str>) {
        let mut leaves = self.leaves.lock().unwrap();
        let leaf = leaves.entry(name.clone()).or_insert(Leaf {
            status: Status::Pending,
            execution: None,
        });
        leaf.status = Status::Running;
    }

    pub(crate) fn finish(&self, name: &Arc<str>, status: Status, execution: TaskExecution) {
        let mut leaves = self.leaves.lock().unwrap();
        if let Some(leaf) = leaves.get_mut(name) {
            leaf.status = status;
            leaf.execution = Some(execution);
        }
    }

    /// Remembers the failure if it is the first one of this run.
    pub(crate) fn record_failure(&self, failure: &Failure) {
        self.first_failure.get_or_init(|| failure.to_string());
    }

    pub fn status(&self, name: &str) -> Option<Status> {
        self.leaves.lock().unwrap().get(name).map(|leaf| leaf.status)
    }

    pub fn count(&self, status: Status) -> usize {
        self.leaves
            .lock()
            .unwrap()
            .values()
            .filter(|leaf| leaf.status == status)
            .count()
    }

    pub fn first_failure(&self) -> Option<&str> {
        self.first_failure.get().map(String::as_str)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn executions(&self) -> HashMap<Arc<str>, TaskExecution> {
        self.leaves
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(name, leaf)| Some((name.clone(), leaf.execution.clone()?)))
            .collect()
    }
}
