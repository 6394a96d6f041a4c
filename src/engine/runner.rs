mod diagnostics;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{Level, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::engine::tracking::{BuildRun, Status, TaskExecution};
use crate::error::{Failure, RunError, TaskError};
use crate::graph::Node;
use crate::io::{STYLE_ROOT, STYLE_TASK, as_overhead};
use crate::task::{Mode, Task, TaskContext};
use crate::Config;

pub use diagnostics::Diagnostics;

/// Executes composite tasks.
///
/// The walk is depth-first. Serial groups stop at the first failing child and
/// propagate the failure, so no later sibling at any enclosing level runs.
/// Parallel groups hand their children to the rayon pool and always wait for
/// every child to finish, even after one of them failed; the group then fails
/// with all collected failures.
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<Config>,
    mode: Mode,
}

struct Execution<'a> {
    ctx: TaskContext<'a>,
    run: &'a BuildRun,
    root: Span,
}

impl Runner {
    pub fn new(config: Arc<Config>, mode: Mode) -> Self {
        Self { config, mode }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Runs `node` to completion and reports how long each leaf took.
    pub fn run(&self, node: &Node) -> Result<Diagnostics, RunError> {
        let run = BuildRun::new(node);
        self.execute(node, &run)?;

        Ok(Diagnostics {
            execution_times: run.executions(),
            elapsed: run.elapsed(),
        })
    }

    /// Runs `node`, recording every leaf transition in `run`.
    pub fn execute(&self, node: &Node, run: &BuildRun) -> Result<(), RunError> {
        let s = Instant::now();
        let total = node.leaves().len() as u64;

        let root = tracing::span!(Level::INFO, "run", node = %node.label());
        root.pb_set_style(&STYLE_ROOT);
        root.pb_set_length(total);
        root.pb_set_message(&format!("Running {}", node.label()));

        let execution = Execution {
            ctx: TaskContext {
                config: &self.config,
                mode: self.mode,
            },
            run,
            root: root.clone(),
        };

        let result = {
            let _enter = root.enter();
            execution.walk(node, &[])
        };

        // The error itself is reported by whoever asked for the run.
        match &result {
            Ok(()) => tracing::info!("finished {} {}", node.label(), as_overhead(s)),
            Err(e) => tracing::debug!(
                failures = e.failures().len(),
                "{} failed {}",
                node.label(),
                as_overhead(s)
            ),
        }

        result
    }
}

impl Execution<'_> {
    fn walk(&self, node: &Node, trace: &[Arc<str>]) -> Result<(), RunError> {
        match node {
            Node::Leaf(task) => self.leaf(task.as_ref(), trace),
            Node::Serial(group) => {
                let trace = extend(trace, node.label());

                for child in group.children() {
                    self.walk(child, &trace)?;
                }

                Ok(())
            }
            Node::Parallel(group) => {
                let trace = extend(trace, node.label());

                // Collect every result first: siblings are never cancelled.
                let results: Vec<_> = group
                    .children()
                    .par_iter()
                    .map(|child| self.walk(child, &trace))
                    .collect();

                match RunError::merge(results.into_iter().filter_map(Result::err)) {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
        }
    }

    fn leaf(&self, task: &dyn Task, trace: &[Arc<str>]) -> Result<(), RunError> {
        let name: Arc<str> = Arc::from(task.name());

        let span = tracing::span!(parent: &self.root, Level::INFO, "task", name = %name);
        span.pb_set_style(&STYLE_TASK);
        span.pb_set_message(&format!("Running {name}"));
        let _enter = span.enter();

        self.run.start(&name);
        let start = Instant::now();

        // A panicking task must not take the whole graph down, the panic is
        // reported like any other failure.
        let result = match catch_unwind(AssertUnwindSafe(|| task.execute(&self.ctx))) {
            Ok(result) => result,
            Err(panic) => Err(TaskError::Panic(panic_message(panic))),
        };

        let execution = TaskExecution {
            start,
            duration: start.elapsed(),
        };

        self.root.pb_inc(1);

        match result {
            Ok(artifacts) => {
                self.run.finish(&name, Status::Succeeded, execution);
                tracing::debug!(task = %name, artifacts = artifacts.len(), "wrote artifacts");
                tracing::info!("finished {name} {}", as_overhead(start));
                Ok(())
            }
            Err(error) => {
                self.run.finish(&name, Status::Failed, execution);

                let failure = Failure {
                    trace: extend(trace, name),
                    error,
                };
                self.run.record_failure(&failure);

                Err(RunError::new(failure))
            }
        }
    }
}

fn extend(trace: &[Arc<str>], label: Arc<str>) -> Vec<Arc<str>> {
    let mut trace = trace.to_vec();
    trace.push(label);
    trace
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown payload")
    }
}
