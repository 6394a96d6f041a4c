#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod blueprint;
mod config;
pub mod dev;
mod engine;
mod error;
mod graph;
mod io;
pub mod live;
pub mod pipeline;
mod task;
pub mod transform;
pub mod watch;

use std::sync::Arc;

pub use crate::blueprint::{Blueprint, Registry};
pub use crate::config::Config;
pub use crate::dev::{DevSession, WatchBinding};
pub use crate::engine::{BuildRun, Diagnostics, Runner, Status, TaskExecution};
pub use crate::error::*;
pub use crate::graph::{Group, Node, parallel, serial, task};
pub use crate::task::{Artifacts, FnTask, Mode, Selector, Source, Task, TaskContext, TaskResult};
pub use crate::watch::{BindingState, Dispatcher};

/// Runs the production graph once.
pub fn build(config: Config) -> Result<Diagnostics, KumadeError> {
    let graph = pipeline::build()?;
    let runner = Runner::new(Arc::new(config), Mode::Build);

    Ok(runner.run(&graph)?)
}

/// Runs the development graph, then serves and watches until the process
/// is asked to stop.
pub fn dev(config: Config) -> Result<(), KumadeError> {
    let runner = Runner::new(Arc::new(config), Mode::Dev);
    let session = DevSession::new();
    let graph = pipeline::dev(&session, &runner)?;

    if let Err(e) = runner.run(&graph) {
        session.shutdown();
        return Err(e.into());
    }

    tracing::info!("watching for changes, press Ctrl+C to stop");
    let waited = dev::wait_for_shutdown();
    session.shutdown();
    waited?;

    Ok(())
}
