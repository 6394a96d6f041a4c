mod runner;
mod tracking;

pub use crate::engine::runner::{Diagnostics, Runner};
pub use crate::engine::tracking::{BuildRun, Status, TaskExecution};
