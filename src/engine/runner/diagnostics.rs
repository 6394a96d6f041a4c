use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::tracking::TaskExecution;
use crate::graph::Node;

/// Build diagnostics and performance metrics.
///
/// Returned by [`Runner::run`](crate::Runner::run), contains the start time
/// and duration of every leaf that ran.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Execution metrics keyed by task name.
    pub execution_times: HashMap<Arc<str>, TaskExecution>,
    /// Wall time of the whole run.
    pub elapsed: Duration,
}

impl Diagnostics {
    /// Renders the executed tree as a Mermaid diagram, leaves color-coded by
    /// execution duration.
    ///
    /// * **Green**: Fast
    /// * **Yellow**: Moderate
    /// * **Red**: Slow
    /// * **Blue**: Did not run
    pub fn render_mermaid(&self, node: &Node) -> String {
        let mut f = String::new();
        writeln!(f, "graph LR").unwrap();

        let (min, max) = self.bounds();
        let mut next = 0;
        self.render_node(&mut f, node, &mut next, min, max);

        f
    }

    fn bounds(&self) -> (f64, f64) {
        let mut min_time = f64::MAX;
        let mut max_time = f64::MIN;

        for t in self.execution_times.values() {
            let secs = t.duration.as_secs_f64();
            min_time = min_time.min(secs);
            max_time = max_time.max(secs);
        }

        if min_time > max_time {
            // No tasks ran
            min_time = 0.0;
            max_time = 0.0;
        }

        // Avoid divide by zero if all tasks took same time
        if (max_time - min_time).abs() < f64::EPSILON {
            max_time = min_time + 1.0;
        }

        (min_time, max_time)
    }

    fn render_node(&self, f: &mut String, node: &Node, next: &mut usize, min: f64, max: f64) -> usize {
        let id = *next;
        *next += 1;

        let label = node.label().replace('"', "\\\"");

        match node {
            Node::Leaf(_) => {
                let (extra, color) = match self.execution_times.get(&*node.label()) {
                    Some(exec) => {
                        let t = (exec.duration.as_secs_f64() - min) / (max - min);
                        (format!("{:.2?}", exec.duration), gradient(t))
                    }
                    None => ("Skipped".to_string(), "#ADD8E6".to_string()),
                };

                writeln!(f, "    {id}[\"{label}\\n{extra}\"]").unwrap();
                writeln!(f, "    style {id} fill:{color}").unwrap();
            }
            Node::Serial(group) | Node::Parallel(group) => {
                let shape = if matches!(node, Node::Serial(_)) { "series" } else { "parallel" };
                writeln!(f, "    {id}{{{{\"{label}\\n{shape}\"}}}}").unwrap();

                let mut prev = None;
                for child in group.children() {
                    let child_id = self.render_node(f, child, next, min, max);

                    // Serial children are chained, parallel ones fan out.
                    match (matches!(node, Node::Serial(_)), prev) {
                        (true, Some(prev)) => writeln!(f, "    {prev} --> {child_id}").unwrap(),
                        _ => writeln!(f, "    {id} --> {child_id}").unwrap(),
                    }
                    prev = Some(child_id);
                }
            }
        }

        id
    }
}

/// 0.0 (Green) -> 0.5 (Yellow) -> 1.0 (Red)
fn gradient(t: f64) -> String {
    let (r, g, b) = if t < 0.5 {
        let r = (255.0 * t * 2.0) as u8;
        (r, 255, 0)
    } else {
        let g = (255.0 * (1.0 - (t - 0.5) * 2.0)) as u8;
        (255, g, 0)
    };

    format!("#{r:02X}{g:02X}{b:02X}")
}
