use std::collections::HashMap;
use std::sync::Arc;

use petgraph::Graph;
use petgraph::graph::NodeIndex;

use crate::error::ScheduleError;
use crate::graph::{Node, parallel, serial};
use crate::task::Task;

enum Entry {
    Node(Node),
    Serial(Vec<Arc<str>>),
    Parallel(Vec<Arc<str>>),
}

/// Name-based task registry.
///
/// `Blueprint` lets you register leaf tasks under their names and define
/// groups that refer to other entries by name. All references are checked
/// in [`Blueprint::finish`]: unknown names and cycles are rejected before
/// anything runs, and every entry is turned into an immutable [`Node`].
///
/// # Example
///
/// ```rust
/// use kumade::{Blueprint, task};
///
/// let mut blueprint = Blueprint::new();
/// blueprint
///     .add_node("clean", task("clean", |_| Ok(vec![])))?
///     .add_node("styles", task("styles", |_| Ok(vec![])))?
///     .series("build", &["clean", "styles"])?;
///
/// let registry = blueprint.finish()?;
/// assert_eq!(registry.get("build")?.to_string(), "build:serial(clean, styles)");
/// # Ok::<(), kumade::ScheduleError>(())
/// ```
#[derive(Default)]
pub struct Blueprint {
    entries: Vec<(Arc<str>, Entry)>,
    names: HashMap<Arc<str>, usize>,
}

impl Blueprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a leaf task under its own name.
    pub fn add_task<T: Task + 'static>(&mut self, task: T) -> Result<&mut Self, ScheduleError> {
        let name = task.name().to_string();
        self.insert(&name, Entry::Node(Node::leaf(task)))
    }

    /// Registers an already built node under `name`.
    pub fn add_node(&mut self, name: &str, node: Node) -> Result<&mut Self, ScheduleError> {
        self.insert(name, Entry::Node(node))
    }

    pub fn series(&mut self, name: &str, children: &[&str]) -> Result<&mut Self, ScheduleError> {
        let children = children.iter().map(|&c| Arc::from(c)).collect();
        self.insert(name, Entry::Serial(children))
    }

    pub fn parallel(&mut self, name: &str, children: &[&str]) -> Result<&mut Self, ScheduleError> {
        let children = children.iter().map(|&c| Arc::from(c)).collect();
        self.insert(name, Entry::Parallel(children))
    }

    fn insert(&mut self, name: &str, entry: Entry) -> Result<&mut Self, ScheduleError> {
        if self.names.contains_key(name) {
            return Err(ScheduleError::Duplicate(name.to_string()));
        }

        let name: Arc<str> = Arc::from(name);
        self.names.insert(name.clone(), self.entries.len());
        self.entries.push((name, entry));

        Ok(self)
    }

    /// Validates every reference and materializes the graph.
    pub fn finish(self) -> Result<Registry, ScheduleError> {
        let mut graph: Graph<usize, ()> = Graph::new();
        let indices: Vec<NodeIndex> = (0..self.entries.len()).map(|i| graph.add_node(i)).collect();

        for (i, (name, entry)) in self.entries.iter().enumerate() {
            let children = match entry {
                Entry::Node(_) => continue,
                Entry::Serial(children) | Entry::Parallel(children) => children,
            };

            for child in children {
                let j = *self
                    .names
                    .get(child)
                    .ok_or_else(|| ScheduleError::Dangling {
                        parent: name.to_string(),
                        child: child.to_string(),
                    })?;

                graph.add_edge(indices[i], indices[j], ());
            }
        }

        // Parents come before their children in topological order.
        let order = petgraph::algo::toposort(&graph, None).map_err(|cycle| {
            let (name, _) = &self.entries[graph[cycle.node_id()]];
            ScheduleError::Cycle(name.to_string())
        })?;

        let mut built: Vec<Option<Node>> = vec![None; self.entries.len()];

        for index in order.into_iter().rev() {
            let i = graph[index];
            let (name, entry) = &self.entries[i];

            let resolve = |children: &[Arc<str>]| -> Vec<Node> {
                children
                    .iter()
                    .filter_map(|child| built[self.names[child]].clone())
                    .collect()
            };

            let node = match entry {
                Entry::Node(node) => node.clone(),
                Entry::Serial(children) => serial(resolve(children)).named(name.clone()),
                Entry::Parallel(children) => parallel(resolve(children)).named(name.clone()),
            };

            built[i] = Some(node);
        }

        let nodes = self
            .entries
            .iter()
            .zip(built)
            .filter_map(|((name, _), node)| Some((name.clone(), node?)))
            .collect();

        Ok(Registry { nodes })
    }
}

/// Immutable set of named nodes produced by [`Blueprint::finish`].
pub struct Registry {
    nodes: HashMap<Arc<str>, Node>,
}

impl Registry {
    pub fn get(&self, name: &str) -> Result<Node, ScheduleError> {
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| ScheduleError::Unknown(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|name| &**name)
    }
}
