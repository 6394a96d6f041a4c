//! Composite tasks.
//!
//! A [`Node`] is either a single leaf [`Task`] or a group of child nodes that
//! run one after another ([`serial`]) or all at once ([`parallel`]). Nodes
//! are immutable once built and cheap to clone: children live behind an
//! `Arc`, so the same sub-graph can be shared between an entry point and a
//! watch binding. Since a node only ever owns already-built children, a graph
//! built from values cannot contain a cycle.

use std::fmt::{self, Display};
use std::sync::Arc;

use crate::task::{FnTask, Task, TaskContext, TaskResult};

#[derive(Clone)]
pub enum Node {
    Leaf(Arc<dyn Task>),
    Serial(Group),
    Parallel(Group),
}

#[derive(Clone)]
pub struct Group {
    label: Option<Arc<str>>,
    children: Arc<[Node]>,
}

impl Group {
    fn new(children: impl IntoIterator<Item = Node>) -> Self {
        Self {
            label: None,
            children: children.into_iter().collect(),
        }
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }
}

/// Children run in declared order, each one fully completing before the
/// next starts.
pub fn serial(children: impl IntoIterator<Item = Node>) -> Node {
    Node::Serial(Group::new(children))
}

/// Children start together; the group completes once all of them did.
pub fn parallel(children: impl IntoIterator<Item = Node>) -> Node {
    Node::Parallel(Group::new(children))
}

/// Creates a leaf node from a closure.
pub fn task<F>(name: impl Into<Arc<str>>, func: F) -> Node
where
    F: Fn(&TaskContext) -> TaskResult + Send + Sync + 'static,
{
    Node::leaf(FnTask::new(name, func))
}

impl Node {
    pub fn leaf<T: Task + 'static>(task: T) -> Self {
        Node::Leaf(Arc::new(task))
    }

    /// Attaches a label to a group, shown in failure traces and diagnostics.
    /// Leaves are always labelled by their task name.
    pub fn named(self, label: impl Into<Arc<str>>) -> Self {
        match self {
            Node::Leaf(_) => self,
            Node::Serial(group) => Node::Serial(Group {
                label: Some(label.into()),
                ..group
            }),
            Node::Parallel(group) => Node::Parallel(Group {
                label: Some(label.into()),
                ..group
            }),
        }
    }

    pub fn label(&self) -> Arc<str> {
        match self {
            Node::Leaf(task) => Arc::from(task.name()),
            Node::Serial(group) => group.label.clone().unwrap_or_else(|| Arc::from("series")),
            Node::Parallel(group) => group.label.clone().unwrap_or_else(|| Arc::from("parallel")),
        }
    }

    /// All leaf tasks below this node, in declaration order.
    pub fn leaves(&self) -> Vec<Arc<dyn Task>> {
        let mut acc = Vec::new();
        self.collect_leaves(&mut acc);
        acc
    }

    fn collect_leaves(&self, acc: &mut Vec<Arc<dyn Task>>) {
        match self {
            Node::Leaf(task) => acc.push(task.clone()),
            Node::Serial(group) | Node::Parallel(group) => {
                for child in group.children() {
                    child.collect_leaves(acc);
                }
            }
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, group) = match self {
            Node::Leaf(task) => return f.write_str(task.name()),
            Node::Serial(group) => ("serial", group),
            Node::Parallel(group) => ("parallel", group),
        };

        if let Some(label) = &group.label {
            write!(f, "{label}:")?;
        }

        write!(f, "{kind}(")?;
        for (i, child) in group.children().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{child}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({self})")
    }
}
