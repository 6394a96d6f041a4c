use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use glob::Pattern;

use crate::Config;
use crate::error::TaskError;

/// This value controls whether the pipeline runs in the `Build` or the `Dev`
/// mode. In `Build` mode every task runs once and the process exits. In `Dev`
/// mode the output is additionally served over HTTP and rebuilt on change,
/// and the markup task injects the live-reload client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Build,
    Dev,
}

/// Paths written by a task, relative to nothing in particular: whatever the
/// task joined onto the output root.
pub type Artifacts = Vec<Utf8PathBuf>;

/// Result from a single executed task.
pub type TaskResult = Result<Artifacts, TaskError>;

/// Everything a task can see while it runs.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    pub config: &'a Config,
    pub mode: Mode,
}

/// A named, stateless unit of work.
///
/// Tasks must only read below the source root and only write below the
/// output root. Running a task twice on the same input yields the same
/// output.
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, ctx: &TaskContext) -> TaskResult;
}

type TaskFnPtr = Arc<dyn Fn(&TaskContext) -> TaskResult + Send + Sync>;

/// Wraps a closure as a [`Task`].
pub struct FnTask {
    name: Arc<str>,
    func: TaskFnPtr,
}

impl FnTask {
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&TaskContext) -> TaskResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl Task for FnTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &TaskContext) -> TaskResult {
        (self.func)(ctx)
    }
}

impl Debug for FnTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FnTask({})", self.name)
    }
}

/// A file matched by a [`Selector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Path on disk, including the source root.
    pub path: Utf8PathBuf,
    /// Path relative to the selector base, used to place the output.
    pub rel: Utf8PathBuf,
}

/// Input file-set of a task: glob patterns relative to the source root.
///
/// Patterns prefixed with `!` exclude matches. Matching nothing is not an
/// error, it just makes an empty stage.
#[derive(Debug, Clone)]
pub struct Selector {
    base: Utf8PathBuf,
    include: Vec<String>,
    exclude: Vec<Pattern>,
}

impl Selector {
    pub fn new<I, S>(patterns: I) -> Result<Self, glob::PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut include = Vec::new();
        let mut exclude = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_prefix('!') {
                Some(negated) => exclude.push(Pattern::new(negated)?),
                None => {
                    Pattern::new(pattern)?;
                    include.push(pattern.to_string());
                }
            }
        }

        Ok(Self {
            base: Utf8PathBuf::new(),
            include,
            exclude,
        })
    }

    /// Sets the directory output paths are computed relative to.
    pub fn base(mut self, base: impl Into<Utf8PathBuf>) -> Self {
        self.base = base.into();
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.include
    }

    /// Expands the patterns below `root`. The result is sorted and free of
    /// duplicates, so tasks process files in a stable order.
    pub fn resolve(&self, root: &Utf8Path) -> Result<Vec<Source>, TaskError> {
        let root = without_cur_dir(root);
        let prefix = Pattern::escape(root.as_str());
        let mut found = BTreeMap::new();

        for include in &self.include {
            let full = match prefix.as_str() {
                "" => include.clone(),
                prefix => format!("{prefix}/{include}"),
            };

            for path in glob::glob(&full)? {
                let path = Utf8PathBuf::try_from(path?)?;

                if !path.is_file() {
                    continue;
                }

                let Ok(from_root) = path.strip_prefix(&root).map(Utf8Path::to_path_buf) else {
                    return Err(TaskError::transform(
                        path,
                        format!("matched outside of {root}"),
                    ));
                };

                if self.exclude.iter().any(|p| p.matches(from_root.as_str())) {
                    continue;
                }

                let rel = from_root
                    .strip_prefix(&self.base)
                    .unwrap_or(&from_root)
                    .to_path_buf();

                found.insert(path.clone(), Source { path, rel });
            }
        }

        Ok(found.into_values().collect())
    }
}

/// `glob` reports matches without a leading `./`, so the root has to be
/// spelled the same way for the prefix to strip.
fn without_cur_dir(root: &Utf8Path) -> Utf8PathBuf {
    root.components()
        .filter(|c| !matches!(c, Utf8Component::CurDir))
        .collect()
}
