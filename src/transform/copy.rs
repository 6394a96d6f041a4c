use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::io::copy_file;
use crate::task::{Selector, Task, TaskContext, TaskResult};

/// Copies selected files verbatim, keeping their path below the selector
/// base.
pub struct CopyFiles {
    name: Arc<str>,
    selector: Selector,
    dest: Utf8PathBuf,
}

impl CopyFiles {
    pub fn new(name: impl Into<Arc<str>>, selector: Selector, dest: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.into(),
            selector,
            dest: dest.into(),
        }
    }
}

impl Task for CopyFiles {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &TaskContext) -> TaskResult {
        let sources = self.selector.resolve(&ctx.config.source)?;
        let mut written = Vec::with_capacity(sources.len());

        for source in sources {
            let to = ctx.config.output_path(self.dest.join(&source.rel));
            copy_file(&source.path, &to)?;
            written.push(to);
        }

        Ok(written)
    }
}
