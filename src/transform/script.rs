use std::io::ErrorKind;
use std::process::{Command, Stdio};

use camino::Utf8Path;

use crate::error::TaskError;
use crate::io::write_file;
use crate::task::{Selector, Task, TaskContext, TaskResult};

/// Minifies every script in `js/` with esbuild.
///
/// **Note:** This task requires the `esbuild` binary to be available in the
/// system PATH. A tree without scripts never invokes it.
pub struct Script;

impl Task for Script {
    fn name(&self) -> &str {
        "script"
    }

    fn execute(&self, ctx: &TaskContext) -> TaskResult {
        let sources = Selector::new(["js/*.js"])?
            .base("js")
            .resolve(&ctx.config.source)?;

        let mut scripts = Vec::with_capacity(sources.len());
        for source in sources {
            let data = minify_esbuild(&source.path)?;
            scripts.push((ctx.config.output_path(Utf8Path::new("js").join(&source.rel)), data));
        }

        let mut written = Vec::with_capacity(scripts.len());
        for (path, data) in scripts {
            write_file(&path, data)?;
            written.push(path);
        }

        Ok(written)
    }
}

fn minify_esbuild(file: &Utf8Path) -> Result<Vec<u8>, TaskError> {
    let output = Command::new("esbuild")
        .arg(file.as_str())
        .arg("--minify")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => TaskError::transform(file, "esbuild was not found in PATH"),
            _ => TaskError::io(file, e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TaskError::transform(file, stderr.trim()));
    }

    Ok(output.stdout)
}
