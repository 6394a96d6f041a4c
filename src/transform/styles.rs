use grass::{Options, OutputStyle};

use crate::error::TaskError;
use crate::io::write_file;
use crate::task::{Selector, Task, TaskContext, TaskResult};

/// Output path of the compiled stylesheet, relative to the output root.
pub const STYLESHEET: &str = "css/style.min.css";

/// Compiles the entry stylesheet(s) into one compressed CSS file.
pub struct Styles;

impl Task for Styles {
    fn name(&self) -> &str {
        "styles"
    }

    fn execute(&self, ctx: &TaskContext) -> TaskResult {
        let entries = Selector::new([&ctx.config.styles_entry])?.resolve(&ctx.config.source)?;

        if entries.is_empty() {
            tracing::warn!("no stylesheet matches '{}'", ctx.config.styles_entry);
            return Ok(vec![]);
        }

        let opts = Options::default().style(OutputStyle::Compressed);
        let mut css = String::new();

        for entry in &entries {
            let data = grass::from_path(entry.path.as_std_path(), &opts)
                .map_err(|e| TaskError::transform(&entry.path, e))?;
            css.push_str(&data);
        }

        let path = ctx.config.output_path(STYLESHEET);
        write_file(&path, css)?;

        Ok(vec![path])
    }
}
