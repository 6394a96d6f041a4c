use crate::error::TaskError;
use crate::io::clear_dir;
use crate::task::{Task, TaskContext, TaskResult};

/// Empties the output root.
pub struct Clean;

impl Task for Clean {
    fn name(&self) -> &str {
        "clean"
    }

    fn execute(&self, ctx: &TaskContext) -> TaskResult {
        let config = ctx.config;

        if config.source.starts_with(&config.output) {
            return Err(TaskError::transform(
                &config.output,
                "refusing to clean a directory that contains the source root",
            ));
        }

        clear_dir(&config.output)?;
        tracing::debug!("cleaned {}", config.output);

        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;
    use crate::Config;
    use crate::io::write_file;
    use crate::task::Mode;

    #[test]
    fn test_clean_empties_output() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let config = Config {
            source: root.join("source"),
            output: root.join("build"),
            ..Config::default()
        };
        write_file(&config.output_path("css/old.css"), "a{}").unwrap();

        let ctx = TaskContext {
            config: &config,
            mode: Mode::Build,
        };
        Clean.execute(&ctx).unwrap();

        assert!(config.output.is_dir());
        assert!(!config.output_path("css").exists());
    }

    #[test]
    fn test_clean_refuses_source_parent() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let config = Config {
            source: root.join("source"),
            output: root.clone(),
            ..Config::default()
        };
        write_file(&config.source_path("index.html"), "<p></p>").unwrap();

        let ctx = TaskContext {
            config: &config,
            mode: Mode::Build,
        };
        assert!(Clean.execute(&ctx).is_err());
        assert!(config.source_path("index.html").exists());
    }
}
