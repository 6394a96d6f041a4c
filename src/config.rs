use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

/// Static configuration of a pipeline invocation.
///
/// Every path pattern used by the pipeline definitions is relative to
/// `source`, every artifact lands below `output`. The value is built once at
/// startup and shared read-only between all tasks.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the source tree, never written to.
    pub source: Utf8PathBuf,
    /// Root of the output tree, owned by the pipeline.
    pub output: Utf8PathBuf,
    /// Entry stylesheet(s), relative to `source`.
    pub styles_entry: String,
    /// Port of the static HTTP server in dev mode.
    pub port: u16,
    /// Port of the live-reload WebSocket hub in dev mode.
    pub reload_port: u16,
    /// How long a watch binding waits for a burst of changes to settle.
    pub debounce: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: Utf8PathBuf::from("source"),
            output: Utf8PathBuf::from("build"),
            styles_entry: String::from("sass/style.scss"),
            port: 8080,
            reload_port: 1337,
            debounce: Duration::from_millis(250),
        }
    }
}

impl Config {
    pub fn source_path(&self, rel: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        self.source.join(rel)
    }

    pub fn output_path(&self, rel: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        self.output.join(rel)
    }
}
