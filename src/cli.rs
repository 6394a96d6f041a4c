use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};

use kumade::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Command {
    /// Build the output tree once and exit.
    Build,
    /// Build, serve the output with live reload and rebuild on change.
    Dev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Static asset pipeline with live reload.
#[derive(Debug, Parser)]
#[command(name = "kumade", version, about)]
pub struct Args {
    #[arg(value_enum, default_value_t = Command::Dev)]
    pub command: Command,

    /// Source root, never written to.
    #[arg(long, default_value = "source")]
    pub source: Utf8PathBuf,

    /// Output root, emptied before every full build.
    #[arg(long, default_value = "build")]
    pub output: Utf8PathBuf,

    /// Entry stylesheet relative to the source root. Globs are allowed.
    #[arg(long, default_value = "sass/style.scss")]
    pub styles_entry: String,

    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    #[arg(long, default_value_t = 1337)]
    pub reload_port: u16,

    /// Settle time for bursts of file changes, in milliseconds.
    #[arg(long, default_value_t = 250)]
    pub debounce_ms: u64,

    /// Write a Mermaid diagram of the finished build to this file.
    #[arg(long)]
    pub mermaid: Option<Utf8PathBuf>,

    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
}

impl Args {
    pub fn config(&self) -> Config {
        Config {
            source: self.source.clone(),
            output: self.output.clone(),
            styles_entry: self.styles_entry.clone(),
            port: self.port,
            reload_port: self.reload_port,
            debounce: std::time::Duration::from_millis(self.debounce_ms),
        }
    }
}
