mod cli;
mod logging;

use anyhow::Context;
use clap::Parser;

use crate::cli::{Args, Command};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_logging(args.log_level)?;

    let config = args.config();

    match args.command {
        Command::Build => {
            let diagnostics = kumade::build(config)?;

            if let Some(path) = &args.mermaid {
                let graph = kumade::pipeline::build()?;
                std::fs::write(path, diagnostics.render_mermaid(&graph))
                    .with_context(|| format!("couldn't write {path}"))?;
            }
        }
        Command::Dev => kumade::dev(config)?,
    }

    Ok(())
}
