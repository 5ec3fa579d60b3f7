use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod script;

use config::{load_settings, Settings};
use script::{api_error, parse_codec, run_script, Script};

#[derive(Parser, Debug)]
struct Cli {
    /// Settings file; `form_tools.toml` in the working directory is used when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay an editing script and print the resulting field identifiers.
    Run { script: PathBuf },
    /// Rewrite the index encoded in a single identifier.
    Rewrite {
        identifier: String,
        /// `bracket:<token>` or `hyphen:<slots>:<index-slot>`.
        #[arg(long)]
        codec: String,
        #[arg(long)]
        from: usize,
        #[arg(long)]
        to: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = execute(cli.command, &settings).await {
        if let Some(api) = api_error(&err) {
            println!("{}", serde_json::to_string_pretty(&api)?);
        }
        return Err(err);
    }
    Ok(())
}

async fn execute(command: Command, settings: &Settings) -> Result<()> {
    match command {
        Command::Run { script } => {
            let raw = fs::read_to_string(&script)
                .with_context(|| format!("failed to read script '{}'", script.display()))?;
            let parsed: Script = toml::from_str(&raw)
                .with_context(|| format!("invalid script '{}'", script.display()))?;
            let projection = run_script(&parsed, settings).await?;
            println!("{}", serde_json::to_string_pretty(&projection)?);
        }
        Command::Rewrite {
            identifier,
            codec,
            from,
            to,
        } => {
            let codec = parse_codec(&codec)?;
            let rewritten = codec.rewrite(&identifier, from, to)?;
            println!("{rewritten}");
        }
    }
    Ok(())
}
