use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fragment_stack::config::Config;
use fragment_stack::logging::init_tracing;
use fragment_stack::script::{run_script, Script};

#[derive(Parser, Debug)]
#[command(name = "fragment-stack")]
#[command(about = "Drive a component registry through transaction scripts")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a TOML script and print the report
    Run {
        /// Script to run
        script: PathBuf,

        /// Print the saved registry state as JSON after the run
        #[arg(long)]
        dump_state: bool,
    },
    /// Load and validate the configuration, then print it
    CheckConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let config = Config::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    init_tracing(&config.logging);

    match cli.command {
        Command::Run { script, dump_state } => {
            let parsed = Script::load(&script)?;
            let report = run_script(&parsed, config.manager.clone(), dump_state)
                .with_context(|| format!("running {}", script.display()))?;
            println!("{}", report);
            if let Some(saved) = &report.saved {
                println!("{}", saved.to_json()?);
            }
        }
        Command::CheckConfig => {
            let rendered = toml::to_string_pretty(&config).context("rendering config")?;
            println!("# {}", config_path.display());
            print!("{}", rendered);
        }
    }
    Ok(())
}
