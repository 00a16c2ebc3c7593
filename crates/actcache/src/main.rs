//! actcache command-line entry point

use actcache::cli::{self, Cli, CliError, Commands, EXIT_OK, exit_code_for, render_error};
use actcache::commands;
use clap::Parser;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            render_error(CliError::operation(format!(
                "Failed to create tokio runtime: {e}"
            )));
            std::process::exit(cli::EXIT_FAILURE);
        }
    };

    let exit_code = match rt.block_on(run(cli)) {
        Ok(()) => EXIT_OK,
        Err(err) => {
            let code = exit_code_for(&err);
            render_error(err);
            code
        }
    };
    std::process::exit(exit_code);
}

/// Log to stderr, honouring RUST_LOG when set
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> cli::Result<()> {
    let config = commands::load_config(cli.config.as_deref(), cli.cache_dir)?;
    let mut stdout = io::stdout();

    match cli.command {
        Commands::Dump => commands::dump(&config, &mut stdout)?,
        Commands::Clear => commands::clear(&config, &mut stdout)?,
        Commands::Blob(command) => {
            let mut data = tokio::io::stdout();
            commands::blob(&config, command, &mut data, &mut stdout).await?;
        }
    }

    stdout
        .flush()
        .map_err(|e| CliError::operation(format!("Failed to flush stdout: {e}")))
}
