mod args;
mod commands;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let filter = match cli.verbose {
        0 => "avtrack=warn",
        1 => "avtrack=info",
        2 => "avtrack=debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Some(Commands::Extract { video, options }) => {
            commands::extract::run(&video, &options, cli.config.as_deref()).await
        }
        Some(Commands::Probe { video, json }) => {
            commands::probe::run(&video, json, cli.config.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Doctor) => {
            commands::doctor::run().await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Config) => {
            commands::config::run(cli.config.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            // If a video is provided directly, treat as extract command
            if let Some(video) = cli.video {
                commands::extract::run(&video, &cli.options, cli.config.as_deref()).await
            } else {
                use clap::CommandFactory;
                Cli::command().print_help()?;
                println!();
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}
