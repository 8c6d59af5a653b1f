//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use menuflow_core::config;

mod commands;

#[derive(Parser)]
#[command(name = "menuflow")]
#[command(version)]
#[command(about = "Headless driver for menu overlay navigation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $MENUFLOW_HOME/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Runs a scene script
    Run {
        /// Scene file (TOML)
        #[arg(value_name = "SCENE")]
        scene: PathBuf,

        /// Pace ticks at the configured framerate
        #[arg(long)]
        realtime: bool,
    },
    /// Runs the built-in Settings/Confirm scene
    Demo {
        /// Wait for each close before the next open
        #[arg(long)]
        sequential: bool,

        /// Pace ticks at the configured framerate
        #[arg(long)]
        realtime: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // config commands never need the runtime or a subscriber
    if let Commands::Config { command } = &cli.command {
        return match command {
            ConfigCommands::Path => {
                commands::config::path(cli.config.as_deref());
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(cli.config.as_deref()),
        };
    }

    let config = match cli.config.as_deref() {
        Some(path) => config::Config::load_from(path),
        None => config::Config::load(),
    }
    .context("load config")?;
    let _log_guard = crate::logging::init(&config.log_level, cli.log_file.as_deref())?;

    // single-threaded: navigation tasks run between ticks
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("create tokio runtime")?;

    rt.block_on(async move {
        match cli.command {
            Commands::Run { scene, realtime } => commands::run::run(&scene, &config, realtime).await,
            Commands::Demo { sequential, realtime } => commands::demo::run(config, sequential, realtime).await,
            Commands::Config { .. } => Ok(()),
        }
    })
}
