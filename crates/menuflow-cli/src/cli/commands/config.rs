//! Config command handlers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use menuflow_core::config;

fn resolve(path: Option<&Path>) -> PathBuf {
    path.map_or_else(config::paths::config_path, Path::to_path_buf)
}

pub fn path(path: Option<&Path>) {
    println!("{}", resolve(path).display());
}

pub fn init(path: Option<&Path>) -> Result<()> {
    let config_path = resolve(path);
    config::Config::init(&config_path).with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}
