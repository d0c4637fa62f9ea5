//! Init command implementation

use anyhow::Result;
use std::path::Path;

use emerge::config::Config;

/// Write the default configuration (to ~/.emerge/config.toml unless a path is given)
pub fn init_command(config_path: Option<&Path>, force: bool) -> Result<()> {
    let global = Config::global_config_path();
    let config_path = config_path.unwrap_or(&global);

    Config::default().save_to_file(config_path, force)?;
    println!("Created: {}", config_path.display());

    Ok(())
}
