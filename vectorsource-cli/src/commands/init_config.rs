//! Init-config command - write a dispatch configuration file with defaults.

use std::path::Path;

use vectorsource::executor::DispatchConfig;

use crate::error::CliError;

/// Run the init-config command.
pub fn run(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::InvalidArgument(format!(
            "'{}' already exists (use --force to overwrite)",
            path.display()
        )));
    }

    let config = DispatchConfig::default();
    config.save_to(path)?;

    println!("Configuration file: {}", path.display());
    println!("  queue_capacity   = {}", config.queue_capacity);
    println!("  pool_size        = {}", config.pool_size);
    println!("  fetch_timeout_ms = {}", config.fetch_timeout.as_millis());
    Ok(())
}
