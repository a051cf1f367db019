//! Implementation of the `tasklock config` command.

use crate::cli::ConfigArgs;
use crate::config::Config;
use crate::error::Result;

/// Print the effective config as YAML.
pub fn cmd_config(args: ConfigArgs) -> Result<()> {
    let config = Config::resolve(args.config.as_deref(), None)?;
    print!("{}", config.to_yaml()?);
    Ok(())
}
