pub mod collect;
pub mod list;
pub mod status;

use anyhow::Result;
use std::path::Path;

use gather::config::Config;

// Re-export command functions for convenience
pub use collect::{collect, CollectArgs};
pub use list::{list, ListArgs};
pub use status::{status, StatusArgs};

/// Load the file configuration (or defaults), then overlay `GATHER_*` variables
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env();
    Ok(config)
}
