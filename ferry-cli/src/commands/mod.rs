pub mod config;
pub mod list;
pub mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use ferry_core::PluginHostConfig;

use crate::config::ConfigLoader;

/// Options shared by commands that scan for plugins
#[derive(Args, Debug, Default, Clone)]
pub struct HostArgs {
    /// Plugin search root; repeat to scan several. Replaces configured roots.
    #[arg(long = "root", value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// Module file extension (defaults to the platform's shared library)
    #[arg(long)]
    pub extension: Option<String>,
}

impl HostArgs {
    /// Merged configuration with command-line overrides applied
    pub fn host_config(&self) -> Result<PluginHostConfig> {
        let config = ConfigLoader::load()?;
        Ok(self.apply(config.plugins))
    }

    fn apply(&self, mut config: PluginHostConfig) -> PluginHostConfig {
        if !self.roots.is_empty() {
            config.search_roots = self.roots.clone();
        }
        if let Some(extension) = &self.extension {
            config.extension = extension.clone();
        }
        config
    }
}
