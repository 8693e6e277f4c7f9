//! List plugin modules

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use ferry_core::PluginHostConfig;
use ferry_core::plugins::{DynamicLibraryInspector, PluginHost, PluginInfo, plugin_name};

use super::HostArgs;

/// Arguments for `ferry list`
#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub host: HostArgs,

    /// Load each module and show what it reports about itself
    #[arg(long)]
    pub load: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ListArgs) -> Result<()> {
    let config = args.host.host_config()?;
    if args.load {
        list_loaded(config, args.json).await
    } else {
        list_modules(config, args.json)
    }
}

fn list_modules(config: PluginHostConfig, json: bool) -> Result<()> {
    let discovery = ferry_core::plugins::discover(&config);
    for error in &discovery.errors {
        tracing::warn!(error = %error, "Discovery incomplete");
    }

    if json {
        let entries: Vec<_> = discovery
            .modules
            .iter()
            .map(|path| {
                serde_json::json!({
                    "name": plugin_name(path),
                    "path": path,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if discovery.modules.is_empty() {
        print_empty(&config);
        return Ok(());
    }

    for path in &discovery.modules {
        let name = plugin_name(path).unwrap_or_else(|| "?".to_string());
        println!("{:<24} {}", name, path.display());
    }
    Ok(())
}

async fn list_loaded(config: PluginHostConfig, json: bool) -> Result<()> {
    let host = PluginHost::new(config, Arc::new(DynamicLibraryInspector::new()));
    let report = host.load_plugins().await;
    for failure in &report.failures {
        eprintln!("✗ {}", failure);
    }

    let plugins = host.list_plugins().await;
    host.unload_all().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&plugins)?);
        return Ok(());
    }

    if plugins.is_empty() {
        print_empty(host.config());
        return Ok(());
    }

    for info in &plugins {
        println!("{}", describe(info));
    }
    Ok(())
}

fn describe(info: &PluginInfo) -> String {
    let description = if info.manifest.description.is_empty() {
        "No description"
    } else {
        info.manifest.description.as_str()
    };
    format!(
        "✓ {} v{}    {}",
        info.name, info.manifest.version, description
    )
}

fn print_empty(config: &PluginHostConfig) {
    println!("No plugin modules found");
    println!();
    println!("Searched:");
    for root in config.effective_roots() {
        println!("  {}", root.display());
    }
    println!();
    println!(
        "Plugins are shared libraries ending in .{}",
        config.normalized_extension()
    );
}
