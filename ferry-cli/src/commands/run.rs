//! Run the plugin host in the foreground

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use ferry_core::plugins::{DynamicLibraryInspector, LoadReport, PluginHost, PluginWatcher};

use super::HostArgs;

/// Arguments for `ferry run`
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub host: HostArgs,

    /// Hot-reload plugins when their modules change on disk
    #[arg(short, long)]
    pub watch: bool,

    /// Load everything, print the result, unload, and exit
    #[arg(long, conflicts_with = "watch")]
    pub once: bool,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = args.host.host_config()?;
    let host = PluginHost::new(config, Arc::new(DynamicLibraryInspector::new()));

    let report = host.load_plugins().await;
    print_report(&report);

    if !args.once {
        let watcher = if args.watch {
            let watcher = PluginWatcher::start(host.clone())?;
            println!("Watching for plugin changes (Ctrl+C to stop)");
            Some(watcher)
        } else {
            println!("Plugins running (Ctrl+C to stop)");
            None
        };

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");

        if let Some(watcher) = watcher {
            watcher.shutdown().await;
        }
    }

    let unloaded = host.unload_all().await;
    println!("Unloaded {} plugin(s)", unloaded);
    Ok(())
}

fn print_report(report: &LoadReport) {
    for name in &report.loaded {
        println!("✓ {}", name);
    }
    for path in &report.skipped {
        tracing::debug!(path = %path.display(), "Not a plugin");
    }
    for failure in &report.failures {
        println!("✗ {}", failure);
    }
    println!(
        "Loaded {} plugin(s), {} failure(s)",
        report.loaded.len(),
        report.failures.len()
    );
}
