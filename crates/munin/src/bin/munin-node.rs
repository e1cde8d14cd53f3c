//! Munin node daemon.
//!
//! # Usage
//!
//! ```bash
//! munin-node --config /etc/munin/munin.toml --name plant-7
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use munin::prelude::*;
use munin::runtime::RuntimeBuilder;
use tracing::info;

/// Serve Munin metrics over TCP.
#[derive(Debug, Parser)]
#[command(name = "munin-node", version, about)]
struct Cli {
    /// Configuration file to load instead of searching for one.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `production`.
    #[arg(short, long, value_name = "NAME")]
    profile: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Node name announced to clients.
    #[arg(long, value_name = "NODE")]
    name: Option<String>,
}

impl Cli {
    fn apply(self, mut builder: RuntimeBuilder) -> RuntimeBuilder {
        if let Some(path) = self.config {
            builder = builder.config_file(path);
        }
        if let Some(profile) = self.profile {
            builder = builder.profile(profile);
        }
        if let Some(port) = self.port {
            builder = builder.set("node.port", port);
        }
        if let Some(name) = self.name {
            builder = builder.set("node.name", name);
        }
        builder
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = cli
        .apply(MuninRuntime::builder())
        .build()
        .context("failed to load configuration")?;

    runtime.register_plugins(builtin_plugins())?;
    info!(
        address = %runtime.config().node.bind_address(),
        plugins = runtime.plugin_count(),
        "Plugins registered"
    );

    runtime.run().await?;

    Ok(())
}
