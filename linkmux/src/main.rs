//! Link-aggregating tunnel daemon.
//!
//! Bonds one or more TCP/UDP links into a single virtual TUN interface:
//! outbound packets are striped round-robin across the links, inbound
//! frames from every link are merged back onto the interface.

mod cli;
mod config_file;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use linkmux_core::tun::{LinuxTun, TunInterface};
use linkmux_core::{Client, Role, Server, TunnelConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn init_logging(debug: u8) {
    let default = match debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

/// Merge the config file (if any) with command line overrides.
fn effective_config(cli: &Cli) -> Result<TunnelConfig> {
    let mut cfg = match &cli.config {
        Some(path) if !cli.init_config => config_file::load(path)?,
        _ => TunnelConfig::default(),
    };

    if !cli.ifname.is_empty() {
        cfg.if_name = cli.ifname.clone();
    }
    if cli.tun_path != linkmux_core::config::DEFAULT_TUN_PATH {
        cfg.tun_path = cli.tun_path.clone();
    }
    if !cli.links.is_empty() {
        cfg.links = cli.links.clone();
    }
    Ok(cfg)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let role = cli.role();
    let cfg = effective_config(&cli)?;

    if cli.init_config {
        let path = cli
            .config
            .as_deref()
            .context("--init-config requires --config")?;
        config_file::save(path, &cfg)?;
        info!(path = %path.display(), "wrote config");
        return Ok(());
    }

    cfg.validate(role).context("invalid configuration")?;

    let tun = LinuxTun::open(&cfg.if_name, &cfg.tun_path)
        .context("failed to create virtual interface")?;
    info!(tun = tun.name(), ?role, links = cfg.links.len(), "starting");

    let handle = match role {
        Role::Client => Client::new(&cfg.links, Arc::new(tun))?.run()?,
        Role::Server => Server::new(&cfg.links, Arc::new(tun))?.run()?,
    };

    // Runs until killed; per-thread failures are logged, and a dead
    // interface triggers shutdown from the pump thread.
    handle.join();
    Ok(())
}
