//! Command line surface.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use linkmux_core::{LinkDescriptor, Role};

/// Bond multiple network links into one virtual interface.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("role").required(true).args(["client", "server"])))]
pub struct Cli {
    /// Run as the dialing endpoint.
    #[arg(short = 'c', long)]
    pub client: bool,

    /// Run as the listening endpoint.
    #[arg(short = 's', long)]
    pub server: bool,

    /// Name for the virtual interface (empty lets the kernel pick).
    #[arg(short = 'i', long, default_value = "")]
    pub ifname: String,

    /// Path to the TUN clone device.
    #[arg(long, default_value = linkmux_core::config::DEFAULT_TUN_PATH)]
    pub tun_path: String,

    /// Links as comma-separated `<tcp|udp>:<host>:<port>` descriptors.
    /// Overrides any links from the config file.
    #[arg(short = 'l', long, value_delimiter = ',')]
    pub links: Vec<LinkDescriptor>,

    /// Read settings from a TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the effective configuration to the --config path and exit.
    #[arg(long, requires = "config")]
    pub init_config: bool,

    /// Increase log verbosity (-d: debug, -dd: trace).
    #[arg(short = 'd', long = "debug", action = clap::ArgAction::Count)]
    pub debug: u8,
}

impl Cli {
    pub fn role(&self) -> Role {
        if self.server {
            Role::Server
        } else {
            Role::Client
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkmux_core::Transport;

    #[test]
    fn test_requires_a_role() {
        assert!(Cli::try_parse_from(["linkmux"]).is_err());
    }

    #[test]
    fn test_roles_are_exclusive() {
        assert!(Cli::try_parse_from(["linkmux", "-c", "-s"]).is_err());
    }

    #[test]
    fn test_parses_link_list() {
        let cli = Cli::try_parse_from([
            "linkmux",
            "-c",
            "-i",
            "bond0",
            "-l",
            "tcp:10.0.0.1:9000,udp:10.0.0.2:9001",
        ])
        .unwrap();
        assert_eq!(cli.role(), Role::Client);
        assert_eq!(cli.ifname, "bond0");
        assert_eq!(cli.links.len(), 2);
        assert_eq!(cli.links[0].transport, Transport::Tcp);
        assert_eq!(cli.links[1].port, 9001);
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["linkmux", "-s", "-dd"]).unwrap();
        assert_eq!(cli.debug, 2);
    }

    #[test]
    fn test_init_config_needs_config_path() {
        assert!(Cli::try_parse_from(["linkmux", "-s", "--init-config"]).is_err());
    }
}
