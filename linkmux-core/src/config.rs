//! Link descriptors and validated tunnel configuration.
//!
//! The CLI/config layer produces a fully validated [`TunnelConfig`] plus a
//! [`Role`]; the core consumes them and otherwise never looks at the command
//! line. Link descriptors use the textual form `TRANSPORT:IP:PORT`
//! (e.g. `TCP:203.0.113.7:9000`), which doubles as the bookkeeping key used
//! by the scheduler and orchestration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum interface name length (Linux IFNAMSIZ).
pub const MAX_IFNAME_LEN: usize = 16;

/// Default clone device from which TUN interfaces are created.
pub const DEFAULT_TUN_PATH: &str = "/dev/net/tun";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown transport {0:?} (expected TCP or UDP)")]
    UnknownTransport(String),

    #[error("malformed link descriptor {0:?} (expected TRANSPORT:IP:PORT)")]
    MalformedDescriptor(String),

    #[error("invalid port in link descriptor {0:?}")]
    InvalidPort(String),

    #[error("interface name {0:?} longer than {MAX_IFNAME_LEN} characters")]
    InterfaceNameTooLong(String),

    #[error("client mode requires at least one link descriptor")]
    NoLinks,

    #[error("duplicate link descriptor {0}")]
    DuplicateDescriptor(LinkDescriptor),
}

/// Operating role of the endpoint. Exactly one is selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiates every configured link.
    Client,
    /// Binds UDP links and TCP listeners, admits peers dynamically.
    Server,
}

/// Link transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp,
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => write!(f, "TCP"),
            Transport::Udp => write!(f, "UDP"),
        }
    }
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("TCP") {
            Ok(Transport::Tcp)
        } else if s.eq_ignore_ascii_case("UDP") {
            Ok(Transport::Udp)
        } else {
            Err(ConfigError::UnknownTransport(s.to_string()))
        }
    }
}

/// Static identity of one link: transport, remote/bind host, port.
///
/// Equality is the full tuple; the [`Display`](fmt::Display) form
/// `"<TRANSPORT>:<ip>:<port>"` is the dictionary key used throughout
/// orchestration, so descriptors must be unique among attached links.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LinkDescriptor {
    /// Transport protocol.
    pub transport: Transport,
    /// Remote address (client) or bind address (server).
    pub host: String,
    /// Remote or bind port.
    pub port: u16,
}

impl LinkDescriptor {
    /// Create a descriptor from parts.
    pub fn new(transport: Transport, host: impl Into<String>, port: u16) -> Self {
        Self {
            transport,
            host: host.into(),
            port,
        }
    }

    /// The `host:port` authority part, suitable for socket address resolution.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parse a comma-separated descriptor list, e.g.
    /// `"TCP:10.0.0.1:9000,UDP:10.0.0.1:9001"`.
    pub fn parse_list(s: &str) -> Result<Vec<LinkDescriptor>, ConfigError> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for LinkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.transport, self.host, self.port)
    }
}

impl FromStr for LinkDescriptor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // TRANSPORT is everything before the first colon, the port everything
        // after the last one. The host in between may itself contain colons
        // (IPv6 literals).
        let (transport, rest) = s
            .split_once(':')
            .ok_or_else(|| ConfigError::MalformedDescriptor(s.to_string()))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::MalformedDescriptor(s.to_string()))?;
        if host.is_empty() {
            return Err(ConfigError::MalformedDescriptor(s.to_string()));
        }

        let transport: Transport = transport.parse()?;
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::InvalidPort(s.to_string()))?;

        Ok(LinkDescriptor::new(transport, host, port))
    }
}

impl TryFrom<String> for LinkDescriptor {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<LinkDescriptor> for String {
    fn from(desc: LinkDescriptor) -> String {
        desc.to_string()
    }
}

/// Validated configuration consumed by the endpoint orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Interface name; empty lets the kernel pick one.
    #[serde(default)]
    pub if_name: String,

    /// Clone device from which the interface is created.
    #[serde(default = "default_tun_path")]
    pub tun_path: String,

    /// Links to establish (client) or bind (server).
    #[serde(default)]
    pub links: Vec<LinkDescriptor>,
}

fn default_tun_path() -> String {
    DEFAULT_TUN_PATH.to_string()
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            if_name: String::new(),
            tun_path: default_tun_path(),
            links: Vec::new(),
        }
    }
}

impl TunnelConfig {
    /// Validate the configuration for the given role.
    ///
    /// Checks the interface name length, descriptor uniqueness, and that a
    /// client has at least one link to establish. A server may start with an
    /// empty set only in theory; it still needs descriptors to bind anything,
    /// so the same minimum applies.
    pub fn validate(&self, role: Role) -> Result<(), ConfigError> {
        if self.if_name.len() > MAX_IFNAME_LEN {
            return Err(ConfigError::InterfaceNameTooLong(self.if_name.clone()));
        }

        if self.links.is_empty() && role == Role::Client {
            return Err(ConfigError::NoLinks);
        }

        for (i, desc) in self.links.iter().enumerate() {
            if self.links[..i].contains(desc) {
                return Err(ConfigError::DuplicateDescriptor(desc.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_parse_display_roundtrip() {
        for s in ["TCP:127.0.0.1:9000", "UDP:10.0.0.1:1", "TCP:example.net:65535"] {
            let desc: LinkDescriptor = s.parse().unwrap();
            assert_eq!(desc.to_string(), s);
        }
    }

    #[test]
    fn test_descriptor_parse_ipv6_host() {
        let desc: LinkDescriptor = "UDP:::1:9000".parse().unwrap();
        assert_eq!(desc.transport, Transport::Udp);
        assert_eq!(desc.host, "::1");
        assert_eq!(desc.port, 9000);
    }

    #[test]
    fn test_descriptor_rejects_garbage() {
        assert!(matches!(
            "TCP:127.0.0.1".parse::<LinkDescriptor>(),
            Err(ConfigError::MalformedDescriptor(_))
        ));
        assert!(matches!(
            "SCTP:127.0.0.1:9000".parse::<LinkDescriptor>(),
            Err(ConfigError::UnknownTransport(_))
        ));
        assert!(matches!(
            "TCP:127.0.0.1:99999".parse::<LinkDescriptor>(),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            "no-colons".parse::<LinkDescriptor>(),
            Err(ConfigError::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn test_parse_list() {
        let links =
            LinkDescriptor::parse_list("TCP:127.0.0.1:9000, UDP:127.0.0.1:9001").unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].transport, Transport::Tcp);
        assert_eq!(links[1].transport, Transport::Udp);
    }

    #[test]
    fn test_validate_client_requires_links() {
        let cfg = TunnelConfig::default();
        assert!(matches!(cfg.validate(Role::Client), Err(ConfigError::NoLinks)));
    }

    #[test]
    fn test_validate_rejects_long_if_name() {
        let cfg = TunnelConfig {
            if_name: "a".repeat(MAX_IFNAME_LEN + 1),
            links: LinkDescriptor::parse_list("TCP:127.0.0.1:9000").unwrap(),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(Role::Client),
            Err(ConfigError::InterfaceNameTooLong(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let cfg = TunnelConfig {
            links: LinkDescriptor::parse_list("TCP:127.0.0.1:9000,TCP:127.0.0.1:9000")
                .unwrap(),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(Role::Server),
            Err(ConfigError::DuplicateDescriptor(_))
        ));
    }

    #[test]
    fn test_validate_accepts_mixed_links() {
        let cfg = TunnelConfig {
            if_name: "tunb0".to_string(),
            links: LinkDescriptor::parse_list("TCP:127.0.0.1:9000,UDP:127.0.0.1:9000")
                .unwrap(),
            ..Default::default()
        };
        assert!(cfg.validate(Role::Client).is_ok());
        assert!(cfg.validate(Role::Server).is_ok());
    }
}
