//! The link abstraction: one transport connection carrying frames.
//!
//! A link wraps one socket, knows its [`LinkDescriptor`] identity, and holds
//! the ingress sender it feeds with reassembled frames. Variants:
//!
//! - [`TcpLink`]: stream transport, client-connected or server-accepted
//! - [`UdpClientLink`]: connected datagram transport
//! - [`UdpServerLink`]: bound datagram transport that learns its peer from
//!   the first datagram it receives
//!
//! Construction performs the OS-level connect/bind; a constructed link is
//! immediately usable except for [`UdpServerLink`], which reports
//! `is_ready() == false` until first contact.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use thiserror::Error;

use crate::config::LinkDescriptor;
use crate::frame::Frame;
use crate::shutdown::ShutdownFlag;

pub mod tcp;
pub mod udp;

pub use tcp::{read_frame, TcpLink};
pub use udp::{UdpClientLink, UdpServerLink};

/// Socket-level failures on a link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to resolve {authority}: {source}")]
    Resolve {
        authority: String,
        source: io::Error,
    },

    #[error("{authority} did not resolve to any address")]
    NoAddress { authority: String },

    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("bind failed: {0}")]
    Bind(#[source] io::Error),

    #[error("listen failed: {0}")]
    Listen(#[source] io::Error),

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("peer claimed a {0}-byte payload, above the frame maximum")]
    FrameTooLarge(usize),

    #[error("link has no peer yet")]
    NotReady,

    #[error("ingress collector has shut down")]
    IngressClosed,
}

/// One transport connection between this endpoint and a peer.
pub trait Link: Send + Sync {
    /// The static identity this link was built from.
    fn descriptor(&self) -> &LinkDescriptor;

    /// Whether the link currently has an addressable peer.
    ///
    /// Always true except for a [`UdpServerLink`] before its first inbound
    /// datagram; the scheduler must not select a link that is not ready.
    fn is_ready(&self) -> bool {
        true
    }

    /// Write the full frame (header + payload) to the transport.
    ///
    /// Short writes are retried internally; an unrecoverable error loses the
    /// message (no buffering or retry across failures).
    fn send(&self, frame: &Frame) -> Result<(), LinkError>;

    /// Receive until the link dies, forwarding each reassembled frame to the
    /// ingress collector. Observes `shutdown` between frames.
    fn run_receive_loop(&self, shutdown: &ShutdownFlag) -> Result<(), LinkError>;

    /// Stable `"<TRANSPORT>:<ip>:<port>"` identity string.
    fn describe(&self) -> String {
        self.descriptor().to_string()
    }
}

/// Resolve a descriptor's authority to one socket address.
pub(crate) fn resolve(desc: &LinkDescriptor) -> Result<SocketAddr, LinkError> {
    let authority = desc.authority();
    authority
        .to_socket_addrs()
        .map_err(|source| LinkError::Resolve {
            authority: authority.clone(),
            source,
        })?
        .next()
        .ok_or(LinkError::NoAddress { authority })
}
