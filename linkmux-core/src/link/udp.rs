//! UDP link variants.
//!
//! UDP is already packet-delimited, so one `recv` yields at most one frame
//! and there is no retry-to-fill. Datagrams too short to hold a header are
//! discarded.
//!
//! The server variant starts without a peer: the source address of the first
//! datagram is captured once and becomes the target of every subsequent
//! send. It is never relearned, even if later datagrams arrive from a
//! different source (e.g. after a NAT rebind).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::RwLock;

use tracing::{debug, info, trace, warn};

use super::{resolve, Link, LinkError};
use crate::collector::IngressSender;
use crate::config::LinkDescriptor;
use crate::frame::{self, Frame, HEADER_LEN, MAX_FRAME};
use crate::shutdown::ShutdownFlag;

/// Decode one datagram into a frame.
///
/// Returns `None` for runt datagrams (shorter than the header). If the header
/// claims more payload than the datagram carries, the carried bytes win.
fn decode_datagram(buf: &[u8]) -> Option<Frame> {
    if buf.len() < HEADER_LEN {
        debug!(len = buf.len(), "runt datagram, discarding");
        return None;
    }

    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&buf[..HEADER_LEN]);
    let (kind, claimed) = frame::decode_header(&header);

    let available = buf.len() - HEADER_LEN;
    let take = (claimed as usize).min(available);
    if claimed as usize > available {
        warn!(
            claimed = claimed,
            available = available,
            "datagram truncated, delivering carried bytes"
        );
    }

    Some(Frame::new(kind, buf[HEADER_LEN..HEADER_LEN + take].to_vec()))
}

fn wildcard_bind_addr(remote: &SocketAddr) -> SocketAddr {
    match remote {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

/// A datagram link connected to a fixed remote peer.
pub struct UdpClientLink {
    desc: LinkDescriptor,
    socket: UdpSocket,
    ingress: IngressSender,
}

impl UdpClientLink {
    /// Bind an ephemeral local socket and connect it to the peer.
    pub fn connect(desc: LinkDescriptor, ingress: IngressSender) -> Result<Self, LinkError> {
        let addr = resolve(&desc)?;
        let socket = UdpSocket::bind(wildcard_bind_addr(&addr)).map_err(LinkError::Bind)?;
        socket.connect(addr).map_err(LinkError::Connect)?;
        info!(link = %desc, "connected");
        Ok(Self {
            desc,
            socket,
            ingress,
        })
    }
}

impl Link for UdpClientLink {
    fn descriptor(&self) -> &LinkDescriptor {
        &self.desc
    }

    fn send(&self, frame: &Frame) -> Result<(), LinkError> {
        // One frame, one datagram.
        let wire = frame.encode();
        self.socket.send(&wire).map_err(LinkError::Write)?;
        trace!(link = %self.desc, bytes = wire.len(), "sent frame");
        Ok(())
    }

    fn run_receive_loop(&self, shutdown: &ShutdownFlag) -> Result<(), LinkError> {
        let mut buf = [0u8; MAX_FRAME];
        loop {
            if shutdown.is_triggered() {
                debug!(link = %self.desc, "receive loop shutting down");
                return Ok(());
            }
            let n = self.socket.recv(&mut buf).map_err(LinkError::Read)?;
            if let Some(frame) = decode_datagram(&buf[..n]) {
                trace!(link = %self.desc, bytes = n, "received frame");
                self.ingress.deliver(frame)?;
            }
        }
    }
}

/// A bound datagram link that learns its peer from first contact.
pub struct UdpServerLink {
    desc: LinkDescriptor,
    socket: UdpSocket,
    peer: RwLock<Option<SocketAddr>>,
    ingress: IngressSender,
}

impl UdpServerLink {
    /// Bind to the address named by `desc`. No peer is known yet.
    pub fn bind(desc: LinkDescriptor, ingress: IngressSender) -> Result<Self, LinkError> {
        let addr = resolve(&desc)?;
        let socket = UdpSocket::bind(addr).map_err(LinkError::Bind)?;
        info!(link = %desc, bound = %socket.local_addr().map_err(LinkError::Bind)?, "bound");
        Ok(Self {
            desc,
            socket,
            peer: RwLock::new(None),
            ingress,
        })
    }

    /// The locally bound address (useful when the descriptor used port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        self.socket.local_addr().map_err(LinkError::Bind)
    }

    fn peer(&self) -> Option<SocketAddr> {
        *self.peer.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Receive one datagram, learning the peer on first contact.
    ///
    /// Returns `None` for discarded runt datagrams.
    fn recv_once(&self, buf: &mut [u8]) -> Result<Option<Frame>, LinkError> {
        let (n, from) = self.socket.recv_from(buf).map_err(LinkError::Read)?;

        // First contact wins; later sources never replace the learned peer.
        {
            let mut peer = self.peer.write().unwrap_or_else(|e| e.into_inner());
            if peer.is_none() {
                info!(link = %self.desc, peer = %from, "learned peer");
                *peer = Some(from);
            }
        }

        Ok(decode_datagram(&buf[..n]))
    }
}

impl Link for UdpServerLink {
    fn descriptor(&self) -> &LinkDescriptor {
        &self.desc
    }

    fn is_ready(&self) -> bool {
        self.peer().is_some()
    }

    fn send(&self, frame: &Frame) -> Result<(), LinkError> {
        let Some(peer) = self.peer() else {
            return Err(LinkError::NotReady);
        };
        let wire = frame.encode();
        self.socket.send_to(&wire, peer).map_err(LinkError::Write)?;
        trace!(link = %self.desc, peer = %peer, bytes = wire.len(), "sent frame");
        Ok(())
    }

    fn run_receive_loop(&self, shutdown: &ShutdownFlag) -> Result<(), LinkError> {
        let mut buf = [0u8; MAX_FRAME];
        loop {
            if shutdown.is_triggered() {
                debug!(link = %self.desc, "receive loop shutting down");
                return Ok(());
            }
            if let Some(frame) = self.recv_once(&mut buf)? {
                self.ingress.deliver(frame)?;
            }
        }
    }
}
