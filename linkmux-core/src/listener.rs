//! Nonblocking TCP accept sockets for the server endpoint.
//!
//! Each configured TCP descriptor gets one [`LinkListener`]. The server's
//! accept loop polls all of them for readiness and calls [`accept_one`]
//! on whichever fired; the listener sockets stay nonblocking so a spurious
//! wakeup never wedges the loop, while accepted streams are switched back
//! to blocking mode for the per-link receive thread.
//!
//! [`accept_one`]: LinkListener::accept_one

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, RawFd};

use tracing::{debug, info};

use crate::collector::IngressSender;
use crate::config::{LinkDescriptor, Transport};
use crate::link::{resolve, LinkError, TcpLink};

/// One bound, nonblocking TCP accept socket.
pub struct LinkListener {
    desc: LinkDescriptor,
    listener: TcpListener,
    ingress: IngressSender,
}

impl LinkListener {
    /// Bind to the address named by `desc` and start listening.
    pub fn bind(desc: LinkDescriptor, ingress: IngressSender) -> Result<Self, LinkError> {
        let addr = resolve(&desc)?;
        let listener = TcpListener::bind(addr).map_err(LinkError::Bind)?;
        listener.set_nonblocking(true).map_err(LinkError::Listen)?;
        info!(
            listener = %desc,
            bound = %listener.local_addr().map_err(LinkError::Bind)?,
            "listening"
        );
        Ok(Self {
            desc,
            listener,
            ingress,
        })
    }

    pub fn descriptor(&self) -> &LinkDescriptor {
        &self.desc
    }

    /// The locally bound address (useful when the descriptor used port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        self.listener.local_addr().map_err(LinkError::Bind)
    }

    /// Accept one pending connection, if any.
    ///
    /// Returns `Ok(None)` when no connection is queued (`WouldBlock`). The
    /// accepted stream is put back into blocking mode and wrapped as a
    /// [`TcpLink`] whose descriptor names the remote peer.
    pub fn accept_one(&self) -> Result<Option<TcpLink>, LinkError> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false).map_err(LinkError::Accept)?;
                info!(listener = %self.desc, peer = %peer, "accepted connection");
                let desc = LinkDescriptor::new(Transport::Tcp, peer.ip().to_string(), peer.port());
                Ok(Some(TcpLink::from_stream(desc, stream, self.ingress.clone())))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!(listener = %self.desc, "spurious accept wakeup");
                Ok(None)
            }
            Err(e) => Err(LinkError::Accept(e)),
        }
    }
}

impl AsRawFd for LinkListener {
    fn as_raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}
