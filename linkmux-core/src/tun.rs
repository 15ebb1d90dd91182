//! Virtual interface adapter.
//!
//! The adapter wraps exactly one packet-oriented virtual network device: one
//! `read` yields exactly one outbound packet, one `write` consumes exactly one
//! inbound packet's payload. It exists for the lifetime of its endpoint and
//! the underlying handle is never duplicated.
//!
//! Implementations:
//! - `linux`: the kernel TUN device via `/dev/net/tun` (Linux only)
//! - `memory`: a channel-backed device for tests and demos

use std::io;
use thiserror::Error;

#[cfg(target_os = "linux")]
pub mod linux;
pub mod memory;

#[cfg(target_os = "linux")]
pub use linux::LinuxTun;
pub use memory::{MemoryTun, MemoryTunHandle};

/// Virtual-device failures.
#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("failed to open clone device {path:?}: {source}")]
    Open {
        path: String,
        source: io::Error,
    },

    #[error("failed to create interface: {0}")]
    Create(#[source] io::Error),

    #[error("interface read failed: {0}")]
    Read(#[source] io::Error),

    #[error("interface write failed: {0}")]
    Write(#[source] io::Error),
}

/// A virtual network device with packet read/write semantics.
///
/// Read failures are fatal to the endpoint's packet pump; write failures are
/// logged and swallowed by the ingress collector (the packet is dropped), so
/// a single damaged write never tears the endpoint down.
pub trait TunInterface: Send + Sync {
    /// Blocking read of exactly one outbound packet into `buf`.
    ///
    /// Returns the packet length. `buf` bounds the packet size; callers pass
    /// a buffer of [`frame::MAX_PAYLOAD`](crate::frame::MAX_PAYLOAD) bytes so
    /// one packet always fits one frame.
    fn read_packet(&self, buf: &mut [u8]) -> Result<usize, InterfaceError>;

    /// Write one inbound packet's payload, retrying short writes.
    fn write_packet(&self, buf: &[u8]) -> Result<(), InterfaceError>;

    /// Interface name (kernel-assigned when the configured name was empty).
    fn name(&self) -> &str;
}
