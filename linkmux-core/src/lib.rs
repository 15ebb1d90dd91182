//! Core library for the linkmux link-aggregating tunnel.
//!
//! linkmux bonds a local virtual network interface to one or more independent
//! TCP/UDP connections to a remote peer. Outbound packets read from the
//! interface are striped round-robin across the attached links; inbound frames
//! arriving on any link are merged back onto the interface.
//!
//! # Architecture
//!
//! - `frame`: wire framing shared by every link (length-prefixed, typed)
//! - `config`: link descriptors and validated tunnel configuration
//! - `tun`: the virtual interface adapter (Linux TUN, plus an in-memory
//!   implementation for tests)
//! - `link`: the transport abstraction and its TCP/UDP variants
//! - `listener`: the passive TCP endpoint that admits new peers at runtime
//! - `scheduler`: the egress scheduler (inverse multiplexer)
//! - `collector`: the ingress collector (inverse demultiplexer)
//! - `endpoint`: client/server orchestration of threads, links and interface
//!
//! The concurrency model is plain OS threads: one receive thread per link,
//! one packet-pump thread, one interface-writer thread, and (server only) one
//! accept-multiplexing thread. There is no async runtime.

pub mod collector;
pub mod config;
pub mod endpoint;
pub mod frame;
pub mod link;
pub mod listener;
pub mod scheduler;
pub mod shutdown;
pub mod tun;

pub use config::{LinkDescriptor, Role, Transport, TunnelConfig};
pub use endpoint::{Client, EndpointHandle, Server};
pub use frame::{Frame, FrameKind};
pub use shutdown::ShutdownFlag;
