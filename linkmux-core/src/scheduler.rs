//! Egress scheduler: round-robin distribution of outbound packets.
//!
//! Each packet read off the virtual interface is offered to exactly one
//! link, chosen by a cursor that walks the attached links in order. The
//! policy is deliberately lossy: if the cursor's link is not ready the
//! packet is dropped and the cursor stays put, so an unready link keeps
//! absorbing its share of the rotation instead of shifting load onto the
//! others. The cursor advances whenever a send is attempted, whether it
//! succeeds or fails.

use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, trace, warn};

use crate::frame::{Frame, MAX_PAYLOAD};
use crate::link::{Link, LinkError};
use crate::shutdown::ShutdownFlag;
use crate::tun::{InterfaceError, TunInterface};

/// Outcome of offering one frame to the rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The cursor's link accepted the frame.
    Sent,
    /// The cursor's link had no peer yet; the frame was dropped and the
    /// cursor left in place.
    NotReady,
    /// No links are attached; the frame was dropped.
    NoLinks,
}

/// Cursor plus link set, guarded as one unit so attachment during a
/// dispatch cannot skew the rotation.
struct Rotation {
    links: Vec<Arc<dyn Link>>,
    cursor: usize,
}

/// Round-robin egress scheduler shared between the pump thread and
/// whichever thread attaches links (startup, or the accept loop).
pub struct EgressScheduler {
    rotation: Mutex<Rotation>,
}

impl Default for EgressScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl EgressScheduler {
    pub fn new() -> Self {
        Self {
            rotation: Mutex::new(Rotation {
                links: Vec::new(),
                cursor: 0,
            }),
        }
    }

    /// Add a link to the end of the rotation.
    pub fn attach(&self, link: Arc<dyn Link>) {
        let mut rotation = self.rotation.lock().unwrap_or_else(|e| e.into_inner());
        info!(link = %link.describe(), total = rotation.links.len() + 1, "link attached");
        rotation.links.push(link);
    }

    pub fn link_count(&self) -> usize {
        self.rotation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .links
            .len()
    }

    /// Offer one frame to the link under the cursor.
    ///
    /// The cursor advances on [`DispatchOutcome::Sent`] and on send error,
    /// never on [`DispatchOutcome::NotReady`] or [`DispatchOutcome::NoLinks`].
    /// A send error drops the frame (no retry on another link) but still
    /// surfaces to the caller.
    pub fn dispatch(&self, frame: &Frame) -> Result<DispatchOutcome, LinkError> {
        let mut rotation = self.rotation.lock().unwrap_or_else(|e| e.into_inner());
        if rotation.links.is_empty() {
            trace!("no links attached, dropping packet");
            return Ok(DispatchOutcome::NoLinks);
        }

        let cursor = rotation.cursor % rotation.links.len();
        let link = Arc::clone(&rotation.links[cursor]);

        if !link.is_ready() {
            debug!(link = %link.describe(), "link not ready, dropping packet");
            return Ok(DispatchOutcome::NotReady);
        }

        rotation.cursor = (cursor + 1) % rotation.links.len();
        drop(rotation);

        match link.send(frame) {
            Ok(()) => {
                trace!(link = %link.describe(), bytes = frame.wire_len(), "dispatched frame");
                Ok(DispatchOutcome::Sent)
            }
            Err(e) => {
                warn!(link = %link.describe(), error = %e, "send failed, packet lost");
                Err(e)
            }
        }
    }

    /// Pump loop: read packets off the virtual interface and dispatch each
    /// as one data frame.
    ///
    /// Send failures are logged and the loop continues; an interface read
    /// failure is fatal and tears the pump down. Oversized packets (above
    /// the frame payload maximum) are dropped.
    pub fn run_pump(
        &self,
        tun: Arc<dyn TunInterface>,
        shutdown: &ShutdownFlag,
    ) -> Result<(), InterfaceError> {
        let mut buf = [0u8; MAX_PAYLOAD + 1];
        loop {
            if shutdown.is_triggered() {
                debug!("egress pump shutting down");
                return Ok(());
            }
            let n = tun.read_packet(&mut buf)?;
            if n > MAX_PAYLOAD {
                warn!(len = n, max = MAX_PAYLOAD, "oversized packet, dropping");
                continue;
            }
            let frame = Frame::data(buf[..n].to_vec());
            if let Err(e) = self.dispatch(&frame) {
                error!(error = %e, "dispatch failed");
            }
        }
    }
}
