//! Ingress collector: the inverse demultiplexer.
//!
//! Every link's receive thread forwards decoded frames here; the collector
//! merges them onto the virtual interface. Rather than letting each receive
//! thread write to the interface directly, frames pass through one bounded
//! channel into a single writer loop, so the interface write path has exactly
//! one owner. No ordering is guaranteed between frames arriving on different
//! links.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace, warn};

use crate::frame::Frame;
use crate::link::LinkError;
use crate::shutdown::ShutdownFlag;
use crate::tun::TunInterface;

/// Depth of the funnel between receive threads and the interface writer.
pub const INGRESS_QUEUE_DEPTH: usize = 512;

/// How often the writer loop wakes to observe the shutdown flag.
const WRITER_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Clonable producer half held by every link.
#[derive(Clone)]
pub struct IngressSender {
    tx: Sender<Frame>,
}

impl IngressSender {
    /// Hand one fully reassembled frame to the collector.
    ///
    /// Blocks while the funnel is full (backpressure onto the link's receive
    /// thread). Fails only once the collector has shut down.
    pub fn deliver(&self, frame: Frame) -> Result<(), LinkError> {
        self.tx.send(frame).map_err(|_| LinkError::IngressClosed)
    }
}

/// Consumer half: the single writer onto the interface adapter.
pub struct IngressCollector {
    rx: Receiver<Frame>,
    tun: Arc<dyn TunInterface>,
}

impl IngressCollector {
    /// Create a collector writing to `tun`, plus the sender links clone.
    pub fn new(tun: Arc<dyn TunInterface>) -> (Self, IngressSender) {
        let (tx, rx) = bounded(INGRESS_QUEUE_DEPTH);
        (Self { rx, tun }, IngressSender { tx })
    }

    /// Writer loop: pop frames and write each payload to the interface.
    ///
    /// Interface write failures are logged and the frame is dropped; a single
    /// damaged write must not tear down the endpoint. Returns when shutdown
    /// is requested or every sender is gone.
    pub fn run(&self, shutdown: &ShutdownFlag) {
        loop {
            if shutdown.is_triggered() {
                debug!("ingress collector shutting down");
                return;
            }
            match self.rx.recv_timeout(WRITER_POLL_INTERVAL) {
                Ok(frame) => {
                    trace!(
                        len = frame.payload.len(),
                        kind = %frame.kind,
                        tun = self.tun.name(),
                        "writing inbound frame to interface"
                    );
                    if let Err(e) = self.tun.write_packet(&frame.payload) {
                        warn!(error = %e, "interface write failed, dropping packet");
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("all ingress senders gone, collector exiting");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tun::MemoryTun;

    #[test]
    fn test_delivered_frames_reach_interface() {
        let (tun, handle) = MemoryTun::pair("mem0");
        let (collector, sender) = IngressCollector::new(Arc::new(tun));
        let shutdown = ShutdownFlag::new();

        sender.deliver(Frame::data(vec![1, 2, 3])).unwrap();
        sender.deliver(Frame::data(vec![4, 5])).unwrap();
        drop(sender); // lets run() terminate

        collector.run(&shutdown);

        assert_eq!(handle.collect(Duration::from_millis(100)), Some(vec![1, 2, 3]));
        assert_eq!(handle.collect(Duration::from_millis(100)), Some(vec![4, 5]));
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let (tun, handle) = MemoryTun::pair("mem0");
        drop(handle); // every write now fails
        let (collector, sender) = IngressCollector::new(Arc::new(tun));

        sender.deliver(Frame::data(vec![1])).unwrap();
        sender.deliver(Frame::data(vec![2])).unwrap();
        drop(sender);

        // Must terminate without panicking despite failed writes.
        collector.run(&ShutdownFlag::new());
    }

    #[test]
    fn test_deliver_after_collector_drop() {
        let (tun, _handle) = MemoryTun::pair("mem0");
        let (collector, sender) = IngressCollector::new(Arc::new(tun));
        drop(collector);
        assert!(matches!(
            sender.deliver(Frame::data(vec![1])),
            Err(LinkError::IngressClosed)
        ));
    }
}
