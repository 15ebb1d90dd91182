//! In-memory interface adapter for tests and demos.
//!
//! [`MemoryTun`] implements [`TunInterface`] on top of a pair of channels:
//! the paired [`MemoryTunHandle`] injects "outbound" packets (what a real
//! kernel would hand to `read`) and collects "inbound" packets (what the
//! tunnel writes back). This stands in for the kernel device where creating
//! one is impossible (unit tests, unprivileged CI).

use std::io;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use super::{InterfaceError, TunInterface};

/// Channel-backed virtual device.
pub struct MemoryTun {
    name: String,
    inject_rx: Receiver<Vec<u8>>,
    collect_tx: Sender<Vec<u8>>,
}

/// Test-side handle paired with a [`MemoryTun`].
pub struct MemoryTunHandle {
    inject_tx: Sender<Vec<u8>>,
    collect_rx: Receiver<Vec<u8>>,
}

impl MemoryTun {
    /// Create a device/handle pair.
    pub fn pair(name: impl Into<String>) -> (Self, MemoryTunHandle) {
        let (inject_tx, inject_rx) = unbounded();
        let (collect_tx, collect_rx) = unbounded();
        (
            Self {
                name: name.into(),
                inject_rx,
                collect_tx,
            },
            MemoryTunHandle {
                inject_tx,
                collect_rx,
            },
        )
    }
}

impl TunInterface for MemoryTun {
    fn read_packet(&self, buf: &mut [u8]) -> Result<usize, InterfaceError> {
        let packet = self.inject_rx.recv().map_err(|_| {
            InterfaceError::Read(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "memory tun handle dropped",
            ))
        })?;
        let n = packet.len().min(buf.len());
        buf[..n].copy_from_slice(&packet[..n]);
        Ok(n)
    }

    fn write_packet(&self, buf: &[u8]) -> Result<(), InterfaceError> {
        self.collect_tx.send(buf.to_vec()).map_err(|_| {
            InterfaceError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "memory tun handle dropped",
            ))
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl MemoryTunHandle {
    /// Queue one packet for the tunnel to read.
    pub fn inject(&self, packet: Vec<u8>) {
        let _ = self.inject_tx.send(packet);
    }

    /// Wait up to `timeout` for a packet the tunnel wrote.
    pub fn collect(&self, timeout: Duration) -> Option<Vec<u8>> {
        match self.collect_rx.recv_timeout(timeout) {
            Ok(packet) => Some(packet),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_then_read() {
        let (tun, handle) = MemoryTun::pair("mem0");
        handle.inject(vec![1, 2, 3]);

        let mut buf = [0u8; 16];
        let n = tun.read_packet(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
        assert_eq!(tun.name(), "mem0");
    }

    #[test]
    fn test_write_then_collect() {
        let (tun, handle) = MemoryTun::pair("mem0");
        tun.write_packet(&[9, 8, 7]).unwrap();
        assert_eq!(
            handle.collect(Duration::from_millis(100)),
            Some(vec![9, 8, 7])
        );
        assert_eq!(handle.collect(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_read_fails_after_handle_drop() {
        let (tun, handle) = MemoryTun::pair("mem0");
        drop(handle);
        let mut buf = [0u8; 16];
        assert!(matches!(
            tun.read_packet(&mut buf),
            Err(InterfaceError::Read(_))
        ));
    }
}
