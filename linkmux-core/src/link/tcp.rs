//! TCP link variant (client-connected or server-accepted).
//!
//! TCP is a byte stream, so the receive path reframes: read exactly the
//! 3-byte header, decode the payload length, then read exactly that many
//! payload bytes, however fragmented the underlying delivery is.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use tracing::{debug, info, trace};

use super::{resolve, Link, LinkError};
use crate::collector::IngressSender;
use crate::config::LinkDescriptor;
use crate::frame::{self, Frame, HEADER_LEN, MAX_PAYLOAD};
use crate::shutdown::ShutdownFlag;

/// A stream link over one TCP connection.
pub struct TcpLink {
    desc: LinkDescriptor,
    stream: TcpStream,
    ingress: IngressSender,
}

impl TcpLink {
    /// Connect to the peer named by `desc`.
    pub fn connect(desc: LinkDescriptor, ingress: IngressSender) -> Result<Self, LinkError> {
        let addr = resolve(&desc)?;
        let stream = TcpStream::connect(addr).map_err(LinkError::Connect)?;
        info!(link = %desc, "connected");
        Ok(Self {
            desc,
            stream,
            ingress,
        })
    }

    /// Wrap an already connected stream (server accept path).
    pub fn from_stream(
        desc: LinkDescriptor,
        stream: TcpStream,
        ingress: IngressSender,
    ) -> Self {
        Self {
            desc,
            stream,
            ingress,
        }
    }
}

impl Link for TcpLink {
    fn descriptor(&self) -> &LinkDescriptor {
        &self.desc
    }

    fn send(&self, frame: &Frame) -> Result<(), LinkError> {
        let wire = frame.encode();
        // write_all retries short writes until the frame is fully on the wire.
        (&self.stream).write_all(&wire).map_err(LinkError::Write)?;
        trace!(link = %self.desc, bytes = wire.len(), "sent frame");
        Ok(())
    }

    fn run_receive_loop(&self, shutdown: &ShutdownFlag) -> Result<(), LinkError> {
        let mut reader = &self.stream;
        loop {
            if shutdown.is_triggered() {
                debug!(link = %self.desc, "receive loop shutting down");
                return Ok(());
            }
            let frame = read_frame(&mut reader)?;
            trace!(link = %self.desc, bytes = frame.wire_len(), "received frame");
            self.ingress.deliver(frame)?;
        }
    }
}

/// Read exactly one frame off a stream, retrying short reads.
///
/// A zero-length read (peer closed) surfaces as [`LinkError::PeerClosed`].
/// A header claiming more than [`MAX_PAYLOAD`] bytes is a contract violation
/// by the peer and fails the link rather than over-reading.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, LinkError> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).map_err(map_read_err)?;

    let (kind, payload_len) = frame::decode_header(&header);
    let payload_len = payload_len as usize;
    if payload_len > MAX_PAYLOAD {
        return Err(LinkError::FrameTooLarge(payload_len));
    }

    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).map_err(map_read_err)?;

    Ok(Frame::new(kind, payload))
}

fn map_read_err(e: io::Error) -> LinkError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        LinkError::PeerClosed
    } else {
        LinkError::Read(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameKind;

    /// Yields at most one byte per read call, simulating maximal stream
    /// fragmentation.
    struct TrickleReader<'a> {
        data: &'a [u8],
        pos: usize,
    }

    impl Read for TrickleReader<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.data.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn test_reframes_across_one_byte_reads() {
        // A large payload delivered one byte at a time must still come out
        // as a single frame.
        let payload: Vec<u8> = (0..MAX_PAYLOAD).map(|i| (i % 251) as u8).collect();
        let wire = Frame::data(payload.clone()).encode();
        let mut reader = TrickleReader {
            data: &wire,
            pos: 0,
        };

        let frame = read_frame(&mut reader).unwrap();
        assert_eq!(frame.kind, FrameKind::DATA);
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let mut wire = Frame::data(vec![1, 2, 3]).encode();
        wire.extend(Frame::new(FrameKind::CONTROL, vec![9]).encode());
        let mut reader = io::Cursor::new(wire);

        let first = read_frame(&mut reader).unwrap();
        let second = read_frame(&mut reader).unwrap();
        assert_eq!(first.payload, vec![1, 2, 3]);
        assert_eq!(second.kind, FrameKind::CONTROL);
        assert_eq!(second.payload, vec![9]);
    }

    #[test]
    fn test_peer_close_mid_header() {
        let mut reader = io::Cursor::new(vec![0x00u8]);
        assert!(matches!(read_frame(&mut reader), Err(LinkError::PeerClosed)));
    }

    #[test]
    fn test_peer_close_mid_payload() {
        let mut wire = Frame::data(vec![0u8; 100]).encode();
        wire.truncate(50);
        let mut reader = io::Cursor::new(wire);
        assert!(matches!(read_frame(&mut reader), Err(LinkError::PeerClosed)));
    }

    #[test]
    fn test_rejects_oversized_claim() {
        // Header claiming 0xFFFF payload bytes: bound by the frame maximum
        // instead of trusting the peer.
        let mut reader = io::Cursor::new(vec![0xFFu8, 0xFF, b'0']);
        assert!(matches!(
            read_frame(&mut reader),
            Err(LinkError::FrameTooLarge(0xFFFF))
        ));
    }

    #[test]
    fn test_send_and_receive_over_loopback() {
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let (tun, _handle) = crate::tun::MemoryTun::pair("mem0");
        let (_collector, ingress) =
            crate::collector::IngressCollector::new(std::sync::Arc::new(tun));

        let desc = LinkDescriptor::new(
            crate::config::Transport::Tcp,
            addr.ip().to_string(),
            addr.port(),
        );
        let link = TcpLink::connect(desc, ingress).unwrap();
        assert!(link.is_ready());
        assert_eq!(link.describe(), format!("TCP:{}:{}", addr.ip(), addr.port()));

        let (mut accepted, _) = listener.accept().unwrap();
        link.send(&Frame::data(vec![42; 10])).unwrap();

        let frame = read_frame(&mut accepted).unwrap();
        assert_eq!(frame.payload, vec![42; 10]);
    }
}
