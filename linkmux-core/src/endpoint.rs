//! Endpoint orchestration: wire links, scheduler, and collector together.
//!
//! A [`Client`] dials every configured link up front and starts moving
//! packets immediately. A [`Server`] binds its UDP links and TCP accept
//! sockets, then multiplexes readiness over the accept sockets on a
//! dedicated thread, attaching each accepted connection to the running
//! rotation.
//!
//! Everything runs on plain OS threads: one receive thread per link, one
//! thread draining the ingress funnel onto the interface, one pump thread
//! reading the interface and dispatching, and (server only) one accept
//! thread. Threads observe the shared [`ShutdownFlag`] between blocking
//! operations, so teardown completes once each thread's current syscall
//! returns.

use std::io;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::collector::{IngressCollector, IngressSender};
use crate::config::{LinkDescriptor, Transport};
use crate::link::{Link, LinkError, TcpLink, UdpClientLink, UdpServerLink};
use crate::listener::LinkListener;
use crate::scheduler::EgressScheduler;
use crate::shutdown::ShutdownFlag;
use crate::tun::TunInterface;

/// How long the accept loop waits in poll before re-checking shutdown.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("no links configured")]
    NoLinks,

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("readiness poll setup failed: {0}")]
    Poll(#[source] io::Error),

    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Running endpoint: the spawned threads plus the flag that stops them.
pub struct EndpointHandle {
    threads: Vec<JoinHandle<()>>,
    shutdown: ShutdownFlag,
}

impl EndpointHandle {
    /// Ask every thread to stop at its next shutdown check.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait for all threads to finish.
    ///
    /// Threads blocked in a read only notice shutdown once that read
    /// returns, so join after shutdown may wait for in-flight traffic.
    pub fn join(self) {
        for handle in self.threads {
            if let Err(panic) = handle.join() {
                error!(?panic, "endpoint thread panicked");
            }
        }
    }
}

fn spawn_named<F>(name: &str, f: F) -> Result<JoinHandle<()>, EndpointError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| EndpointError::Spawn {
            name: name.to_string(),
            source,
        })
}

fn spawn_receive_thread(
    link: Arc<dyn Link>,
    shutdown: ShutdownFlag,
) -> Result<JoinHandle<()>, EndpointError> {
    let name = format!("recv-{}", link.describe());
    spawn_named(&name, move || match link.run_receive_loop(&shutdown) {
        Ok(()) => debug!(link = %link.describe(), "receive loop finished"),
        Err(e) => warn!(link = %link.describe(), error = %e, "receive loop died"),
    })
}

fn spawn_collector_thread(
    collector: IngressCollector,
    shutdown: ShutdownFlag,
) -> Result<JoinHandle<()>, EndpointError> {
    spawn_named("ingress-writer", move || collector.run(&shutdown))
}

fn spawn_pump_thread(
    scheduler: Arc<EgressScheduler>,
    tun: Arc<dyn TunInterface>,
    shutdown: ShutdownFlag,
) -> Result<JoinHandle<()>, EndpointError> {
    spawn_named("egress-pump", move || {
        if let Err(e) = scheduler.run_pump(tun, &shutdown) {
            error!(error = %e, "interface read failed, stopping endpoint");
            shutdown.trigger();
        }
    })
}

/// Dialing endpoint: connects every configured link before starting.
pub struct Client {
    tun: Arc<dyn TunInterface>,
    scheduler: Arc<EgressScheduler>,
    collector: IngressCollector,
    links: Vec<Arc<dyn Link>>,
}

impl Client {
    /// Connect all links. Any single connect failure aborts construction.
    pub fn new(
        descriptors: &[LinkDescriptor],
        tun: Arc<dyn TunInterface>,
    ) -> Result<Self, EndpointError> {
        if descriptors.is_empty() {
            return Err(EndpointError::NoLinks);
        }

        let scheduler = Arc::new(EgressScheduler::new());
        let (collector, ingress) = IngressCollector::new(Arc::clone(&tun));

        let mut links: Vec<Arc<dyn Link>> = Vec::with_capacity(descriptors.len());
        for desc in descriptors {
            let link: Arc<dyn Link> = match desc.transport {
                Transport::Tcp => Arc::new(TcpLink::connect(desc.clone(), ingress.clone())?),
                Transport::Udp => Arc::new(UdpClientLink::connect(desc.clone(), ingress.clone())?),
            };
            scheduler.attach(Arc::clone(&link));
            links.push(link);
        }
        info!(links = links.len(), tun = tun.name(), "client ready");

        Ok(Self {
            tun,
            scheduler,
            collector,
            links,
        })
    }

    /// Spawn the receive, writer, and pump threads.
    pub fn run(self) -> Result<EndpointHandle, EndpointError> {
        let shutdown = ShutdownFlag::new();
        let mut threads = Vec::new();

        for link in self.links {
            threads.push(spawn_receive_thread(link, shutdown.clone())?);
        }
        threads.push(spawn_collector_thread(self.collector, shutdown.clone())?);
        threads.push(spawn_pump_thread(
            self.scheduler,
            self.tun,
            shutdown.clone(),
        )?);

        Ok(EndpointHandle { threads, shutdown })
    }
}

/// Listening endpoint: binds UDP links and TCP accept sockets.
pub struct Server {
    tun: Arc<dyn TunInterface>,
    scheduler: Arc<EgressScheduler>,
    collector: IngressCollector,
    ingress: IngressSender,
    udp_links: Vec<Arc<UdpServerLink>>,
    listeners: Vec<LinkListener>,
}

impl Server {
    /// Bind every configured descriptor: UDP sockets join the rotation at
    /// once (unready until first contact), TCP descriptors become accept
    /// sockets serviced by the accept thread.
    pub fn new(
        descriptors: &[LinkDescriptor],
        tun: Arc<dyn TunInterface>,
    ) -> Result<Self, EndpointError> {
        if descriptors.is_empty() {
            return Err(EndpointError::NoLinks);
        }

        let scheduler = Arc::new(EgressScheduler::new());
        let (collector, ingress) = IngressCollector::new(Arc::clone(&tun));

        let mut udp_links = Vec::new();
        let mut listeners = Vec::new();
        for desc in descriptors {
            match desc.transport {
                Transport::Udp => {
                    let link = Arc::new(UdpServerLink::bind(desc.clone(), ingress.clone())?);
                    scheduler.attach(Arc::clone(&link) as Arc<dyn Link>);
                    udp_links.push(link);
                }
                Transport::Tcp => {
                    listeners.push(LinkListener::bind(desc.clone(), ingress.clone())?);
                }
            }
        }
        info!(
            udp = udp_links.len(),
            tcp = listeners.len(),
            tun = tun.name(),
            "server ready"
        );

        Ok(Self {
            tun,
            scheduler,
            collector,
            ingress,
            udp_links,
            listeners,
        })
    }

    /// Bound addresses of the TCP accept sockets, in configuration order.
    pub fn listener_addrs(&self) -> Result<Vec<SocketAddr>, LinkError> {
        self.listeners.iter().map(|l| l.local_addr()).collect()
    }

    /// Bound addresses of the UDP links, in configuration order.
    pub fn udp_addrs(&self) -> Result<Vec<SocketAddr>, LinkError> {
        self.udp_links.iter().map(|l| l.local_addr()).collect()
    }

    /// Spawn the accept, receive, writer, and pump threads.
    pub fn run(self) -> Result<EndpointHandle, EndpointError> {
        let shutdown = ShutdownFlag::new();
        let mut threads = Vec::new();

        for link in self.udp_links {
            threads.push(spawn_receive_thread(link as Arc<dyn Link>, shutdown.clone())?);
        }

        if !self.listeners.is_empty() {
            threads.push(spawn_accept_thread(
                self.listeners,
                Arc::clone(&self.scheduler),
                shutdown.clone(),
            )?);
        }
        drop(self.ingress); // accepted links hold their own clones

        threads.push(spawn_collector_thread(self.collector, shutdown.clone())?);
        threads.push(spawn_pump_thread(
            self.scheduler,
            self.tun,
            shutdown.clone(),
        )?);

        Ok(EndpointHandle { threads, shutdown })
    }
}

/// Multiplex readiness over all accept sockets on one thread.
///
/// Each accepted connection is attached to the rotation and given its own
/// receive thread. Poll wakes on a short timeout so the flag is observed
/// even with no inbound connections.
fn spawn_accept_thread(
    listeners: Vec<LinkListener>,
    scheduler: Arc<EgressScheduler>,
    shutdown: ShutdownFlag,
) -> Result<JoinHandle<()>, EndpointError> {
    let mut poll = Poll::new().map_err(EndpointError::Poll)?;
    for (i, listener) in listeners.iter().enumerate() {
        poll.registry()
            .register(
                &mut SourceFd(&listener.as_raw_fd()),
                Token(i),
                Interest::READABLE,
            )
            .map_err(EndpointError::Poll)?;
    }

    spawn_named("accept-loop", move || {
        let mut events = Events::with_capacity(listeners.len().max(1));
        loop {
            if shutdown.is_triggered() {
                debug!("accept loop shutting down");
                return;
            }
            if let Err(e) = poll.poll(&mut events, Some(ACCEPT_POLL_INTERVAL)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %e, "accept poll failed, stopping endpoint");
                shutdown.trigger();
                return;
            }

            for event in events.iter() {
                let Token(i) = event.token();
                // Edge-triggered wakeup: drain every queued connection.
                loop {
                    match listeners[i].accept_one() {
                        Ok(Some(link)) => {
                            let link: Arc<dyn Link> = Arc::new(link);
                            scheduler.attach(Arc::clone(&link));
                            match spawn_receive_thread(link, shutdown.clone()) {
                                Ok(_detached) => {}
                                Err(e) => error!(error = %e, "failed to start receive thread"),
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(listener = %listeners[i].descriptor(), error = %e, "accept failed");
                            break;
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::link::read_frame;
    use crate::tun::MemoryTun;
    use std::net::{TcpStream, UdpSocket};

    fn descriptors(specs: &[(Transport, u16)]) -> Vec<LinkDescriptor> {
        specs
            .iter()
            .map(|(t, p)| LinkDescriptor::new(*t, "127.0.0.1", *p))
            .collect()
    }

    #[test]
    fn test_client_requires_links() {
        let (tun, _handle) = MemoryTun::pair("mem0");
        assert!(matches!(
            Client::new(&[], Arc::new(tun)),
            Err(EndpointError::NoLinks)
        ));
    }

    #[test]
    fn test_client_connect_failure_aborts() {
        let (tun, _handle) = MemoryTun::pair("mem0");
        // Nothing listens on this port.
        let descs = descriptors(&[(Transport::Tcp, 1)]);
        assert!(matches!(
            Client::new(&descs, Arc::new(tun)),
            Err(EndpointError::Link(_))
        ));
    }

    #[test]
    fn test_server_binds_and_reports_addresses() {
        let (tun, _handle) = MemoryTun::pair("mem0");
        let descs = descriptors(&[(Transport::Tcp, 0), (Transport::Udp, 0)]);
        let server = Server::new(&descs, Arc::new(tun)).unwrap();

        let tcp = server.listener_addrs().unwrap();
        let udp = server.udp_addrs().unwrap();
        assert_eq!(tcp.len(), 1);
        assert_eq!(udp.len(), 1);
        assert_ne!(tcp[0].port(), 0);
        assert_ne!(udp[0].port(), 0);
    }

    #[test]
    fn test_server_accepts_and_forwards_outbound() {
        let (tun, handle) = MemoryTun::pair("mem0");
        let descs = descriptors(&[(Transport::Tcp, 0)]);
        let server = Server::new(&descs, Arc::new(tun)).unwrap();
        let addr = server.listener_addrs().unwrap()[0];

        let endpoint = server.run().unwrap();

        // Dial in as a raw peer; the accepted connection joins the rotation
        // and outbound packets appear on it as frames.
        let stream = TcpStream::connect(addr).unwrap();
        std::thread::sleep(Duration::from_millis(300));

        handle.inject(vec![0x45; 40]);
        let mut reader = &stream;
        let frame = read_frame(&mut reader).unwrap();
        assert_eq!(frame.payload, vec![0x45; 40]);

        endpoint.shutdown();
        drop(stream);
        drop(handle); // unblocks the pump read
        endpoint.join();
    }

    #[test]
    fn test_server_udp_roundtrip() {
        let (tun, handle) = MemoryTun::pair("mem0");
        let descs = descriptors(&[(Transport::Udp, 0)]);
        let server = Server::new(&descs, Arc::new(tun)).unwrap();
        let addr = server.udp_addrs().unwrap()[0];

        let endpoint = server.run().unwrap();

        // First contact teaches the server our address.
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.send_to(&Frame::data(vec![1, 2, 3]).encode(), addr)
            .unwrap();
        assert_eq!(
            handle.collect(Duration::from_secs(2)),
            Some(vec![1, 2, 3])
        );

        // Outbound traffic now flows back to us.
        handle.inject(vec![9, 9, 9]);
        let mut buf = [0u8; 2048];
        let (n, _) = peer.recv_from(&mut buf).unwrap();
        let frame = read_frame(&mut io::Cursor::new(&buf[..n])).unwrap();
        assert_eq!(frame.payload, vec![9, 9, 9]);

        endpoint.shutdown();
        drop(handle);
        // The UDP receive thread stays blocked in recv_from until shutdown
        // traffic arrives; nudge it.
        peer.send_to(&Frame::data(vec![0]).encode(), addr).ok();
        endpoint.join();
    }

    #[test]
    fn test_client_end_to_end_over_tcp() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let (tun, handle) = MemoryTun::pair("mem0");
        let descs = vec![LinkDescriptor::new(
            Transport::Tcp,
            "127.0.0.1",
            addr.port(),
        )];
        let client = Client::new(&descs, Arc::new(tun)).unwrap();
        let endpoint = client.run().unwrap();

        let (accepted, _) = listener.accept().unwrap();

        // Outbound: interface packet arrives framed on the wire.
        handle.inject(vec![7; 12]);
        let mut reader = &accepted;
        let frame = read_frame(&mut reader).unwrap();
        assert_eq!(frame.payload, vec![7; 12]);

        // Inbound: a framed payload written by the peer lands on the
        // interface.
        use std::io::Write;
        (&accepted)
            .write_all(&Frame::data(vec![8; 20]).encode())
            .unwrap();
        assert_eq!(
            handle.collect(Duration::from_secs(2)),
            Some(vec![8; 20])
        );

        endpoint.shutdown();
        drop(accepted); // receive loop sees the close
        drop(handle); // pump read fails
        endpoint.join();
    }
}
