//! UDP transport endpoints.
//!
//! A [`UdpEndpoint`] is one bound UDP socket plus the immutable
//! [`EndpointDescriptor`] it was built from. Endpoints are created
//! through the [`EndpointFactory`] seam so activation can fail fast when
//! the transport capability is absent, and so tests can substitute their
//! own.
//!
//! The one non-obvious capability is socket sharing: an endpoint exports
//! its bound socket with [`UdpEndpoint::socket`] and another endpoint can
//! be constructed importing that handle. The importer is marked as not
//! owning the socket — RTCP traditionally sends and receives on one port
//! through a single socket, and only the creating endpoint may be
//! considered responsible for it.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::Result;
use crate::media::caps::StreamCaps;

/// Which protocol leg of the session an endpoint serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportRole {
    Rtp,
    Rtcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

/// Everything needed to construct one endpoint. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub role: TransportRole,
    pub direction: Direction,
    pub host: String,
    pub port: u16,
    /// Unicast TTL applied to the socket.
    pub ttl: u8,
    /// Multicast TTL/hop limit, applied when `is_multicast`.
    pub ttl_mc: u8,
    pub is_multicast: bool,
    /// Whether a send endpoint with its own socket joins the multicast
    /// group itself. Disabled for the RTCP send endpoint, which inherits
    /// an already-joined socket.
    pub auto_multicast: bool,
}

/// A bound UDP socket serving one role/direction of the session.
pub struct UdpEndpoint {
    desc: EndpointDescriptor,
    socket: Arc<UdpSocket>,
    owns_socket: bool,
    dest: Option<SocketAddr>,
    running: AtomicBool,
    expected_caps: Mutex<Option<StreamCaps>>,
}

/// Creates transport endpoints for the session builder.
pub trait EndpointFactory: Send + Sync {
    fn create(
        &self,
        desc: EndpointDescriptor,
        shared: Option<Arc<UdpSocket>>,
    ) -> Result<UdpEndpoint>;
}

/// Default factory backed by the host's UDP stack.
pub struct UdpEndpointFactory;

impl EndpointFactory for UdpEndpointFactory {
    fn create(
        &self,
        desc: EndpointDescriptor,
        shared: Option<Arc<UdpSocket>>,
    ) -> Result<UdpEndpoint> {
        UdpEndpoint::create(desc, shared)
    }
}

impl UdpEndpoint {
    /// Build an endpoint from its descriptor.
    ///
    /// Receive endpoints bind `host:port` (the wildcard address plus a
    /// group join when multicast). Send endpoints either import the
    /// `shared` socket or bind an ephemeral local port, then record the
    /// destination address.
    pub fn create(desc: EndpointDescriptor, shared: Option<Arc<UdpSocket>>) -> Result<Self> {
        let target = resolve_host(&desc.host, desc.port)?;

        let endpoint = match desc.direction {
            Direction::Receive => {
                let socket = bind_receive(&desc, target)?;
                Self {
                    desc,
                    socket: Arc::new(socket),
                    owns_socket: true,
                    dest: None,
                    running: AtomicBool::new(false),
                    expected_caps: Mutex::new(None),
                }
            }
            Direction::Send => match shared {
                Some(socket) => Self {
                    desc,
                    socket,
                    owns_socket: false,
                    dest: Some(target),
                    running: AtomicBool::new(false),
                    expected_caps: Mutex::new(None),
                },
                None => {
                    let socket = bind_send(&desc, target)?;
                    Self {
                        desc,
                        socket: Arc::new(socket),
                        owns_socket: true,
                        dest: Some(target),
                        running: AtomicBool::new(false),
                        expected_caps: Mutex::new(None),
                    }
                }
            },
        };

        tracing::debug!(
            role = ?endpoint.desc.role,
            direction = ?endpoint.desc.direction,
            host = %endpoint.desc.host,
            port = endpoint.desc.port,
            owns_socket = endpoint.owns_socket,
            "endpoint created"
        );
        Ok(endpoint)
    }

    pub fn descriptor(&self) -> &EndpointDescriptor {
        &self.desc
    }

    /// Export the underlying socket handle for sharing.
    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }

    /// Whether this endpoint created (and is responsible for) its socket.
    pub fn owns_socket(&self) -> bool {
        self.owns_socket
    }

    /// Local port the socket is bound to.
    pub fn bound_port(&self) -> Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Destination address, for send endpoints.
    pub fn destination(&self) -> Option<SocketAddr> {
        self.dest
    }

    /// Send a datagram to the configured destination.
    pub fn send(&self, payload: &[u8]) -> Result<usize> {
        let dest = self.dest.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "endpoint has no destination")
        })?;
        Ok(self.socket.send_to(payload, dest)?)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Capability set a receive endpoint expects on its stream.
    pub fn expected_caps(&self) -> Option<StreamCaps> {
        self.expected_caps.lock().clone()
    }

    pub fn set_expected_caps(&self, caps: Option<StreamCaps>) {
        tracing::debug!(
            role = ?self.desc.role,
            caps = caps.as_ref().map(|c| c.to_string()).unwrap_or_default(),
            "expected caps updated"
        );
        *self.expected_caps.lock() = caps;
    }
}

/// Resolve a host literal or DNS name to one socket address.
fn resolve_host(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}")))?;
    Ok(addr)
}

fn bind_receive(desc: &EndpointDescriptor, target: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(target), Type::DGRAM, Some(Protocol::UDP))?;
    // The port may already be held by another session or a just-torn-down
    // one.
    socket.set_reuse_address(true)?;

    let bind_addr: SocketAddr = if desc.is_multicast {
        match target.ip() {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, desc.port).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, desc.port).into(),
        }
    } else {
        target
    };
    socket.bind(&bind_addr.into())?;

    apply_ttl(&socket, desc, target.ip())?;
    if desc.is_multicast {
        match target.ip() {
            IpAddr::V4(group) => socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?,
            IpAddr::V6(group) => socket.join_multicast_v6(&group, 0)?,
        }
        tracing::debug!(group = %target.ip(), port = desc.port, "joined multicast group");
    }

    Ok(socket.into())
}

fn bind_send(desc: &EndpointDescriptor, target: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(target), Type::DGRAM, Some(Protocol::UDP))?;

    // Ephemeral local port; the well-known port lives on the destination.
    let local: SocketAddr = match target.ip() {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    socket.bind(&local.into())?;

    apply_ttl(&socket, desc, target.ip())?;
    if desc.is_multicast && desc.auto_multicast {
        match target.ip() {
            IpAddr::V4(group) => socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?,
            IpAddr::V6(group) => socket.join_multicast_v6(&group, 0)?,
        }
        tracing::debug!(group = %target.ip(), "send endpoint joined multicast group");
    }

    Ok(socket.into())
}

/// TTL and hop-limit options per address family.
fn apply_ttl(socket: &Socket, desc: &EndpointDescriptor, ip: IpAddr) -> io::Result<()> {
    match ip {
        IpAddr::V4(_) => {
            socket.set_ttl(desc.ttl as u32)?;
            if desc.is_multicast {
                socket.set_multicast_ttl_v4(desc.ttl_mc as u32)?;
            }
        }
        IpAddr::V6(_) => {
            socket.set_unicast_hops_v6(desc.ttl as u32)?;
            if desc.is_multicast {
                socket.set_multicast_hops_v6(desc.ttl_mc as u32)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receive_desc(host: &str, port: u16) -> EndpointDescriptor {
        EndpointDescriptor {
            role: TransportRole::Rtp,
            direction: Direction::Receive,
            host: host.to_string(),
            port,
            ttl: 64,
            ttl_mc: 1,
            is_multicast: false,
            auto_multicast: true,
        }
    }

    fn send_desc(host: &str, port: u16) -> EndpointDescriptor {
        EndpointDescriptor {
            direction: Direction::Send,
            ..receive_desc(host, port)
        }
    }

    #[test]
    fn receive_endpoint_binds_and_owns() {
        let ep = UdpEndpoint::create(receive_desc("127.0.0.1", 0), None).unwrap();
        assert!(ep.owns_socket());
        assert_ne!(ep.bound_port().unwrap(), 0);
        assert!(ep.destination().is_none());
        assert!(!ep.is_running());
    }

    #[test]
    fn send_endpoint_records_destination() {
        let ep = UdpEndpoint::create(send_desc("127.0.0.1", 5004), None).unwrap();
        assert_eq!(
            ep.destination().unwrap(),
            "127.0.0.1:5004".parse().unwrap()
        );
        assert!(ep.owns_socket());
    }

    #[test]
    fn imported_socket_is_not_owned() {
        let recv = UdpEndpoint::create(receive_desc("127.0.0.1", 0), None).unwrap();
        let port = recv.bound_port().unwrap();
        let send = UdpEndpoint::create(send_desc("127.0.0.1", port), Some(recv.socket())).unwrap();

        assert!(!send.owns_socket());
        assert!(Arc::ptr_eq(&recv.socket(), &send.socket()));
        assert_eq!(send.bound_port().unwrap(), port);
    }

    #[test]
    fn send_reaches_receive_on_loopback() {
        let recv = UdpEndpoint::create(receive_desc("127.0.0.1", 0), None).unwrap();
        let port = recv.bound_port().unwrap();
        let send = UdpEndpoint::create(send_desc("127.0.0.1", port), None).unwrap();

        assert_eq!(send.send(b"rtcp").unwrap(), 4);
        let mut buf = [0u8; 16];
        let (n, _) = recv.socket().recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"rtcp");
    }

    #[test]
    fn send_without_destination_fails() {
        let ep = UdpEndpoint::create(receive_desc("127.0.0.1", 0), None).unwrap();
        assert!(ep.send(b"x").is_err());
    }

    #[test]
    fn expected_caps_slot() {
        let ep = UdpEndpoint::create(receive_desc("127.0.0.1", 0), None).unwrap();
        assert!(ep.expected_caps().is_none());
        ep.set_expected_caps(Some(StreamCaps::rtp()));
        assert!(ep.expected_caps().is_some());
    }
}
