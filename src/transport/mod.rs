//! Network transport endpoints for RTP media and RTCP control.
//!
//! A session drives a pair of UDP ports with a split model per RFC 3550:
//!
//! - **RTP** (`port`): carries media data in one direction, chosen by the
//!   session role.
//! - **RTCP** (`port + 1`): carries control traffic in *both* directions
//!   over a single bound socket, shared between a receive endpoint (the
//!   socket owner) and a send endpoint (a borrowed handle).
//!
//! Whether endpoints bind a local port or join a multicast group is
//! decided by classifying the URI host with [`is_multicast_host`].

pub mod udp;

pub use udp::{
    Direction, EndpointDescriptor, EndpointFactory, TransportRole, UdpEndpoint, UdpEndpointFactory,
};

use std::net::{Ipv4Addr, Ipv6Addr};

/// Classify a URI host as multicast or unicast.
///
/// Tries an IPv6 parse first, then IPv4, and checks the standard reserved
/// ranges (IPv4 224.0.0.0/4, IPv6 ff00::/8). A host that is not an
/// address literal — a DNS name — classifies as unicast without being
/// resolved; resolving here could return a different address family or a
/// different answer than the one the endpoints later bind to.
pub fn is_multicast_host(host: &str) -> bool {
    if let Ok(addr) = host.parse::<Ipv6Addr>() {
        return addr.is_multicast();
    }
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return addr.is_multicast();
    }
    false
}
