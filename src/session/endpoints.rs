//! Endpoint graph construction.
//!
//! A session drives three transport endpoints, chosen by role:
//!
//! ```text
//! Sender:    RTP send ──► host:port        Receiver:  RTP recv ◄── host:port
//!            RTCP recv ◄─ *:port+1                    RTCP recv ◄─ host:port+1
//!            RTCP send ──► host:port+1                RTCP send ──► host:port+1
//! ```
//!
//! Two contracts hold regardless of role:
//!
//! - **Port parity** (RFC 3550 §11): RTCP always lives on `port + 1`.
//! - **Socket reuse**: RTCP sends and receives on a single socket. The
//!   receive endpoint is built *first* and owns the bound socket; the
//!   send endpoint imports that exact handle. It never opens its own,
//!   and its `auto_multicast` is off — the owner already joined the
//!   group, and a second join or rebind on the same port is precisely
//!   the failure mode this ordering exists to rule out.
//!
//! Construction is all-or-nothing: any failure drops every endpoint
//! built so far before the error propagates, so an aborted activation
//! leaves no partially linked graph behind.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, sync_channel};

use crate::error::{Result, SessionError};
use crate::mux::{EVENT_QUEUE_DEPTH, MuxEvent, SessionMux};
use crate::transport::{
    self, Direction, EndpointDescriptor, EndpointFactory, TransportRole, UdpEndpoint,
};
use crate::uri::SessionUri;

use super::{SessionConfig, SessionRole, receive_caps};

/// The three endpoints backing an activated session.
///
/// Handles are shared; cloning the set clones the `Arc`s, not sockets.
#[derive(Clone)]
pub struct EndpointSet {
    /// RTP data endpoint — send for a sender, receive for a receiver.
    pub rtp: Arc<UdpEndpoint>,
    /// RTCP receive endpoint; owns the shared control socket.
    pub rtcp_recv: Arc<UdpEndpoint>,
    /// RTCP send endpoint; borrows the control socket from `rtcp_recv`.
    pub rtcp_send: Arc<UdpEndpoint>,
}

impl EndpointSet {
    /// Propagate the session's run state to every endpoint.
    pub(crate) fn set_running(&self, running: bool) {
        for endpoint in [&self.rtp, &self.rtcp_recv, &self.rtcp_send] {
            endpoint.set_running(running);
        }
    }
}

/// Descriptors for the three endpoints, derived before anything binds.
pub(crate) struct EndpointPlan {
    pub rtp: EndpointDescriptor,
    pub rtcp_recv: EndpointDescriptor,
    pub rtcp_send: EndpointDescriptor,
}

/// Derive the endpoint descriptors for a role. Pure; no sockets yet.
pub(crate) fn plan(role: SessionRole, uri: &SessionUri, config: &SessionConfig) -> EndpointPlan {
    let host = uri.host().to_string();
    let port = uri.port();
    let rtcp_port = port + 1;
    let is_multicast = transport::is_multicast_host(&host);

    // A sender's RTCP receive leg listens locally for reports; binding
    // the remote unicast address would fail. Multicast groups bind on
    // every member, so those keep the group address.
    let rtcp_recv_host = match role {
        SessionRole::Receiver => host.clone(),
        SessionRole::Sender if is_multicast => host.clone(),
        SessionRole::Sender => local_wildcard(&host),
    };

    let base = EndpointDescriptor {
        role: TransportRole::Rtp,
        direction: Direction::Receive,
        host: host.clone(),
        port,
        ttl: config.ttl,
        ttl_mc: config.ttl_mc,
        is_multicast,
        auto_multicast: true,
    };

    EndpointPlan {
        rtp: EndpointDescriptor {
            direction: match role {
                SessionRole::Sender => Direction::Send,
                SessionRole::Receiver => Direction::Receive,
            },
            ..base.clone()
        },
        rtcp_recv: EndpointDescriptor {
            role: TransportRole::Rtcp,
            direction: Direction::Receive,
            host: rtcp_recv_host,
            port: rtcp_port,
            ..base.clone()
        },
        rtcp_send: EndpointDescriptor {
            role: TransportRole::Rtcp,
            direction: Direction::Send,
            port: rtcp_port,
            // Inherits the already-joined shared socket.
            auto_multicast: false,
            ..base
        },
    }
}

/// Build and link the endpoint graph.
///
/// Returns the endpoint set plus the receiving half of the discovery
/// event channel. On any error, endpoints created so far are dropped and
/// nothing of the graph remains.
pub(crate) fn build(
    role: SessionRole,
    uri: &SessionUri,
    config: &SessionConfig,
    mux: &Arc<dyn SessionMux>,
    factory: &Arc<dyn EndpointFactory>,
) -> Result<(EndpointSet, Receiver<MuxEvent>)> {
    let plan = plan(role, uri, config);
    let (rtp_pad, rtcp_send_pad, rtcp_recv_pad) = pad_names(role);

    let rtp = Arc::new(factory.create(plan.rtp, None)?);

    // Receive side first: it creates and owns the shared RTCP socket.
    let rtcp_recv = Arc::new(factory.create(plan.rtcp_recv, None)?);
    let rtcp_send = Arc::new(factory.create(plan.rtcp_send, Some(rtcp_recv.socket()))?);

    for (pad, endpoint) in [
        (rtp_pad, &rtp),
        (rtcp_send_pad, &rtcp_send),
        (rtcp_recv_pad, &rtcp_recv),
    ] {
        if !mux.link_endpoint(pad, endpoint) {
            return Err(SessionError::LinkFailure {
                pad: pad.to_string(),
            });
        }
    }

    if role == SessionRole::Receiver {
        rtp.set_expected_caps(Some(receive_caps(config)));
    }

    let (tx, rx) = sync_channel(EVENT_QUEUE_DEPTH);
    mux.connect_events(tx);

    tracing::info!(
        ?role,
        host = %uri.host(),
        rtp_port = uri.port(),
        rtcp_port = uri.port() + 1,
        multicast = transport::is_multicast_host(uri.host()),
        "endpoint graph built"
    );

    Ok((
        EndpointSet {
            rtp,
            rtcp_recv,
            rtcp_send,
        },
        rx,
    ))
}

/// Multiplexer pad names per role: (RTP, RTCP send, RTCP receive).
fn pad_names(role: SessionRole) -> (&'static str, &'static str, &'static str) {
    match role {
        SessionRole::Sender => ("send_rtp_src_0", "send_rtcp_src_0", "recv_rtcp_sink_0"),
        SessionRole::Receiver => ("recv_rtp_sink_0", "send_rtcp_src_0", "recv_rtcp_sink_0"),
    }
}

fn local_wildcard(host: &str) -> String {
    if host.parse::<std::net::Ipv6Addr>().is_ok() {
        "::".to_string()
    } else {
        "0.0.0.0".to_string()
    }
}
