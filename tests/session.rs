//! Integration tests: URI configuration, staged activation, the shared
//! RTCP socket invariant, stream discovery, and failure atomicity.
//!
//! Activation tests bind real UDP sockets on loopback; each test uses
//! its own fixed even port so they can run in parallel.

use std::sync::Arc;
use std::sync::mpsc::SyncSender;

use rtpsession::media::caps::StreamCaps;
use rtpsession::mux::{MuxEvent, MuxPad, PadDirection};
use rtpsession::session::SessionCapabilities;
use rtpsession::transport::{UdpEndpoint, UdpEndpointFactory};
use rtpsession::{PassthroughMux, RtpSession, SessionError, SessionMux, SessionRole, SessionState};

/// Multiplexer that refuses every link, for atomicity tests.
struct FailingMux;

impl SessionMux for FailingMux {
    fn connect_events(&self, _tx: SyncSender<MuxEvent>) {}

    fn link_endpoint(&self, _pad: &str, _endpoint: &UdpEndpoint) -> bool {
        false
    }

    fn request_send_pad(&self, _index: u32) -> Option<String> {
        None
    }

    fn release_send_pad(&self, _name: &str) {}
}

fn session_with_mux(role: SessionRole, mux: Arc<dyn SessionMux>) -> RtpSession {
    RtpSession::with_capabilities(
        role,
        SessionCapabilities {
            mux: Some(mux),
            endpoints: Some(Arc::new(UdpEndpointFactory)),
        },
    )
}

#[test]
fn uri_to_properties_receiver() {
    let session = RtpSession::new(SessionRole::Receiver);

    // Sets properties to non-default values (make sure this stays in sync)
    session
        .set_uri("rtp://1.230.1.2?latency=300&ttl=8&ttl-mc=9")
        .unwrap();

    assert_eq!(session.latency_ms(), 300);
    assert_eq!(session.ttl(), 8);
    assert_eq!(session.ttl_mc(), 9);
}

#[test]
fn uri_to_properties_sender() {
    let session = RtpSession::new(SessionRole::Sender);

    session.set_uri("rtp://1.230.1.2?ttl=8&ttl-mc=9").unwrap();

    assert_eq!(session.ttl(), 8);
    assert_eq!(session.ttl_mc(), 9);
}

#[test]
fn overlay_is_lenient_about_malformed_values() {
    let session = RtpSession::new(SessionRole::Receiver);
    session
        .set_uri("rtp://1.230.1.2?ttl=garbage&latency=0x64&unknown-key=5")
        .unwrap();
    assert_eq!(session.ttl(), 0, "unparsable integer defaults to 0");
    assert_eq!(session.latency_ms(), 100, "hex values are accepted");
}

#[test]
fn receiver_activation_shares_the_rtcp_socket() {
    let session = RtpSession::new(SessionRole::Receiver);
    session.set_uri("rtp://127.0.0.1:46000").unwrap();

    session.activate().unwrap();
    assert_eq!(session.state(), SessionState::Active);

    let eps = session.endpoints().unwrap();
    assert_eq!(eps.rtp.bound_port().unwrap(), 46000);
    assert_eq!(eps.rtcp_recv.bound_port().unwrap(), 46001);
    assert_eq!(
        eps.rtcp_send.bound_port().unwrap(),
        eps.rtcp_recv.bound_port().unwrap()
    );
    assert!(
        Arc::ptr_eq(&eps.rtcp_recv.socket(), &eps.rtcp_send.socket()),
        "RTCP send and receive must share one socket"
    );
    assert!(eps.rtcp_recv.owns_socket());
    assert!(!eps.rtcp_send.owns_socket());
    assert!(eps.rtp.is_running());

    session.deactivate();
}

#[test]
fn sender_activation_targets_remote_ports() {
    let session = RtpSession::new(SessionRole::Sender);
    session.set_uri("rtp://127.0.0.1:46010").unwrap();

    session.activate().unwrap();

    let eps = session.endpoints().unwrap();
    assert_eq!(
        eps.rtp.destination().unwrap(),
        "127.0.0.1:46010".parse().unwrap()
    );
    assert_eq!(eps.rtcp_recv.bound_port().unwrap(), 46011);
    assert_eq!(eps.rtcp_send.destination().unwrap().port(), 46011);
    assert!(Arc::ptr_eq(&eps.rtcp_recv.socket(), &eps.rtcp_send.socket()));

    session.deactivate();
}

#[test]
fn endpoints_link_to_the_expected_pads() {
    let mux = Arc::new(PassthroughMux::new());
    let session = session_with_mux(SessionRole::Receiver, mux.clone());
    session.set_uri("rtp://127.0.0.1:46020").unwrap();

    session.activate().unwrap();

    assert_eq!(
        mux.linked_pads(),
        vec!["recv_rtp_sink_0", "send_rtcp_src_0", "recv_rtcp_sink_0"]
    );

    session.deactivate();
}

#[test]
fn activate_is_idempotent_once_active() {
    let session = RtpSession::new(SessionRole::Receiver);
    session.set_uri("rtp://127.0.0.1:46030").unwrap();

    session.activate().unwrap();
    session.activate().unwrap();
    assert_eq!(session.state(), SessionState::Active);

    session.deactivate();
}

#[test]
fn deactivate_twice_is_harmless() {
    let session = RtpSession::new(SessionRole::Receiver);
    session.set_uri("rtp://127.0.0.1:46040").unwrap();
    session.activate().unwrap();

    session.deactivate();
    assert_eq!(session.state(), SessionState::Idle);
    session.deactivate();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.endpoints().is_none());

    // And the session can come back up afterwards.
    session.activate().unwrap();
    assert_eq!(session.state(), SessionState::Active);
    session.deactivate();
}

#[test]
fn deactivate_before_activate_is_a_no_op() {
    let session = RtpSession::new(SessionRole::Receiver);
    session.deactivate();
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn missing_mux_aborts_activation_cleanly() {
    let session = RtpSession::with_capabilities(
        SessionRole::Receiver,
        SessionCapabilities {
            mux: None,
            endpoints: Some(Arc::new(UdpEndpointFactory)),
        },
    );
    session.set_uri("rtp://127.0.0.1:46050").unwrap();

    match session.activate() {
        Err(SessionError::MissingCapability { what }) => {
            assert_eq!(what, "session multiplexer");
        }
        other => panic!("expected MissingCapability, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.endpoints().is_none());
}

#[test]
fn missing_endpoint_factory_aborts_activation_cleanly() {
    let session = RtpSession::with_capabilities(
        SessionRole::Receiver,
        SessionCapabilities {
            mux: Some(Arc::new(PassthroughMux::new())),
            endpoints: None,
        },
    );

    match session.activate() {
        Err(SessionError::MissingCapability { what }) => {
            assert_eq!(what, "endpoint factory");
        }
        other => panic!("expected MissingCapability, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn link_failure_releases_everything() {
    let session = session_with_mux(SessionRole::Receiver, Arc::new(FailingMux));
    session.set_uri("rtp://127.0.0.1:46060").unwrap();

    assert!(matches!(
        session.activate(),
        Err(SessionError::LinkFailure { .. })
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.endpoints().is_none());

    // Nothing stayed bound: the data port is immediately free again.
    std::net::UdpSocket::bind("127.0.0.1:46060").unwrap();
}

#[test]
fn discovered_streams_are_filtered_and_registered() {
    let mux = Arc::new(PassthroughMux::new());
    let session = session_with_mux(SessionRole::Receiver, mux.clone());
    session.set_uri("rtp://127.0.0.1:46070").unwrap();
    session.activate().unwrap();

    mux.announce_pad(MuxPad {
        id: 7,
        name: "recv_rtp_src_0_7_96".to_string(),
        direction: PadDirection::Src,
        caps: StreamCaps::parse("application/x-rtp, media=(string)video"),
    });
    mux.announce_pad(MuxPad {
        id: 8,
        name: "recv_rtp_sink_1".to_string(),
        direction: PadDirection::Sink,
        caps: None,
    });
    mux.announce_pad(MuxPad {
        id: 9,
        name: "send_rtcp_src_1".to_string(),
        direction: PadDirection::Src,
        caps: Some(StreamCaps::rtcp()),
    });

    // ElementAdded from connect_events plus the three pads.
    assert_eq!(session.process_events(), 4);

    let streams = session.streams();
    assert_eq!(streams.len(), 1, "only the src RTP pad becomes a stream");
    let pad = &streams[0];
    assert_eq!(pad.remote_id, Some(7));
    assert_eq!(pad.direction, PadDirection::Src);
    assert!(pad.is_active());
    assert!(pad.linked_remote);
    assert!(session.stream(pad.id).is_some());

    mux.announce_pad_removed(7);
    assert_eq!(session.process_events(), 1);
    assert!(session.streams().is_empty());

    session.deactivate();
}

#[test]
fn request_and_release_keep_the_counter_consistent() {
    let mux = Arc::new(PassthroughMux::new());
    let session = session_with_mux(SessionRole::Sender, mux.clone());
    session.set_uri("rtp://127.0.0.1:46080").unwrap();
    session.activate().unwrap();

    let first = session.request_stream().unwrap();
    assert_eq!(first.name, "send_rtp_sink_0");
    assert_eq!(session.live_send_pads(), 1);

    let second = session.request_stream().unwrap();
    assert_eq!(second.name, "send_rtp_sink_1");
    assert_eq!(session.live_send_pads(), 2);

    session.release_stream(first.id).unwrap();
    assert_eq!(session.live_send_pads(), 1);
    assert!(!first.is_active());

    assert!(matches!(
        session.release_stream(first.id),
        Err(SessionError::StreamNotFound(_))
    ));

    session.release_stream(second.id).unwrap();
    assert_eq!(session.live_send_pads(), 0);

    session.deactivate();
}

#[test]
fn deactivate_releases_requested_streams() {
    let mux = Arc::new(PassthroughMux::new());
    let session = session_with_mux(SessionRole::Sender, mux.clone());
    session.set_uri("rtp://127.0.0.1:46090").unwrap();
    session.activate().unwrap();

    let pad = session.request_stream().unwrap();
    session.deactivate();

    assert_eq!(session.live_send_pads(), 0);
    assert!(session.streams().is_empty());
    assert!(!pad.is_active());
}

#[test]
fn source_collision_is_reported_not_fatal() {
    let mux = Arc::new(PassthroughMux::new());
    let session = session_with_mux(SessionRole::Receiver, mux.clone());
    session.set_uri("rtp://127.0.0.1:46100").unwrap();
    session.activate().unwrap();
    session.process_events();

    mux.announce_collision(0xCAFE_BABE);
    assert_eq!(session.process_events(), 1);
    assert_eq!(session.state(), SessionState::Active);

    session.deactivate();
}

#[test]
fn encoding_name_reapplies_to_built_receive_endpoint() {
    let session = RtpSession::new(SessionRole::Receiver);
    session.set_uri("rtp://127.0.0.1:46110").unwrap();
    session.activate().unwrap();

    let eps = session.endpoints().unwrap();
    let caps = eps.rtp.expected_caps().unwrap();
    assert_eq!(caps.encoding_name.as_deref(), Some("H264"), "default caps");

    session.set_encoding_name(Some("VP8"));
    let caps = eps.rtp.expected_caps().unwrap();
    assert_eq!(caps.encoding_name.as_deref(), Some("VP8"));
    assert_eq!(caps.clock_rate, Some(90000));

    session.deactivate();
}

#[test]
fn encoding_name_from_uri_query_reapplies_too() {
    let session = RtpSession::new(SessionRole::Receiver);
    session.set_uri("rtp://127.0.0.1:46120").unwrap();
    session.activate().unwrap();

    session
        .set_uri("rtp://127.0.0.1:46120?encoding-name=OPUS")
        .unwrap();

    let eps = session.endpoints().unwrap();
    let caps = eps.rtp.expected_caps().unwrap();
    assert_eq!(caps.encoding_name.as_deref(), Some("OPUS"));

    session.deactivate();
}
