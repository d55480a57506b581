//! RTP session facade and lifecycle.
//!
//! An [`RtpSession`] is the externally addressable object: it holds the
//! configuration (URI plus the overlay properties), owns the transport
//! endpoints once built, and tracks the streams flowing through the
//! multiplexer.
//!
//! ## Lifecycle
//!
//! ```text
//! activate:    Idle ──build endpoints──► EndpointsReady ──sync──► Active
//! deactivate:  Active | EndpointsReady ──release all──► Idle   (idempotent)
//! ```
//!
//! The only transition that can fail is `Idle → EndpointsReady`; a
//! failure there leaves the session in `Idle` with nothing built. The
//! `EndpointsReady → Active` step just propagates the run state downward.
//!
//! ## Concurrency
//!
//! Lifecycle calls come from one controlling thread, but the multiplexer
//! discovers streams on its own threads. Every mutation of the stream
//! set and its counters — caller-driven request/release and the drained
//! discovery events alike — funnels through one pad mutex, so counter
//! updates never interleave.

pub mod endpoints;

pub use endpoints::EndpointSet;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;

use parking_lot::{Mutex, RwLock};

use crate::config::{self, FieldKind, FieldSpec, FieldValue};
use crate::error::{Result, SessionError};
use crate::media::caps::StreamCaps;
use crate::media::{self, MediaKind};
use crate::mux::{MuxEvent, PadDirection, PassthroughMux, SessionMux};
use crate::transport::{EndpointFactory, UdpEndpointFactory};
use crate::uri::SessionUri;

/// Default unicast TTL.
pub const DEFAULT_TTL: u8 = 64;
/// Default multicast TTL (stay on the local segment).
pub const DEFAULT_TTL_MC: u8 = 1;
/// Default latency budget in milliseconds.
pub const DEFAULT_LATENCY_MS: u32 = 200;

/// Which half of the transport this session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Produces RTP data, receives RTCP reports back.
    Sender,
    /// Consumes RTP data, returns RTCP reports.
    Receiver,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    EndpointsReady,
    Active,
}

/// One exposed sub-stream.
///
/// Discovered streams (receive side) carry the multiplexer's pad id in
/// `remote_id`; requested send slots are session-local. A pad is owned
/// by its session until released or removed.
#[derive(Debug)]
pub struct StreamPad {
    pub id: u32,
    pub remote_id: Option<u32>,
    pub name: String,
    pub direction: PadDirection,
    pub linked_remote: bool,
    active: AtomicBool,
}

impl StreamPad {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

/// Collaborators a session is wired with.
///
/// `None` for a required capability makes activation fail with
/// [`SessionError::MissingCapability`] naming it.
pub struct SessionCapabilities {
    pub mux: Option<Arc<dyn SessionMux>>,
    pub endpoints: Option<Arc<dyn EndpointFactory>>,
}

impl Default for SessionCapabilities {
    fn default() -> Self {
        Self {
            mux: Some(Arc::new(PassthroughMux::new())),
            endpoints: Some(Arc::new(UdpEndpointFactory)),
        }
    }
}

/// Overlay-configurable session properties.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl: u8,
    pub ttl_mc: u8,
    pub encoding_name: Option<String>,
    pub latency_ms: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            ttl_mc: DEFAULT_TTL_MC,
            encoding_name: None,
            latency_ms: DEFAULT_LATENCY_MS,
        }
    }
}

/// Field registry for the query overlay. Narrowing casts in the setters
/// implement the truncate-don't-reject policy for out-of-range values.
const SESSION_FIELDS: &[FieldSpec<SessionConfig>] = &[
    FieldSpec {
        name: "ttl",
        kind: FieldKind::Uint,
        set: |c, v| {
            if let FieldValue::Unsigned(n) = v {
                c.ttl = n as u8;
            }
        },
    },
    FieldSpec {
        name: "ttl-mc",
        kind: FieldKind::Uint,
        set: |c, v| {
            if let FieldValue::Unsigned(n) = v {
                c.ttl_mc = n as u8;
            }
        },
    },
    FieldSpec {
        name: "latency",
        kind: FieldKind::Uint,
        set: |c, v| {
            if let FieldValue::Unsigned(n) = v {
                c.latency_ms = n as u32;
            }
        },
    },
    FieldSpec {
        name: "encoding-name",
        kind: FieldKind::Str,
        set: |c, v| {
            if let FieldValue::Str(s) = v {
                c.encoding_name = Some(s);
            }
        },
    },
];

/// Caps a receiver declares on its RTP endpoint: the configured encoding
/// name when it resolves, the explicit fallback codec otherwise.
pub(crate) fn receive_caps(config: &SessionConfig) -> StreamCaps {
    match config.encoding_name.as_deref() {
        Some(name) => match media::by_encoding_name(name, MediaKind::Video) {
            Some(codec) => StreamCaps::for_codec(codec),
            None => {
                tracing::warn!(encoding_name = %name, "unknown encoding name, using fallback codec");
                StreamCaps::for_codec(&media::FALLBACK_CODEC)
            }
        },
        None => StreamCaps::for_codec(&media::FALLBACK_CODEC),
    }
}

/// Stream registry; the single mutual-exclusion domain for pad state.
struct PadTable {
    pads: HashMap<u32, Arc<StreamPad>>,
    next_id: u32,
    next_send_index: u32,
    live_send_pads: u32,
}

impl PadTable {
    fn new() -> Self {
        Self {
            pads: HashMap::new(),
            next_id: 0,
            next_send_index: 0,
            live_send_pads: 0,
        }
    }
}

/// A bidirectional RTP/RTCP media transport session configured from a
/// single `rtp://` URI.
pub struct RtpSession {
    role: SessionRole,
    uri: RwLock<SessionUri>,
    config: RwLock<SessionConfig>,
    state: RwLock<SessionState>,
    endpoints: RwLock<Option<EndpointSet>>,
    pads: Mutex<PadTable>,
    events: Mutex<Option<Receiver<MuxEvent>>>,
    mux: Option<Arc<dyn SessionMux>>,
    factory: Option<Arc<dyn EndpointFactory>>,
}

impl RtpSession {
    /// Create a session with the default wiring (in-crate passthrough
    /// multiplexer, host UDP stack).
    pub fn new(role: SessionRole) -> Self {
        Self::with_capabilities(role, SessionCapabilities::default())
    }

    /// Create a session wired with explicit collaborators.
    pub fn with_capabilities(role: SessionRole, capabilities: SessionCapabilities) -> Self {
        Self {
            role,
            uri: RwLock::new(SessionUri::default()),
            config: RwLock::new(SessionConfig::default()),
            state: RwLock::new(SessionState::Idle),
            endpoints: RwLock::new(None),
            pads: Mutex::new(PadTable::new()),
            events: Mutex::new(None),
            mux: capabilities.mux,
            factory: capabilities.endpoints,
        }
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn uri(&self) -> SessionUri {
        self.uri.read().clone()
    }

    /// Set the session URI and re-run the query overlay against the
    /// session's recognized properties.
    pub fn set_uri(&self, uri: &str) -> Result<()> {
        let parsed = SessionUri::parse(uri)?;
        {
            let mut config = self.config.write();
            config::apply_query(&mut *config, SESSION_FIELDS, parsed.params());
        }
        tracing::debug!(uri = %parsed, "session URI set");
        *self.uri.write() = parsed;
        // The overlay may have changed encoding-name.
        self.refresh_receive_caps();
        Ok(())
    }

    pub fn ttl(&self) -> u8 {
        self.config.read().ttl
    }

    pub fn set_ttl(&self, ttl: u8) {
        self.config.write().ttl = ttl;
    }

    pub fn ttl_mc(&self) -> u8 {
        self.config.read().ttl_mc
    }

    pub fn set_ttl_mc(&self, ttl_mc: u8) {
        self.config.write().ttl_mc = ttl_mc;
    }

    pub fn latency_ms(&self) -> u32 {
        self.config.read().latency_ms
    }

    pub fn set_latency_ms(&self, latency_ms: u32) {
        self.config.write().latency_ms = latency_ms;
    }

    pub fn encoding_name(&self) -> Option<String> {
        self.config.read().encoding_name.clone()
    }

    /// Override the expected encoding. When endpoints are already built,
    /// the receive endpoint's expected caps are recomputed immediately.
    pub fn set_encoding_name(&self, name: Option<&str>) {
        self.config.write().encoding_name = name.map(str::to_string);
        self.refresh_receive_caps();
    }

    fn refresh_receive_caps(&self) {
        if self.role != SessionRole::Receiver {
            return;
        }
        if let Some(set) = self.endpoints.read().as_ref() {
            set.rtp.set_expected_caps(Some(receive_caps(&self.config.read())));
        }
    }

    /// Drive the session to `Active`, building endpoints on the way.
    ///
    /// Fails only in the `Idle → EndpointsReady` step; the session is
    /// then still `Idle` and no endpoint survives. Activating an already
    /// active session is a no-op.
    pub fn activate(&self) -> Result<()> {
        if self.state() == SessionState::Active {
            return Ok(());
        }

        if self.state() == SessionState::Idle {
            let mux = self
                .mux
                .clone()
                .ok_or(SessionError::MissingCapability {
                    what: "session multiplexer",
                })?;
            let factory = self
                .factory
                .clone()
                .ok_or(SessionError::MissingCapability {
                    what: "endpoint factory",
                })?;

            let uri = self.uri.read().clone();
            let config = self.config.read().clone();
            let (set, rx) = endpoints::build(self.role, &uri, &config, &mux, &factory)?;

            *self.endpoints.write() = Some(set);
            *self.events.lock() = Some(rx);
            *self.state.write() = SessionState::EndpointsReady;
            tracing::info!(role = ?self.role, uri = %uri, "endpoints ready");
        }

        // EndpointsReady → Active only propagates run state; it cannot
        // fail once the endpoints exist.
        if let Some(set) = self.endpoints.read().as_ref() {
            set.set_running(true);
        }
        *self.state.write() = SessionState::Active;
        tracing::info!(role = ?self.role, "session active");
        Ok(())
    }

    /// Release all endpoints and stream pads and return to `Idle`.
    /// Safe to call in any state, any number of times.
    pub fn deactivate(&self) {
        let released: Vec<Arc<StreamPad>> = {
            let mut pads = self.pads.lock();
            pads.live_send_pads = 0;
            pads.pads.drain().map(|(_, pad)| pad).collect()
        };
        for pad in released {
            pad.set_active(false);
            if pad.direction == PadDirection::Sink
                && let Some(mux) = &self.mux
            {
                mux.release_send_pad(&pad.name);
            }
        }

        *self.events.lock() = None;
        if let Some(set) = self.endpoints.write().take() {
            set.set_running(false);
            tracing::info!(role = ?self.role, "endpoints released");
        }
        *self.state.write() = SessionState::Idle;
    }

    /// Built endpoints, once `activate` has succeeded.
    pub fn endpoints(&self) -> Option<EndpointSet> {
        self.endpoints.read().clone()
    }

    /// Request a new outbound stream slot (sender sessions only).
    pub fn request_stream(&self) -> Result<Arc<StreamPad>> {
        if self.role != SessionRole::Sender {
            return Err(SessionError::RoleMismatch {
                op: "stream request",
                role: self.role,
            });
        }
        if self.state() == SessionState::Idle {
            return Err(SessionError::NotActivated);
        }
        let mux = self.mux.as_ref().ok_or(SessionError::MissingCapability {
            what: "session multiplexer",
        })?;

        let mut pads = self.pads.lock();
        let index = pads.next_send_index;
        let name = mux
            .request_send_pad(index)
            .ok_or_else(|| SessionError::LinkFailure {
                pad: format!("send_rtp_sink_{index}"),
            })?;
        pads.next_send_index += 1;

        let id = pads.next_id;
        pads.next_id += 1;
        let pad = Arc::new(StreamPad {
            id,
            remote_id: None,
            name,
            direction: PadDirection::Sink,
            linked_remote: true,
            active: AtomicBool::new(true),
        });
        pads.pads.insert(id, pad.clone());
        pads.live_send_pads += 1;
        tracing::debug!(id, pad = %pad.name, live = pads.live_send_pads, "send stream requested");
        Ok(pad)
    }

    /// Release a stream pad by id.
    ///
    /// Send slots are handed back to the multiplexer and decrement the
    /// live counter; discovered streams are just unregistered (the
    /// multiplexer keeps owning its side).
    pub fn release_stream(&self, id: u32) -> Result<()> {
        let mut pads = self.pads.lock();
        let pad = pads
            .pads
            .remove(&id)
            .ok_or(SessionError::StreamNotFound(id))?;
        pad.set_active(false);
        if pad.direction == PadDirection::Sink {
            if let Some(mux) = &self.mux {
                mux.release_send_pad(&pad.name);
            }
            pads.live_send_pads = pads.live_send_pads.saturating_sub(1);
        }
        tracing::debug!(id, pad = %pad.name, "stream released");
        Ok(())
    }

    /// Drain pending multiplexer events under the pad lock. Returns the
    /// number of events handled.
    ///
    /// Only src-direction RTP pads become visible streams; sink pads and
    /// control (RTCP-class) pads stay internal.
    pub fn process_events(&self) -> usize {
        let events = self.events.lock();
        let Some(rx) = events.as_ref() else {
            return 0;
        };

        let mut handled = 0;
        let mut pads = self.pads.lock();
        while let Ok(event) = rx.try_recv() {
            handled += 1;
            match event {
                MuxEvent::ElementAdded { name } => {
                    tracing::info!(element = %name, "multiplexer added element");
                }
                MuxEvent::PadAdded(p) => {
                    if p.direction == PadDirection::Sink {
                        tracing::trace!(pad = %p.name, "sink pad stays internal");
                    } else if p.caps.as_ref().is_some_and(|c| c.is_rtcp()) {
                        tracing::trace!(pad = %p.name, "control pad stays internal");
                    } else {
                        let id = pads.next_id;
                        pads.next_id += 1;
                        let pad = Arc::new(StreamPad {
                            id,
                            remote_id: Some(p.id),
                            name: p.name,
                            direction: PadDirection::Src,
                            linked_remote: true,
                            active: AtomicBool::new(true),
                        });
                        tracing::debug!(id, remote_id = p.id, pad = %pad.name, "stream exposed");
                        pads.pads.insert(id, pad);
                    }
                }
                MuxEvent::PadRemoved { id } => {
                    let local = pads
                        .pads
                        .iter()
                        .find(|(_, pad)| pad.remote_id == Some(id))
                        .map(|(local_id, _)| *local_id);
                    if let Some(local_id) = local {
                        if let Some(pad) = pads.pads.remove(&local_id) {
                            pad.set_active(false);
                            tracing::debug!(id = local_id, remote_id = id, "stream removed");
                        }
                    } else {
                        tracing::trace!(remote_id = id, "removed pad was not exposed");
                    }
                }
                MuxEvent::NewSource { ssrc } => {
                    tracing::debug!(ssrc = format_args!("{ssrc:#010X}"), "new source");
                }
                MuxEvent::SourceCollision { ssrc } => {
                    tracing::warn!(
                        ssrc = format_args!("{ssrc:#010X}"),
                        "source collision detected, continuing"
                    );
                }
            }
        }
        handled
    }

    /// Answer the multiplexer's payload-map query: static assignments by
    /// number first, then the configured encoding name, then the
    /// explicit fallback codec.
    pub fn payload_map(&self, ssrc: u32, pt: u8) -> StreamCaps {
        let caps = match media::by_payload_type(pt) {
            Some(codec) => StreamCaps::for_codec(codec),
            None => receive_caps(&self.config.read()),
        };
        tracing::debug!(ssrc = format_args!("{ssrc:#010X}"), pt, caps = %caps, "payload map answered");
        caps
    }

    /// Currently registered stream pads.
    pub fn streams(&self) -> Vec<Arc<StreamPad>> {
        self.pads.lock().pads.values().cloned().collect()
    }

    pub fn stream(&self, id: u32) -> Option<Arc<StreamPad>> {
        self.pads.lock().pads.get(&id).cloned()
    }

    /// Number of live requested send slots.
    pub fn live_send_pads(&self) -> u32 {
        self.pads.lock().live_send_pads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let session = RtpSession::new(SessionRole::Receiver);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.ttl(), 64);
        assert_eq!(session.ttl_mc(), 1);
        assert_eq!(session.latency_ms(), 200);
        assert_eq!(session.encoding_name(), None);
        assert_eq!(session.uri().to_string(), "rtp://0.0.0.0:5004");
    }

    #[test]
    fn property_setters() {
        let session = RtpSession::new(SessionRole::Sender);
        session.set_ttl(10);
        session.set_ttl_mc(2);
        session.set_latency_ms(50);
        session.set_encoding_name(Some("OPUS"));
        assert_eq!(session.ttl(), 10);
        assert_eq!(session.ttl_mc(), 2);
        assert_eq!(session.latency_ms(), 50);
        assert_eq!(session.encoding_name().as_deref(), Some("OPUS"));
        session.set_encoding_name(None);
        assert_eq!(session.encoding_name(), None);
    }

    #[test]
    fn set_uri_applies_overlay() {
        let session = RtpSession::new(SessionRole::Receiver);
        session
            .set_uri("rtp://1.230.1.2?latency=300&ttl=8&ttl-mc=9")
            .unwrap();
        assert_eq!(session.latency_ms(), 300);
        assert_eq!(session.ttl(), 8);
        assert_eq!(session.ttl_mc(), 9);
        assert_eq!(session.uri().host(), "1.230.1.2");
    }

    #[test]
    fn invalid_uri_leaves_config_untouched() {
        let session = RtpSession::new(SessionRole::Receiver);
        session.set_uri("rtp://1.230.1.2?ttl=8").unwrap();
        assert!(session.set_uri("http://1.230.1.2?ttl=99").is_err());
        assert_eq!(session.ttl(), 8);
        assert_eq!(session.uri().host(), "1.230.1.2");
    }

    #[test]
    fn unknown_query_keys_are_ignored() {
        let session = RtpSession::new(SessionRole::Receiver);
        session
            .set_uri("rtp://1.230.1.2?bogus=1&ttl=8")
            .unwrap();
        assert_eq!(session.ttl(), 8);
    }

    #[test]
    fn payload_map_static_assignment_wins() {
        let session = RtpSession::new(SessionRole::Receiver);
        session.set_encoding_name(Some("VP8"));
        let caps = session.payload_map(0x1234, 0);
        assert_eq!(caps.encoding_name.as_deref(), Some("PCMU"));
        assert_eq!(caps.kind, Some(MediaKind::Audio));
    }

    #[test]
    fn payload_map_dynamic_uses_encoding_name() {
        let session = RtpSession::new(SessionRole::Receiver);
        session.set_encoding_name(Some("VP8"));
        let caps = session.payload_map(0x1234, 96);
        assert_eq!(caps.encoding_name.as_deref(), Some("VP8"));
        assert_eq!(caps.kind, Some(MediaKind::Video));
    }

    #[test]
    fn payload_map_falls_back_to_h264() {
        let session = RtpSession::new(SessionRole::Receiver);
        let caps = session.payload_map(0x1234, 96);
        assert_eq!(caps.encoding_name.as_deref(), Some("H264"));
        assert_eq!(caps.clock_rate, Some(90000));
    }

    #[test]
    fn request_stream_needs_sender_role() {
        let session = RtpSession::new(SessionRole::Receiver);
        assert!(matches!(
            session.request_stream(),
            Err(SessionError::RoleMismatch { .. })
        ));
    }

    #[test]
    fn request_stream_needs_activation() {
        let session = RtpSession::new(SessionRole::Sender);
        assert!(matches!(
            session.request_stream(),
            Err(SessionError::NotActivated)
        ));
    }
}
