//! Session multiplexer capability.
//!
//! The multiplexer is the external component that fans RTP/RTCP streams
//! in and out over the session's transport endpoints — it owns the
//! packet-level work (demuxing by SSRC, jitter buffering, payload
//! handling) and this crate only wires endpoints to it and reacts to the
//! streams it discovers.
//!
//! Discovery is asynchronous: the multiplexer learns about a stream when
//! the first packet reveals its payload type, on whatever thread the
//! framework runs. Instead of calling back into the session from that
//! thread, implementations post [`MuxEvent`]s into a bounded channel
//! handed over via [`SessionMux::connect_events`]; the session drains the
//! channel under its own lock. A full queue drops the event with a
//! warning rather than blocking the framework thread.

use std::sync::mpsc::{SyncSender, TrySendError};

use parking_lot::Mutex;
use rand::RngExt;

use crate::media::caps::StreamCaps;
use crate::transport::UdpEndpoint;

/// Capacity of the discovery event channel.
pub const EVENT_QUEUE_DEPTH: usize = 64;

/// Direction of a multiplexer pad, from the multiplexer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadDirection {
    /// Data flows out of the multiplexer — a discovered stream.
    Src,
    /// Data flows into the multiplexer — internal wiring, never exposed.
    Sink,
}

/// A pad announced by the multiplexer.
#[derive(Debug, Clone)]
pub struct MuxPad {
    pub id: u32,
    pub name: String,
    pub direction: PadDirection,
    /// Negotiated capability set, when already known at announce time.
    pub caps: Option<StreamCaps>,
}

/// Asynchronous notifications from the multiplexer.
#[derive(Debug, Clone)]
pub enum MuxEvent {
    /// An internal element appeared. Logged for observability only.
    ElementAdded { name: String },
    PadAdded(MuxPad),
    PadRemoved { id: u32 },
    /// A new synchronization source was identified.
    NewSource { ssrc: u32 },
    /// Two senders picked the same SSRC. Non-fatal; reported and ignored.
    SourceCollision { ssrc: u32 },
}

/// The multiplexer capability consumed by the session.
///
/// The payload-map query runs in the other direction: when the
/// multiplexer needs caps for a payload type it asks the embedder, which
/// answers with [`RtpSession::payload_map`](crate::RtpSession::payload_map).
pub trait SessionMux: Send + Sync {
    /// Hand over the sending half of the discovery channel.
    fn connect_events(&self, tx: SyncSender<MuxEvent>);

    /// Wire an endpoint to the named multiplexer pad. Returns `false`
    /// when the pad cannot be linked.
    fn link_endpoint(&self, pad: &str, endpoint: &UdpEndpoint) -> bool;

    /// Allocate a send-direction pad for a new outbound stream. Returns
    /// the pad name, or `None` when no slot is available.
    fn request_send_pad(&self, index: u32) -> Option<String>;

    /// Release a pad previously returned by
    /// [`request_send_pad`](Self::request_send_pad).
    fn release_send_pad(&self, name: &str);
}

/// Minimal in-crate multiplexer.
///
/// Links always succeed and discovered streams are injected by the
/// embedder through the `announce_*` methods. This is the default wiring
/// for sessions that drive stream discovery themselves, and the harness
/// the integration tests build on.
pub struct PassthroughMux {
    events: Mutex<Option<SyncSender<MuxEvent>>>,
    linked: Mutex<Vec<String>>,
    send_pads: Mutex<Vec<String>>,
}

impl PassthroughMux {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(None),
            linked: Mutex::new(Vec::new()),
            send_pads: Mutex::new(Vec::new()),
        }
    }

    /// Pad names endpoints have been linked to, in link order.
    pub fn linked_pads(&self) -> Vec<String> {
        self.linked.lock().clone()
    }

    /// Inject a discovered pad into the event channel.
    pub fn announce_pad(&self, pad: MuxPad) {
        self.post(MuxEvent::PadAdded(pad));
    }

    pub fn announce_pad_removed(&self, id: u32) {
        self.post(MuxEvent::PadRemoved { id });
    }

    pub fn announce_source(&self, ssrc: u32) {
        self.post(MuxEvent::NewSource { ssrc });
    }

    pub fn announce_collision(&self, ssrc: u32) {
        self.post(MuxEvent::SourceCollision { ssrc });
    }

    fn post(&self, event: MuxEvent) {
        let guard = self.events.lock();
        let Some(tx) = guard.as_ref() else {
            tracing::debug!(?event, "no event channel connected, dropping");
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(?event, "event queue full, dropping");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("event channel disconnected");
            }
        }
    }
}

impl SessionMux for PassthroughMux {
    fn connect_events(&self, tx: SyncSender<MuxEvent>) {
        *self.events.lock() = Some(tx);
        self.post(MuxEvent::ElementAdded {
            name: "passthrough-mux".to_string(),
        });
    }

    fn link_endpoint(&self, pad: &str, endpoint: &UdpEndpoint) -> bool {
        tracing::debug!(pad, role = ?endpoint.descriptor().role, "endpoint linked");
        self.linked.lock().push(pad.to_string());
        true
    }

    fn request_send_pad(&self, index: u32) -> Option<String> {
        let name = format!("send_rtp_sink_{index}");
        self.send_pads.lock().push(name.clone());
        // A fresh outbound stream gets a random SSRC (RFC 3550 §8.1).
        let ssrc = rand::rng().random::<u32>();
        self.post(MuxEvent::NewSource { ssrc });
        Some(name)
    }

    fn release_send_pad(&self, name: &str) {
        let mut pads = self.send_pads.lock();
        if let Some(pos) = pads.iter().position(|p| p == name) {
            pads.swap_remove(pos);
            tracing::debug!(pad = %name, "send pad released");
        }
    }
}

impl Default for PassthroughMux {
    fn default() -> Self {
        Self::new()
    }
}
