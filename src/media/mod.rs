//! RTP payload-type to codec resolution (RFC 3551).
//!
//! Two lookup tables drive the mapping from what appears on the wire to a
//! codec description:
//!
//! - [`STATIC_CODECS`] — payload types 0–34 with fixed assignments from
//!   RFC 3551 §6. Keyed by number; a numeric lookup here always wins.
//! - [`DYNAMIC_CODECS`] — encodings that only exist in the dynamic range
//!   (96–127), where the number is negotiated out-of-band and the
//!   encoding *name* is the key. Some names appear for both audio and
//!   video (`parityfec`, `rtx`), so name lookups carry a preferred media
//!   kind.
//!
//! When nothing is configured and no table matches, resolution falls back
//! to [`FALLBACK_CODEC`] (H264/video) rather than failing — receivers
//! almost always want *some* caps declared, and the facade's
//! `encoding-name` property overrides the default.

pub mod caps;

use std::fmt;

/// Media kind carried by a stream.
///
/// `Media` is the generic kind used by container-style encodings that are
/// neither plain audio nor plain video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Media,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Media => "media",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "media" => Some(Self::Media),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of one RTP codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecDescriptor {
    /// Fixed payload type, or `None` for dynamic-range encodings whose
    /// number is negotiated out-of-band.
    pub payload_type: Option<u8>,
    pub encoding_name: &'static str,
    pub kind: MediaKind,
    /// Clock rate in Hz; 0 where the rate itself is negotiated.
    pub clock_rate: u32,
}

const fn assigned(pt: u8, encoding_name: &'static str, kind: MediaKind, clock_rate: u32) -> CodecDescriptor {
    CodecDescriptor {
        payload_type: Some(pt),
        encoding_name,
        kind,
        clock_rate,
    }
}

const fn dynamic(encoding_name: &'static str, kind: MediaKind, clock_rate: u32) -> CodecDescriptor {
    CodecDescriptor {
        payload_type: None,
        encoding_name,
        kind,
        clock_rate,
    }
}

use MediaKind::{Audio, Media, Video};

/// Fixed payload-type assignments (RFC 3551 §6).
pub const STATIC_CODECS: &[CodecDescriptor] = &[
    assigned(0, "PCMU", Audio, 8000),
    assigned(3, "GSM", Audio, 8000),
    assigned(4, "G723", Audio, 8000),
    assigned(5, "DVI4", Audio, 8000),
    assigned(6, "DVI4", Audio, 16000),
    assigned(7, "LPC", Audio, 8000),
    assigned(8, "PCMA", Audio, 8000),
    assigned(9, "G722", Audio, 8000),
    assigned(10, "L16", Audio, 48000),
    assigned(11, "L16", Audio, 48000),
    assigned(12, "QCELP", Audio, 8000),
    assigned(13, "CN", Audio, 8000),
    assigned(14, "MPA", Audio, 90000),
    assigned(15, "G728", Audio, 8000),
    assigned(16, "DVI4", Audio, 11025),
    assigned(17, "DVI4", Audio, 22050),
    assigned(18, "G729", Audio, 8000),
    assigned(25, "CelB", Video, 90000),
    assigned(26, "JPEG", Video, 90000),
    assigned(28, "nv", Video, 90000),
    assigned(31, "H261", Video, 90000),
    assigned(32, "MPV", Video, 90000),
    assigned(33, "MP2T", Video, 90000),
    assigned(34, "H263", Video, 90000),
];

/// Encodings without a fixed number, keyed by name.
pub const DYNAMIC_CODECS: &[CodecDescriptor] = &[
    dynamic("MP4V-ES", Video, 90000),
    dynamic("H264", Video, 90000),
    dynamic("H265", Video, 90000),
    dynamic("MP2P", Video, 90000),
    dynamic("H263-1998", Video, 90000),
    dynamic("H263-2000", Video, 90000),
    dynamic("MP1S", Video, 90000),
    dynamic("AMR", Audio, 8000),
    dynamic("AMR-WB", Audio, 16000),
    dynamic("DAT12", Audio, 0),
    dynamic("dsr-es201108", Audio, 0),
    dynamic("EVRC", Audio, 8000),
    dynamic("EVRC0", Audio, 8000),
    dynamic("EVRC1", Audio, 8000),
    dynamic("EVRCB", Audio, 8000),
    dynamic("EVRCB0", Audio, 8000),
    dynamic("EVRCB1", Audio, 8000),
    dynamic("EVRCWB", Audio, 0),
    dynamic("EVRCWB0", Audio, 0),
    dynamic("EVRCWB1", Audio, 0),
    dynamic("G7221", Audio, 16000),
    dynamic("G726-16", Audio, 8000),
    dynamic("G726-24", Audio, 8000),
    dynamic("G726-32", Audio, 8000),
    dynamic("G726-40", Audio, 8000),
    dynamic("G729D", Audio, 8000),
    dynamic("G729E", Audio, 8000),
    dynamic("GSM-EFR", Audio, 8000),
    dynamic("L8", Audio, 0),
    dynamic("RED", Audio, 0),
    dynamic("rtx", Audio, 0),
    dynamic("VDVI", Audio, 0),
    dynamic("L20", Audio, 0),
    dynamic("L24", Audio, 0),
    dynamic("MP4A-LATM", Audio, 48000),
    dynamic("mpa-robust", Audio, 90000),
    dynamic("parityfec", Audio, 0),
    dynamic("SMV", Audio, 8000),
    dynamic("SMV0", Audio, 8000),
    dynamic("t140c", Audio, 0),
    dynamic("t38", Audio, 0),
    dynamic("telephone-event", Audio, 0),
    dynamic("tone", Audio, 0),
    dynamic("DVI4", Audio, 0),
    dynamic("G722", Audio, 0),
    dynamic("G723", Audio, 0),
    dynamic("G728", Audio, 0),
    dynamic("G729", Audio, 0),
    dynamic("GSM", Audio, 0),
    dynamic("L16", Audio, 48000),
    dynamic("LPC", Audio, 0),
    dynamic("PCMA", Audio, 0),
    dynamic("PCMU", Audio, 0),
    dynamic("OPUS", Audio, 48000),
    dynamic("BMPEG", Video, 90000),
    dynamic("BT656", Video, 90000),
    dynamic("DV", Video, 90000),
    dynamic("parityfec", Video, 0),
    dynamic("pointer", Video, 90000),
    dynamic("raw", Video, 90000),
    dynamic("rtx", Video, 0),
    dynamic("SMPTE292M", Video, 0),
    dynamic("vc1", Video, 90000),
    dynamic("THEORA", Video, 90000),
    dynamic("VP8", Video, 90000),
    dynamic("VP8-DRAFT-IETF-01", Video, 90000),
    dynamic("VP9", Video, 90000),
    dynamic("VP9-DRAFT-IETF-01", Video, 90000),
    dynamic("X-GST", Media, 9000),
];

/// First payload type of the dynamic range (RFC 3551 §3).
pub const DYNAMIC_PT_MIN: u8 = 96;

/// Conservative default used when no encoding name is configured and no
/// table lookup matches. Overridable through the session facade's
/// `encoding-name` property.
pub const FALLBACK_CODEC: CodecDescriptor = dynamic("H264", Video, 90000);

/// Look up a codec by its numeric payload type.
///
/// Returns `None` for payload types in the dynamic range (96–127) and for
/// unassigned numbers — callers then resolve by encoding name instead.
pub fn by_payload_type(pt: u8) -> Option<&'static CodecDescriptor> {
    if pt >= DYNAMIC_PT_MIN {
        return None;
    }
    STATIC_CODECS.iter().find(|c| c.payload_type == Some(pt))
}

/// Look up a codec by encoding name.
///
/// Names are not unique across media kinds, so the `preferred` kind is
/// tried first, then any kind, then the static table by name. Comparison
/// is exact.
pub fn by_encoding_name(name: &str, preferred: MediaKind) -> Option<&'static CodecDescriptor> {
    DYNAMIC_CODECS
        .iter()
        .find(|c| c.kind == preferred && c.encoding_name == name)
        .or_else(|| DYNAMIC_CODECS.iter().find(|c| c.encoding_name == name))
        .or_else(|| STATIC_CODECS.iter().find(|c| c.encoding_name == name))
}
