//! Stream capability descriptors.
//!
//! A [`StreamCaps`] names the class of traffic a pad or endpoint carries
//! (RTP data vs. RTCP control) plus the negotiated codec fields. The
//! string form mirrors the conventional caps notation:
//!
//! ```text
//! application/x-rtp, media=(string)video, clock-rate=(int)90000, encoding-name=(string)H264
//! ```
//!
//! The `(type)` annotations are accepted and ignored on parse; [`fmt::Display`]
//! emits them in canonical order.

use std::fmt;

use super::{CodecDescriptor, MediaKind};

/// Traffic class of a capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapsClass {
    /// `application/x-rtp` — media data.
    Rtp,
    /// `application/x-rtcp` — control traffic. Pads carrying this class
    /// are internal and never exposed as session streams.
    Rtcp,
    /// Anything else.
    Other,
}

impl CapsClass {
    fn parse(name: &str) -> Self {
        match name {
            "application/x-rtp" => Self::Rtp,
            "application/x-rtcp" => Self::Rtcp,
            _ => Self::Other,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Rtp => "application/x-rtp",
            Self::Rtcp => "application/x-rtcp",
            Self::Other => "application/x-unknown",
        }
    }
}

/// Capability set for one stream: traffic class plus codec fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamCaps {
    pub class: CapsClass,
    pub kind: Option<MediaKind>,
    pub encoding_name: Option<String>,
    pub clock_rate: Option<u32>,
}

impl StreamCaps {
    /// Bare RTP caps with no codec fields.
    pub fn rtp() -> Self {
        Self {
            class: CapsClass::Rtp,
            kind: None,
            encoding_name: None,
            clock_rate: None,
        }
    }

    /// Bare RTCP caps.
    pub fn rtcp() -> Self {
        Self {
            class: CapsClass::Rtcp,
            kind: None,
            encoding_name: None,
            clock_rate: None,
        }
    }

    /// RTP caps filled in from a resolved codec.
    pub fn for_codec(codec: &CodecDescriptor) -> Self {
        Self {
            class: CapsClass::Rtp,
            kind: Some(codec.kind),
            encoding_name: Some(codec.encoding_name.to_string()),
            clock_rate: (codec.clock_rate != 0).then_some(codec.clock_rate),
        }
    }

    pub fn is_rtcp(&self) -> bool {
        self.class == CapsClass::Rtcp
    }

    /// Parse a caps string. Returns `None` for input that has no leading
    /// class name; unknown fields and unparsable field values are
    /// skipped, not errors.
    pub fn parse(s: &str) -> Option<Self> {
        let mut segments = s.split(',');
        let class_name = segments.next()?.trim();
        if class_name.is_empty() || class_name.contains('=') {
            return None;
        }

        let mut caps = Self {
            class: CapsClass::parse(class_name),
            kind: None,
            encoding_name: None,
            clock_rate: None,
        };

        for segment in segments {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            let value = strip_type_annotation(value.trim());
            match key.trim() {
                "media" => caps.kind = MediaKind::parse(value),
                "encoding-name" => caps.encoding_name = Some(value.to_string()),
                "clock-rate" => caps.clock_rate = value.parse().ok(),
                _ => {}
            }
        }

        Some(caps)
    }
}

impl fmt::Display for StreamCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.class.as_str())?;
        if let Some(kind) = self.kind {
            write!(f, ", media=(string){kind}")?;
        }
        if let Some(rate) = self.clock_rate {
            write!(f, ", clock-rate=(int){rate}")?;
        }
        if let Some(name) = &self.encoding_name {
            write!(f, ", encoding-name=(string){name}")?;
        }
        Ok(())
    }
}

/// `(string)H264` → `H264`; values without an annotation pass through.
fn strip_type_annotation(value: &str) -> &str {
    if let Some(rest) = value.strip_prefix('(') {
        match rest.split_once(')') {
            Some((_, v)) => v,
            None => value,
        }
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FALLBACK_CODEC;

    #[test]
    fn parse_full_caps() {
        let caps = StreamCaps::parse(
            "application/x-rtp, media=(string)video, clock-rate=(int)90000, encoding-name=(string)H264",
        )
        .unwrap();
        assert_eq!(caps.class, CapsClass::Rtp);
        assert_eq!(caps.kind, Some(MediaKind::Video));
        assert_eq!(caps.clock_rate, Some(90000));
        assert_eq!(caps.encoding_name.as_deref(), Some("H264"));
    }

    #[test]
    fn parse_without_annotations() {
        let caps = StreamCaps::parse("application/x-rtp,media=audio,encoding-name=PCMU").unwrap();
        assert_eq!(caps.kind, Some(MediaKind::Audio));
        assert_eq!(caps.encoding_name.as_deref(), Some("PCMU"));
    }

    #[test]
    fn parse_rtcp_class() {
        assert!(StreamCaps::parse("application/x-rtcp").unwrap().is_rtcp());
    }

    #[test]
    fn parse_rejects_classless_input() {
        assert!(StreamCaps::parse("").is_none());
        assert!(StreamCaps::parse("media=video").is_none());
    }

    #[test]
    fn unknown_fields_skipped() {
        let caps = StreamCaps::parse("application/x-rtp, payload=(int)96, clock-rate=bogus").unwrap();
        assert_eq!(caps.class, CapsClass::Rtp);
        assert_eq!(caps.clock_rate, None);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let caps = StreamCaps::for_codec(&FALLBACK_CODEC);
        let reparsed = StreamCaps::parse(&caps.to_string()).unwrap();
        assert_eq!(caps, reparsed);
    }

    #[test]
    fn for_codec_omits_unknown_clock_rate() {
        let codec = crate::media::by_encoding_name("L8", MediaKind::Audio).unwrap();
        let caps = StreamCaps::for_codec(codec);
        assert_eq!(caps.clock_rate, None);
    }
}
