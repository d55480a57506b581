//! `rtp://` URI parsing.
//!
//! A session is configured from a single URI of the form
//!
//! ```text
//! rtp://<host>:<port>[?key=value[&key2=value2...]]
//! ```
//!
//! The host may be an IPv4 literal, a bracketed IPv6 literal, or a DNS
//! name. The port defaults to 5004 when absent. Query parameters are kept
//! as an ordered multimap and applied onto session properties by
//! [`config::apply_query`](crate::config::apply_query) — any property name
//! the session recognizes (`ttl`, `ttl-mc`, `encoding-name`, `latency`)
//! can appear here.
//!
//! By RFC 3550 §11 convention the RTP port is even and RTCP uses the next
//! odd port. An odd data port is accepted but logged.

use std::fmt;

use crate::error::{Result, SessionError};

/// Default session URI, matching the historical element default.
pub const DEFAULT_URI: &str = "rtp://0.0.0.0:5004";

/// Default RTP data port when the URI carries none.
pub const DEFAULT_PORT: u16 = 5004;

/// A parsed `rtp://` session URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUri {
    host: String,
    port: u16,
    params: Vec<(String, String)>,
}

impl SessionUri {
    /// Parse an `rtp://host:port?query` string.
    ///
    /// Fails with [`SessionError::InvalidUri`] when the scheme is not
    /// `rtp` (ASCII case-insensitive) or the authority is empty. Query
    /// parameters are *not* validated here — coercion onto session fields
    /// is lenient by design and happens later.
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = strip_scheme(uri).ok_or_else(|| SessionError::InvalidUri {
            reason: format!("expected rtp:// scheme in {uri:?}"),
        })?;

        let (authority, query) = match rest.find('?') {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
            None => (rest, None),
        };

        let (host, port) = split_authority(authority)?;
        if host.is_empty() {
            return Err(SessionError::InvalidUri {
                reason: format!("empty host in {uri:?}"),
            });
        }

        if port % 2 != 0 {
            tracing::warn!(port, "odd RTP port; RTCP will use an even port");
        }

        let params = query.map(parse_query).unwrap_or_default();

        Ok(Self {
            host: host.to_string(),
            port,
            params,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Query parameters in the order they appeared in the URI.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// First value for the given query key, if present.
    pub fn query_get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl Default for SessionUri {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            params: Vec::new(),
        }
    }
}

impl fmt::Display for SessionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bracketed = self.host.contains(':') && !self.host.starts_with('[');
        if bracketed {
            write!(f, "rtp://[{}]:{}", self.host, self.port)?;
        } else {
            write!(f, "rtp://{}:{}", self.host, self.port)?;
        }
        for (i, (k, v)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            if v.is_empty() {
                write!(f, "{sep}{k}")?;
            } else {
                write!(f, "{sep}{k}={v}")?;
            }
        }
        Ok(())
    }
}

/// Strip the `rtp://` prefix, case-insensitively.
fn strip_scheme(uri: &str) -> Option<&str> {
    let (scheme, rest) = uri.split_once("://")?;
    scheme.eq_ignore_ascii_case("rtp").then_some(rest)
}

/// Split `host[:port]`, handling bracketed IPv6 literals.
fn split_authority(authority: &str) -> Result<(&str, u16)> {
    if let Some(rest) = authority.strip_prefix('[') {
        // [::1]:5004 or [::1]
        let close = rest.find(']').ok_or_else(|| SessionError::InvalidUri {
            reason: format!("unterminated IPv6 literal in {authority:?}"),
        })?;
        let host = &rest[..close];
        let after = &rest[close + 1..];
        let port = match after.strip_prefix(':') {
            Some(p) => parse_port(p, authority)?,
            None if after.is_empty() => DEFAULT_PORT,
            None => {
                return Err(SessionError::InvalidUri {
                    reason: format!("junk after IPv6 literal in {authority:?}"),
                });
            }
        };
        return Ok((host, port));
    }

    match authority.rsplit_once(':') {
        // A bare IPv6 literal without brackets has multiple colons; treat
        // the whole authority as the host then.
        Some((host, _)) if host.contains(':') => Ok((authority, DEFAULT_PORT)),
        Some((host, port)) => Ok((host, parse_port(port, authority)?)),
        None => Ok((authority, DEFAULT_PORT)),
    }
}

fn parse_port(s: &str, authority: &str) -> Result<u16> {
    s.parse().map_err(|_| SessionError::InvalidUri {
        reason: format!("bad port in {authority:?}"),
    })
}

/// Split a query string into ordered key/value pairs.
///
/// A key without `=` maps to the empty string. No percent-decoding is
/// performed; property values in this scheme are plain tokens.
fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (part.to_string(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_port() {
        let uri = SessionUri::parse("rtp://239.1.2.3:5004").unwrap();
        assert_eq!(uri.host(), "239.1.2.3");
        assert_eq!(uri.port(), 5004);
        assert!(uri.params().is_empty());
    }

    #[test]
    fn parse_default_port() {
        let uri = SessionUri::parse("rtp://1.230.1.2").unwrap();
        assert_eq!(uri.port(), DEFAULT_PORT);
    }

    #[test]
    fn parse_query_ordered() {
        let uri = SessionUri::parse("rtp://1.230.1.2?latency=300&ttl=8&ttl-mc=9").unwrap();
        assert_eq!(
            uri.params(),
            &[
                ("latency".to_string(), "300".to_string()),
                ("ttl".to_string(), "8".to_string()),
                ("ttl-mc".to_string(), "9".to_string()),
            ]
        );
        assert_eq!(uri.query_get("ttl"), Some("8"));
        assert_eq!(uri.query_get("missing"), None);
    }

    #[test]
    fn parse_ipv6_bracketed() {
        let uri = SessionUri::parse("rtp://[ff02::1]:5004").unwrap();
        assert_eq!(uri.host(), "ff02::1");
        assert_eq!(uri.port(), 5004);

        let uri = SessionUri::parse("rtp://[::1]").unwrap();
        assert_eq!(uri.host(), "::1");
        assert_eq!(uri.port(), DEFAULT_PORT);
    }

    #[test]
    fn parse_scheme_case_insensitive() {
        assert!(SessionUri::parse("RTP://0.0.0.0:5004").is_ok());
    }

    #[test]
    fn reject_wrong_scheme() {
        assert!(matches!(
            SessionUri::parse("rtsp://0.0.0.0:5004"),
            Err(SessionError::InvalidUri { .. })
        ));
        assert!(matches!(
            SessionUri::parse("no-scheme-at-all"),
            Err(SessionError::InvalidUri { .. })
        ));
    }

    #[test]
    fn reject_empty_host() {
        assert!(SessionUri::parse("rtp://:5004").is_err());
    }

    #[test]
    fn display_round_trip() {
        let s = "rtp://1.230.1.2:5004?ttl=8&ttl-mc=9";
        assert_eq!(SessionUri::parse(s).unwrap().to_string(), s);

        let v6 = SessionUri::parse("rtp://[ff02::1]:5006").unwrap();
        assert_eq!(v6.to_string(), "rtp://[ff02::1]:5006");
    }

    #[test]
    fn default_matches_the_documented_literal() {
        assert_eq!(SessionUri::default().to_string(), DEFAULT_URI);
    }

    #[test]
    fn empty_query_value() {
        let uri = SessionUri::parse("rtp://0.0.0.0:5004?flag").unwrap();
        assert_eq!(uri.query_get("flag"), Some(""));
    }
}
