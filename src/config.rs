//! Typed query-parameter overlay.
//!
//! URI query parameters (`rtp://host:port?ttl=8&latency=300`) are applied
//! onto configuration fields by name. Instead of runtime reflection, each
//! configurable type declares a `const` registry of [`FieldSpec`] entries
//! — field name, semantic [`FieldKind`], and a setter function pointer —
//! and [`apply_query`] walks the query against it.
//!
//! ## Leniency
//!
//! Coercion never fails the overlay. This is a compatibility requirement,
//! not an accident:
//!
//! - booleans match `true`/`1`/`on` case-insensitively, anything else is
//!   `false`;
//! - integers go through a `strtol`-style base-agnostic parser (`0x` hex,
//!   leading-`0` octal) that takes the longest valid prefix and yields 0
//!   for garbage;
//! - out-of-range integers truncate to the target field's bit width in
//!   the setter rather than being rejected;
//! - a fraction applies only when splitting on `/` yields exactly two
//!   parts, and is ignored otherwise;
//! - unrecognized field names are logged and skipped.
//!
//! The silent defaulting can mask configuration typos (`ttl=tru` sets
//! `false`), but rejecting here would break every URI that historically
//! relied on it.

use crate::media::caps::StreamCaps;

/// Semantic type of a configurable field, directing coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    /// Signed integer; the setter narrows to the field's width.
    Int,
    /// Unsigned integer; the setter narrows to the field's width.
    Uint,
    Str,
    /// `numerator/denominator` pair.
    Fraction,
    /// Capability string, parsed by [`StreamCaps::parse`].
    Caps,
}

/// A coerced query value, ready to hand to a setter.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Str(String),
    Fraction(u64, u64),
    Caps(StreamCaps),
}

/// One entry in a type's field registry.
///
/// The registries are `const` tables built alongside the type; the setter
/// is a plain function pointer so the whole table lives in rodata.
pub struct FieldSpec<T> {
    pub name: &'static str,
    pub kind: FieldKind,
    pub set: fn(&mut T, FieldValue),
}

/// Apply URI query parameters onto `target` through its field registry.
///
/// Every parameter whose key matches a registered field is coerced per
/// the field's [`FieldKind`] and written through the setter; everything
/// else is logged and skipped. Mutates `target` in place.
pub fn apply_query<T>(target: &mut T, registry: &[FieldSpec<T>], params: &[(String, String)]) {
    for (key, raw) in params {
        let Some(spec) = registry.iter().find(|f| f.name == key) else {
            tracing::debug!(field = %key, "query parameter does not match a recognized field");
            continue;
        };
        match coerce(spec.kind, raw) {
            Some(value) => {
                tracing::trace!(field = %key, value = %raw, "set field from query");
                (spec.set)(target, value);
            }
            // Only fractions and caps can fail to coerce; scalar kinds
            // always produce a (possibly defaulted) value.
            None => tracing::debug!(field = %key, value = %raw, "query parameter ignored"),
        }
    }
}

/// Coerce a raw query value according to the field kind.
pub fn coerce(kind: FieldKind, raw: &str) -> Option<FieldValue> {
    match kind {
        FieldKind::Bool => Some(FieldValue::Bool(parse_bool(raw))),
        FieldKind::Int => Some(FieldValue::Signed(parse_i64_lenient(raw))),
        FieldKind::Uint => Some(FieldValue::Unsigned(parse_u64_lenient(raw))),
        FieldKind::Str => Some(FieldValue::Str(raw.to_string())),
        FieldKind::Fraction => {
            let parts: Vec<&str> = raw.split('/').collect();
            if parts.len() == 2 {
                Some(FieldValue::Fraction(
                    parse_u64_lenient(parts[0]),
                    parse_u64_lenient(parts[1]),
                ))
            } else {
                None
            }
        }
        FieldKind::Caps => StreamCaps::parse(raw).map(FieldValue::Caps),
    }
}

/// `true` for `true`/`1`/`on` (ASCII case-insensitive), `false` otherwise.
pub fn parse_bool(value: &str) -> bool {
    let down = value.to_ascii_lowercase();
    matches!(down.as_str(), "true" | "1" | "on")
}

/// `strtoll(value, NULL, 0)` semantics: base from prefix, longest valid
/// prefix, 0 for no digits, saturation at the 64-bit bounds.
pub fn parse_i64_lenient(value: &str) -> i64 {
    let (negative, digits, radix) = scan_int(value);
    let mag = magnitude(digits, radix);
    if negative {
        if mag > i64::MAX as u128 + 1 {
            i64::MIN
        } else {
            (mag as i128).wrapping_neg() as i64
        }
    } else {
        mag.min(i64::MAX as u128) as i64
    }
}

/// `strtoull(value, NULL, 0)` semantics, including the C quirk that a
/// leading minus wraps the magnitude around the unsigned range.
pub fn parse_u64_lenient(value: &str) -> u64 {
    let (negative, digits, radix) = scan_int(value);
    let mag = magnitude(digits, radix).min(u64::MAX as u128) as u64;
    if negative { mag.wrapping_neg() } else { mag }
}

/// Split a numeric literal into sign, digit run, and detected radix.
fn scan_int(value: &str) -> (bool, &str, u32) {
    let t = value.trim_start();
    let (negative, t) = match t.as_bytes().first() {
        Some(b'-') => (true, &t[1..]),
        Some(b'+') => (false, &t[1..]),
        _ => (false, t),
    };
    let (radix, t) = if (t.starts_with("0x") || t.starts_with("0X"))
        && t[2..].starts_with(|c: char| c.is_ascii_hexdigit())
    {
        (16, &t[2..])
    } else if t.starts_with('0') && t.len() > 1 {
        (8, &t[1..])
    } else {
        (10, t)
    };
    let end = t
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(t.len());
    (negative, &t[..end], radix)
}

fn magnitude(digits: &str, radix: u32) -> u128 {
    let mut acc: u128 = 0;
    for c in digits.chars() {
        // scan_int only kept digits valid in this radix
        let d = c.to_digit(radix).unwrap_or(0) as u128;
        acc = acc.saturating_mul(radix as u128).saturating_add(d);
    }
    acc
}
