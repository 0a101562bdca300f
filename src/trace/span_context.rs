//! Span identity: trace/span ids, trace flags, vendor trace state and the
//! immutable [`SpanContext`] that travels with every span.

use crate::internal_logs::{tk_debug, tk_warn};
use std::collections::VecDeque;
use std::fmt;
use std::num::ParseIntError;
use std::ops::{BitAnd, BitOr, Not};
use std::str::FromStr;
use thiserror::Error;

/// Flags that can be set on a [`SpanContext`].
///
/// Only the least significant bit (the "sampled" flag) is currently defined;
/// the remaining bits are reserved by the W3C trace context specification and
/// are masked off when a context is extracted from the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// Trace flags with the "sampled" flag cleared.
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);

    /// Trace flags with the "sampled" flag set.
    ///
    /// Spans with this flag set should be exported; spans without it are
    /// typically dropped at the export boundary.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// Construct new trace flags.
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    /// Returns `true` if the "sampled" flag is set.
    pub fn is_sampled(&self) -> bool {
        (*self & TraceFlags::SAMPLED) == TraceFlags::SAMPLED
    }

    /// Returns a copy of these flags with the "sampled" flag set to `sampled`.
    pub fn with_sampled(&self, sampled: bool) -> Self {
        if sampled {
            *self | TraceFlags::SAMPLED
        } else {
            *self & !TraceFlags::SAMPLED
        }
    }

    /// Returns the flags as a `u8`.
    pub fn to_u8(self) -> u8 {
        self.0
    }
}

impl BitAnd for TraceFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for TraceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl Not for TraceFlags {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl fmt::LowerHex for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Error returned when a trace or span id fails to parse from hex.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("not a lowercase hex string of the expected length")]
pub struct IdParseError(());

fn strict_lowercase_hex(hex: &str, expected_len: usize) -> Result<(), IdParseError> {
    if hex.len() == expected_len
        && hex
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        Ok(())
    } else {
        Err(IdParseError(()))
    }
}

/// A 16-byte value identifying an entire trace.
///
/// The id is valid if it is not all zeroes.
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

impl TraceId {
    /// The invalid trace id (all zeroes).
    pub const INVALID: TraceId = TraceId(0);

    /// Construct a trace id from its big-endian byte representation.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// Return the big-endian byte representation.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Parse a trace id from exactly 32 lowercase hexadecimal characters.
    ///
    /// Uppercase digits, short, long or otherwise malformed input is an
    /// error. This is the wire form used by the `traceparent` header.
    pub fn from_hex(hex: &str) -> Result<Self, IdParseError> {
        strict_lowercase_hex(hex, 32)?;
        u128::from_str_radix(hex, 16)
            .map(TraceId)
            .map_err(|_: ParseIntError| IdParseError(()))
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::LowerHex for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// An 8-byte value identifying a single span within a trace.
///
/// The id is valid if it is not all zeroes.
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    /// The invalid span id (all zeroes).
    pub const INVALID: SpanId = SpanId(0);

    /// Construct a span id from its big-endian byte representation.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// Return the big-endian byte representation.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Parse a span id from exactly 16 lowercase hexadecimal characters.
    pub fn from_hex(hex: &str) -> Result<Self, IdParseError> {
        strict_lowercase_hex(hex, 16)?;
        u64::from_str_radix(hex, 16)
            .map(SpanId)
            .map_err(|_: ParseIntError| IdParseError(()))
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::LowerHex for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Maximum number of members a `tracestate` may carry.
const TRACE_STATE_MAX_MEMBERS: usize = 32;

/// Maximum serialized length of a `tracestate` header.
const TRACE_STATE_MAX_LEN: usize = 512;

/// Maximum length of a single member key or value.
const TRACE_STATE_MAX_MEMBER_LEN: usize = 256;

/// Immutable, ordered vendor-specific trace data.
///
/// Members are kept most-recently-inserted first, matching the order in which
/// they appear in the W3C `tracestate` header. All mutating operations return
/// a new `TraceState`, leaving the original untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceState(Option<VecDeque<(String, String)>>);

impl TraceState {
    /// The empty trace state.
    pub const NONE: TraceState = TraceState(None);

    /// Validates a member key.
    ///
    /// Keys are up to 256 characters of `[a-z0-9_\-*/]` starting with a
    /// lowercase letter, optionally split by a single `@` into a tenant part
    /// and a short vendor part. Only the tenant part of an `@` key may start
    /// with a digit; the vendor part must start with a lowercase letter.
    fn valid_key(key: &str) -> bool {
        if key.len() > TRACE_STATE_MAX_MEMBER_LEN || key.is_empty() {
            return false;
        }

        let allowed_special = |b: u8| matches!(b, b'_' | b'-' | b'*' | b'/');
        let mut vendor_start = None;
        for (i, &b) in key.as_bytes().iter().enumerate() {
            if !(b.is_ascii_lowercase() || b.is_ascii_digit() || allowed_special(b) || b == b'@')
            {
                return false;
            }

            if i == 0 {
                if !(b.is_ascii_lowercase() || (b.is_ascii_digit() && key.contains('@'))) {
                    return false;
                }
            } else if b == b'@' {
                if vendor_start.is_some() || i + 14 < key.len() {
                    return false;
                }
                vendor_start = Some(i);
            } else if let Some(start) = vendor_start {
                if i == start + 1 && !b.is_ascii_lowercase() {
                    return false;
                }
            }
        }

        // the vendor part may not be empty
        vendor_start.map_or(true, |start| start + 1 < key.len())
    }

    /// Validates a member value: 1 to 256 printable ASCII characters
    /// excluding `,` and `=`, with no trailing space.
    fn valid_value(value: &str) -> bool {
        !value.is_empty()
            && value.len() <= TRACE_STATE_MAX_MEMBER_LEN
            && !value.ends_with(' ')
            && value
                .bytes()
                .all(|b| (0x20..=0x7e).contains(&b) && b != b',' && b != b'=')
    }

    /// Construct a trace state from the given key-value pairs.
    ///
    /// Unlike [`TraceState::insert`] this fails loudly: any invalid pair
    /// rejects the whole input. Pairs beyond the 32-member cap are discarded.
    pub fn from_key_value<T, K, V>(trace_state: T) -> Result<Self, TraceStateError>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        let mut members = VecDeque::new();
        for (key, value) in trace_state {
            let (key, value) = (key.to_string(), value.to_string());
            if !TraceState::valid_key(&key) {
                return Err(TraceStateError::Key(key));
            }
            if !TraceState::valid_value(&value) {
                return Err(TraceStateError::Value(value));
            }
            if members.len() == TRACE_STATE_MAX_MEMBERS {
                tk_warn!(
                    name: "TraceState.FromKeyValue.MemberLimitReached",
                    dropped_key = key.as_str()
                );
                break;
            }
            members.push_back((key, value));
        }

        if members.is_empty() {
            Ok(TraceState(None))
        } else {
            Ok(TraceState(Some(members)))
        }
    }

    /// Parse a `tracestate` header.
    ///
    /// Parsing is forgiving: members that fail validation are dropped, only
    /// the first occurrence of a duplicate key is kept, and at most 32 valid
    /// members are retained. A header longer than 512 characters is rejected
    /// as a whole and yields the empty trace state.
    pub fn from_header(header: &str) -> TraceState {
        if header.len() > TRACE_STATE_MAX_LEN {
            tk_warn!(
                name: "TraceState.Parse.HeaderTooLong",
                len = header.len()
            );
            return TraceState::NONE;
        }

        let mut members: VecDeque<(String, String)> = VecDeque::new();
        for member in header.split(',') {
            let member = member.trim();
            if member.is_empty() {
                continue;
            }
            let Some((key, value)) = member.split_once('=') else {
                tk_debug!(name: "TraceState.Parse.MemberInvalid");
                continue;
            };
            if !TraceState::valid_key(key) || !TraceState::valid_value(value) {
                tk_debug!(name: "TraceState.Parse.MemberInvalid");
                continue;
            }
            if members.iter().any(|(k, _)| k == key) {
                // first occurrence wins
                continue;
            }
            if members.len() == TRACE_STATE_MAX_MEMBERS {
                tk_warn!(name: "TraceState.Parse.MemberLimitReached");
                break;
            }
            members.push_back((key.to_owned(), value.to_owned()));
        }

        if members.is_empty() {
            TraceState(None)
        } else {
            TraceState(Some(members))
        }
    }

    /// Retrieves the value for the given key, if one exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.as_ref().and_then(|members| {
            members
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        })
    }

    /// Returns `true` if the trace state holds no members.
    pub fn is_empty(&self) -> bool {
        self.0.as_ref().map_or(true, VecDeque::is_empty)
    }

    /// Returns a copy of the trace state with `key` set to `value`.
    ///
    /// The member becomes the most recent (leftmost) entry; re-inserting an
    /// existing key moves it to the front with the new value. An invalid key
    /// or value leaves the trace state unchanged apart from a diagnostic.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) -> TraceState {
        let (key, value) = (key.into(), value.into());
        if !TraceState::valid_key(&key) || !TraceState::valid_value(&value) {
            tk_warn!(name: "TraceState.Insert.InvalidMember", key = key.as_str());
            return self.clone();
        }

        let mut members = self.0.clone().unwrap_or_default();
        members.retain(|(k, _)| k != &key);
        members.push_front((key, value));
        members.truncate(TRACE_STATE_MAX_MEMBERS);

        TraceState(Some(members))
    }

    /// Returns a copy of the trace state with `key` removed.
    ///
    /// Deleting a key that is not present returns the trace state unchanged.
    pub fn delete(&self, key: impl AsRef<str>) -> TraceState {
        let key = key.as_ref();
        match &self.0 {
            Some(members) if members.iter().any(|(k, _)| k == key) => {
                let mut members = members.clone();
                members.retain(|(k, _)| k != key);
                if members.is_empty() {
                    TraceState(None)
                } else {
                    TraceState(Some(members))
                }
            }
            _ => self.clone(),
        }
    }

    /// Serialize to the `tracestate` header format.
    pub fn header(&self) -> String {
        self.header_delimited("=", ",")
    }

    /// Serialize with the given entry and list delimiters.
    pub fn header_delimited(&self, entry_delimiter: &str, list_delimiter: &str) -> String {
        self.0
            .as_ref()
            .map(|members| {
                members
                    .iter()
                    .map(|(key, value)| format!("{}{}{}", key, entry_delimiter, value))
                    .collect::<Vec<String>>()
                    .join(list_delimiter)
            })
            .unwrap_or_default()
    }
}

impl FromStr for TraceState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TraceState::from_header(s))
    }
}

/// Errors returned by fallible `TraceState` construction.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceStateError {
    /// The key is not valid.
    #[error("{0} is not a valid tracestate key")]
    Key(String),

    /// The value is not valid.
    #[error("{0} is not a valid tracestate value")]
    Value(String),
}

/// The portion of a span that must be serialized and propagated across
/// process boundaries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// An invalid span context, used as the parent of root spans and as the
    /// fallback when extraction fails.
    pub const NONE: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_flags: TraceFlags::NOT_SAMPLED,
        is_remote: false,
        trace_state: TraceState::NONE,
    };

    /// Construct a new `SpanContext`.
    ///
    /// Construction never fails; contexts built from zero ids are simply
    /// invalid, which [`SpanContext::is_valid`] reports.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        is_remote: bool,
        trace_state: TraceState,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
            trace_state,
        }
    }

    /// The id of the trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The id of this span.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The flags associated with this context.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Returns `true` if both the trace id and the span id are non-zero.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// Returns `true` if this context was propagated from a remote parent.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Returns `true` if the "sampled" trace flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// The vendor trace state carried with this context.
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn trace_id_hex_data() -> Vec<(&'static str, Option<u128>)> {
        vec![
            ("00000000000000000000000000000000", Some(0)),
            ("000000000000000000000000000000ff", Some(0xff)),
            ("4bf92f3577b34da6a3ce929d0e0e4736", Some(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736)),
            // short, long, uppercase and junk must all be rejected
            ("4bf92f3577b34da6a3ce929d0e0e473", None),
            ("4bf92f3577b34da6a3ce929d0e0e47366", None),
            ("4BF92F3577B34DA6A3CE929D0E0E4736", None),
            ("4bf92f3577b34da6a3ce929d0e0e473g", None),
            ("", None),
        ]
    }

    #[test]
    fn trace_id_from_hex_is_strict() {
        for (hex, expected) in trace_id_hex_data() {
            match expected {
                Some(value) => assert_eq!(TraceId::from_hex(hex), Ok(TraceId::from(value))),
                None => assert!(TraceId::from_hex(hex).is_err(), "accepted {hex:?}"),
            }
        }
    }

    #[test]
    fn span_id_from_hex_is_strict() {
        assert_eq!(
            SpanId::from_hex("00f067aa0ba902b7"),
            Ok(SpanId::from(0x00f0_67aa_0ba9_02b7))
        );
        assert!(SpanId::from_hex("00f067aa0ba902b").is_err());
        assert!(SpanId::from_hex("00f067aa0ba902b77").is_err());
        assert!(SpanId::from_hex("00F067AA0BA902B7").is_err());
    }

    #[test]
    fn id_display_is_zero_padded_lowercase() {
        assert_eq!(TraceId::from(0xff_u128).to_string().len(), 32);
        assert_eq!(
            TraceId::from(0xff_u128).to_string(),
            "000000000000000000000000000000ff"
        );
        assert_eq!(SpanId::from(0xff_u64).to_string(), "00000000000000ff");
    }

    #[test]
    fn trace_flags_sampled_bit() {
        assert!(TraceFlags::SAMPLED.is_sampled());
        assert!(!TraceFlags::NOT_SAMPLED.is_sampled());
        assert!(TraceFlags::NOT_SAMPLED.with_sampled(true).is_sampled());
        assert!(!TraceFlags::SAMPLED.with_sampled(false).is_sampled());
        // other bits survive the sampled toggle
        let flags = TraceFlags::new(0xf0).with_sampled(true);
        assert_eq!(flags.to_u8(), 0xf1);
        assert_eq!(flags.with_sampled(false).to_u8(), 0xf0);
    }

    #[rustfmt::skip]
    fn trace_state_key_data() -> Vec<(&'static str, bool)> {
        vec![
            ("bar", true),
            ("foo@bar", true),
            // digit-first is only legal for the tenant part of an @ key
            ("123", false),
            ("123@bar", true),
            // the vendor part must start with a letter and be non-empty
            ("foo@1bar", false),
            ("foo@", false),
            ("foo@0123456789abcdef", false),
            ("foo@abcdefghijklmn", false),
            ("foo@abcdefghijklm", true),
            ("FOO@BAR", false),
            ("你好", false),
            ("", false),
        ]
    }

    #[test]
    fn test_trace_state_key() {
        for (key, expected) in trace_state_key_data() {
            assert_eq!(TraceState::valid_key(key), expected, "{key:?}");
        }
    }

    #[test]
    fn test_trace_state_value() {
        assert!(TraceState::valid_value("value"));
        assert!(TraceState::valid_value("v a l u e"));
        assert!(!TraceState::valid_value(""));
        assert!(!TraceState::valid_value("trailing "));
        assert!(!TraceState::valid_value("a,b"));
        assert!(!TraceState::valid_value("a=b"));
        assert!(!TraceState::valid_value("non\u{0007}printable"));
    }

    #[test]
    fn insert_is_most_recent_first() {
        let state = TraceState::NONE.insert("a", "1").insert("b", "2");
        assert_eq!(state.header(), "b=2,a=1");

        // re-inserting moves the key to the front with the new value
        let state = state.insert("a", "3");
        assert_eq!(state.header(), "a=3,b=2");
        assert_eq!(state.get("a"), Some("3"));
    }

    #[test]
    fn insert_invalid_member_is_ignored() {
        let state = TraceState::NONE.insert("a", "1");
        assert_eq!(state.insert("NOPE", "x"), state);
        assert_eq!(state.insert("ok", ""), state);
    }

    #[test]
    fn insert_beyond_member_limit_drops_rightmost() {
        let mut state = TraceState::NONE;
        for i in 0..32 {
            state = state.insert(format!("key{}", i), "v");
        }
        assert_eq!(state.header().split(',').count(), 32);
        assert_eq!(state.get("key0"), Some("v"));

        let state = state.insert("one_more", "v");
        assert_eq!(state.header().split(',').count(), 32);
        assert_eq!(state.get("one_more"), Some("v"));
        // the oldest member fell off the end
        assert_eq!(state.get("key0"), None);
    }

    #[test]
    fn delete_returns_unchanged_when_absent() {
        let state = TraceState::NONE.insert("a", "1");
        assert_eq!(state.delete("missing"), state);
        assert_eq!(state.delete("a"), TraceState::NONE);
    }

    #[test]
    fn parse_header_drops_invalid_members() {
        let state = TraceState::from_header("foo=bar,INVALID=x,baz=qux,broken");
        assert_eq!(state.header(), "foo=bar,baz=qux");
    }

    #[test]
    fn parse_header_first_duplicate_wins() {
        let state = TraceState::from_header("foo=1,foo=2,bar=3");
        assert_eq!(state.get("foo"), Some("1"));
        assert_eq!(state.header(), "foo=1,bar=3");
    }

    #[test]
    fn parse_header_rejects_oversized_header() {
        let header = (0..40)
            .map(|i| format!("key{:04}=valuevalue", i))
            .collect::<Vec<_>>()
            .join(",");
        assert!(header.len() > 512);
        assert_eq!(TraceState::from_header(&header), TraceState::NONE);
    }

    #[test]
    fn parse_header_caps_members_at_32() {
        let header = (0..40)
            .map(|i| format!("k{}=v", i))
            .collect::<Vec<_>>()
            .join(",");
        assert!(header.len() <= 512);
        let state = TraceState::from_header(&header);
        assert_eq!(state.header().split(',').count(), 32);
        assert_eq!(state.get("k0"), Some("v"));
        assert_eq!(state.get("k31"), Some("v"));
        assert_eq!(state.get("k32"), None);
    }

    #[test]
    fn parse_round_trips_header(){
        let state = TraceState::from_header("foo=bar,apple=banana");
        assert_eq!(state.header(), "foo=bar,apple=banana");
        assert_eq!(state.header_delimited("-", ";"), "foo-bar;apple-banana");
    }

    #[test]
    fn from_key_value_rejects_invalid_pairs() {
        assert!(TraceState::from_key_value(vec![("foo", "bar")]).is_ok());
        assert!(TraceState::from_key_value(vec![("FOO", "bar")]).is_err());
        assert!(TraceState::from_key_value(vec![("foo", "bar,")]).is_err());
    }

    #[test]
    fn span_context_validity() {
        assert!(!SpanContext::NONE.is_valid());
        assert!(!SpanContext::NONE.is_sampled());

        let cx = SpanContext::new(
            TraceId::from(1u128),
            SpanId::from(1u64),
            TraceFlags::SAMPLED,
            true,
            TraceState::NONE,
        );
        assert!(cx.is_valid());
        assert!(cx.is_sampled());
        assert!(cx.is_remote());

        let missing_span = SpanContext::new(
            TraceId::from(1u128),
            SpanId::INVALID,
            TraceFlags::SAMPLED,
            false,
            TraceState::NONE,
        );
        assert!(!missing_span.is_valid());
    }
}
