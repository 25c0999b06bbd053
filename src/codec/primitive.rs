//! Primitive Codec Module
//!
//! Byte layouts for the fixed set of known value types. All numbers are
//! little-endian. Strings, blobs and addresses take the rest of the buffer.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, TimeZone};
use uuid::Uuid;

use crate::codec::frame::{FrameBuilder, ShapedFrame};
use crate::codec::header::TypeTag;
use crate::codec::object;
use crate::error::{CacheError, Result};
use crate::value::{CacheValue, DateTimeKind, Decimal, Timestamp};

// == Tick Constants ==
/// Ticks (100ns) per second.
const TICKS_PER_SECOND: i64 = 10_000_000;
/// Ticks from 0001-01-01T00:00:00 to the Unix epoch.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;
/// Ticks at 9999-12-31T23:59:59.9999999.
const MAX_TICKS: i64 = 3_155_378_975_999_999_999;

const TICKS_MASK: u64 = 0x3FFF_FFFF_FFFF_FFFF;
const KIND_SHIFT: u32 = 62;

// == Encode ==
/// Lays out a value through the frame builder.
///
/// Object parts come from the object codec, everything else is laid out here.
pub(crate) fn encode(value: &CacheValue, frame: &FrameBuilder) -> Result<ShapedFrame> {
    let tag = value.tag();
    match value {
        CacheValue::Bool(v) => frame.build(tag, &[&[u8::from(*v)]]),
        CacheValue::Char(v) => frame.build(tag, &[&char_to_unit(*v)?.to_le_bytes()]),
        CacheValue::Byte(v) => frame.build(tag, &[&[*v]]),
        CacheValue::SByte(v) => frame.build(tag, &[&v.to_le_bytes()]),
        CacheValue::Int16(v) => frame.build(tag, &[&v.to_le_bytes()]),
        CacheValue::UInt16(v) => frame.build(tag, &[&v.to_le_bytes()]),
        CacheValue::Int32(v) => frame.build(tag, &[&v.to_le_bytes()]),
        CacheValue::UInt32(v) => frame.build(tag, &[&v.to_le_bytes()]),
        CacheValue::Int64(v) => frame.build(tag, &[&v.to_le_bytes()]),
        CacheValue::UInt64(v) => frame.build(tag, &[&v.to_le_bytes()]),
        CacheValue::Single(v) => frame.build(tag, &[&v.to_le_bytes()]),
        CacheValue::Double(v) => frame.build(tag, &[&v.to_le_bytes()]),
        CacheValue::Decimal(v) => frame.build(tag, &[&decimal_bytes(*v)]),
        CacheValue::Duration(v) => frame.build(tag, &[&delta_to_ticks(*v)?.to_le_bytes()]),
        CacheValue::Timestamp(v) => frame.build(tag, &[&timestamp_word(v)?.to_le_bytes()]),
        CacheValue::TimestampOffset(v) => frame.build(tag, &[&offset_bytes(v)?]),
        CacheValue::Guid(v) => frame.build(tag, &[&v.to_bytes_le()]),
        CacheValue::String(v) => frame.build(tag, &[v.as_bytes()]),
        CacheValue::IpAddress(IpAddr::V4(v)) => frame.build(tag, &[&v.octets()]),
        CacheValue::IpAddress(IpAddr::V6(v)) => frame.build(tag, &[&v.octets()]),
        CacheValue::Bytes(v) => frame.build(tag, &[v]),
        CacheValue::Object(v) => {
            let (name_len, name, json) = object::encode_parts(v)?;
            frame.build(tag, &[&name_len, name, json.as_bytes()])
        }
    }
}

// == Decode ==
/// Decodes a payload for any tag except [`TypeTag::Object`].
pub(crate) fn decode(tag: TypeTag, payload: &[u8]) -> Result<CacheValue> {
    if let Some(width) = tag.fixed_width() {
        if payload.len() != width {
            return Err(CacheError::Corrupt(format!(
                "{tag} payload is {} bytes, expected {width}",
                payload.len()
            )));
        }
    }

    let value = match tag {
        // objects need a registry and are decoded by the object codec
        TypeTag::Object => return Err(CacheError::UnsupportedType(tag.code())),
        TypeTag::Bool => CacheValue::Bool(payload[0] != 0),
        TypeTag::Char => CacheValue::Char(unit_to_char(u16::from_le_bytes(fixed(payload)))?),
        TypeTag::Byte => CacheValue::Byte(payload[0]),
        TypeTag::SByte => CacheValue::SByte(i8::from_le_bytes(fixed(payload))),
        TypeTag::Int16 => CacheValue::Int16(i16::from_le_bytes(fixed(payload))),
        TypeTag::UInt16 => CacheValue::UInt16(u16::from_le_bytes(fixed(payload))),
        TypeTag::Int32 => CacheValue::Int32(i32::from_le_bytes(fixed(payload))),
        TypeTag::UInt32 => CacheValue::UInt32(u32::from_le_bytes(fixed(payload))),
        TypeTag::Int64 => CacheValue::Int64(i64::from_le_bytes(fixed(payload))),
        TypeTag::UInt64 => CacheValue::UInt64(u64::from_le_bytes(fixed(payload))),
        TypeTag::Single => CacheValue::Single(f32::from_le_bytes(fixed(payload))),
        TypeTag::Double => CacheValue::Double(f64::from_le_bytes(fixed(payload))),
        TypeTag::Decimal => CacheValue::Decimal(decimal_from_bytes(fixed(payload))?),
        TypeTag::Duration => CacheValue::Duration(ticks_to_delta(i64::from_le_bytes(fixed(payload)))?),
        TypeTag::Timestamp => CacheValue::Timestamp(timestamp_from_word(u64::from_le_bytes(fixed(payload)))?),
        TypeTag::TimestampOffset => CacheValue::TimestampOffset(offset_from_bytes(fixed(payload))?),
        TypeTag::Guid => CacheValue::Guid(Uuid::from_bytes_le(fixed(payload))),
        TypeTag::String => CacheValue::String(
            String::from_utf8(payload.to_vec())
                .map_err(|e| CacheError::Corrupt(format!("string is not UTF-8: {e}")))?,
        ),
        TypeTag::IpAddress => CacheValue::IpAddress(ip_from_bytes(payload)?),
        TypeTag::Bytes => CacheValue::Bytes(payload.to_vec()),
    };
    Ok(value)
}

/// Copies a payload already checked against its fixed width.
fn fixed<const N: usize>(payload: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&payload[..N]);
    out
}

// == Char ==
fn char_to_unit(c: char) -> Result<u16> {
    let mut units = [0u16; 2];
    match c.encode_utf16(&mut units) {
        [unit] => Ok(*unit),
        _ => Err(CacheError::OutOfRange(format!(
            "char U+{:04X} needs a surrogate pair",
            u32::from(c)
        ))),
    }
}

fn unit_to_char(unit: u16) -> Result<char> {
    char::from_u32(u32::from(unit))
        .ok_or_else(|| CacheError::Corrupt(format!("lone surrogate {unit:#06x} in char payload")))
}

// == Decimal ==
fn decimal_bytes(value: Decimal) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (chunk, word) in out.chunks_exact_mut(4).zip(value.to_bits()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}

fn decimal_from_bytes(bytes: [u8; 16]) -> Result<Decimal> {
    let mut words = [0u32; 4];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes(fixed(chunk));
    }
    Decimal::from_bits(words)
}

// == Ticks ==
/// Converts a duration to 100ns ticks, truncating finer precision.
fn delta_to_ticks(delta: TimeDelta) -> Result<i64> {
    let ticks = i128::from(delta.num_seconds()) * i128::from(TICKS_PER_SECOND)
        + i128::from(delta.subsec_nanos() / 100);
    i64::try_from(ticks)
        .map_err(|_| CacheError::OutOfRange(format!("duration {delta} exceeds the tick range")))
}

fn ticks_to_delta(ticks: i64) -> Result<TimeDelta> {
    let seconds = TimeDelta::try_seconds(ticks / TICKS_PER_SECOND);
    let fraction = TimeDelta::nanoseconds((ticks % TICKS_PER_SECOND) * 100);
    seconds
        .and_then(|s| s.checked_add(&fraction))
        .ok_or_else(|| CacheError::Corrupt(format!("{ticks} ticks exceed the duration range")))
}

/// Ticks since 0001-01-01 for a naive calendar time.
fn datetime_to_ticks(datetime: &NaiveDateTime) -> Result<i64> {
    let utc = datetime.and_utc();
    let ticks = i128::from(utc.timestamp()) * i128::from(TICKS_PER_SECOND)
        + i128::from(utc.timestamp_subsec_nanos() / 100)
        + i128::from(UNIX_EPOCH_TICKS);
    i64::try_from(ticks)
        .ok()
        .filter(|t| (0..=MAX_TICKS).contains(t))
        .ok_or_else(|| {
            CacheError::OutOfRange(format!("{datetime} is outside years 1 through 9999"))
        })
}

fn ticks_to_datetime(ticks: i64) -> Result<NaiveDateTime> {
    if !(0..=MAX_TICKS).contains(&ticks) {
        return Err(CacheError::Corrupt(format!("{ticks} ticks are outside the calendar range")));
    }
    let since_epoch = ticks - UNIX_EPOCH_TICKS;
    let seconds = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = (since_epoch.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(seconds, nanos)
        .map(|utc| utc.naive_utc())
        .ok_or_else(|| CacheError::Corrupt(format!("{ticks} ticks are outside the calendar range")))
}

// == Timestamp ==
/// Packs 62 bits of ticks with the kind in the top two bits.
fn timestamp_word(value: &Timestamp) -> Result<u64> {
    let ticks = datetime_to_ticks(&value.datetime)? as u64;
    let kind: u64 = match value.kind {
        DateTimeKind::Unspecified => 0,
        DateTimeKind::Utc => 1,
        DateTimeKind::Local => 2,
    };
    Ok(ticks | (kind << KIND_SHIFT))
}

fn timestamp_from_word(word: u64) -> Result<Timestamp> {
    let kind = match word >> KIND_SHIFT {
        0 => DateTimeKind::Unspecified,
        1 => DateTimeKind::Utc,
        // 3 marks a local time inside an ambiguous daylight-saving hour
        _ => DateTimeKind::Local,
    };
    let datetime = ticks_to_datetime((word & TICKS_MASK) as i64)?;
    Ok(Timestamp::new(datetime, kind))
}

// == Timestamp With Offset ==
/// Local clock ticks followed by offset ticks.
fn offset_bytes(value: &DateTime<FixedOffset>) -> Result<[u8; 16]> {
    let clock = datetime_to_ticks(&value.naive_local())?;
    let offset = i64::from(value.offset().local_minus_utc()) * TICKS_PER_SECOND;
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&clock.to_le_bytes());
    out[8..].copy_from_slice(&offset.to_le_bytes());
    Ok(out)
}

fn offset_from_bytes(bytes: [u8; 16]) -> Result<DateTime<FixedOffset>> {
    let clock = i64::from_le_bytes(fixed(&bytes[..8]));
    let offset_ticks = i64::from_le_bytes(fixed(&bytes[8..]));
    if offset_ticks % TICKS_PER_SECOND != 0 {
        return Err(CacheError::Corrupt(format!(
            "offset of {offset_ticks} ticks is not a whole number of seconds"
        )));
    }

    let offset = i32::try_from(offset_ticks / TICKS_PER_SECOND)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| CacheError::Corrupt(format!("offset of {offset_ticks} ticks is out of range")))?;
    let local = ticks_to_datetime(clock)?;
    offset
        .from_local_datetime(&local)
        .single()
        .ok_or_else(|| CacheError::Corrupt(format!("{local} does not exist at offset {offset}")))
}

// == IP Address ==
fn ip_from_bytes(payload: &[u8]) -> Result<IpAddr> {
    match payload.len() {
        4 => Ok(IpAddr::V4(Ipv4Addr::from(fixed::<4>(payload)))),
        16 => Ok(IpAddr::V6(Ipv6Addr::from(fixed::<16>(payload)))),
        other => Err(CacheError::Corrupt(format!(
            "ip address payload is {other} bytes, expected 4 or 16"
        ))),
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use std::str::FromStr;

    fn plain() -> FrameBuilder {
        FrameBuilder::new(None, usize::MAX)
    }

    fn payload_of(value: &CacheValue) -> Vec<u8> {
        encode(value, &plain()).unwrap().bytes[1..].to_vec()
    }

    fn round_trip(value: CacheValue) {
        let payload = payload_of(&value);
        assert_eq!(decode(value.tag(), &payload).unwrap(), value);
    }

    #[test]
    fn test_integer_layouts() {
        assert_eq!(payload_of(&CacheValue::Int16(-2)), vec![0xFE, 0xFF]);
        assert_eq!(payload_of(&CacheValue::UInt32(0x0102_0304)), vec![4, 3, 2, 1]);
        assert_eq!(payload_of(&CacheValue::Bool(true)), vec![1]);
        assert_eq!(payload_of(&CacheValue::SByte(-1)), vec![0xFF]);
    }

    #[test]
    fn test_scalar_extremes_round_trip() {
        round_trip(CacheValue::Bool(false));
        round_trip(CacheValue::Byte(u8::MAX));
        round_trip(CacheValue::SByte(i8::MIN));
        round_trip(CacheValue::Int16(i16::MIN));
        round_trip(CacheValue::UInt16(u16::MAX));
        round_trip(CacheValue::Int32(i32::MAX));
        round_trip(CacheValue::UInt32(0));
        round_trip(CacheValue::Int64(i64::MIN));
        round_trip(CacheValue::UInt64(u64::MAX));
        round_trip(CacheValue::Single(f32::MIN_POSITIVE));
        round_trip(CacheValue::Double(-1.5e300));
    }

    #[test]
    fn test_char_layout_and_limits() {
        assert_eq!(payload_of(&CacheValue::Char('A')), vec![0x41, 0x00]);
        round_trip(CacheValue::Char('\u{FFFF}'));
        round_trip(CacheValue::Char('é'));

        let result = encode(&CacheValue::Char('😀'), &plain());
        assert!(matches!(result, Err(CacheError::OutOfRange(_))));
        assert!(matches!(
            decode(TypeTag::Char, &[0x00, 0xD8]),
            Err(CacheError::Corrupt(_))
        ));
    }

    #[test]
    fn test_decimal_layout() {
        let d = Decimal::new(-1, 3).unwrap();
        assert_eq!(
            payload_of(&CacheValue::Decimal(d)),
            vec![1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3, 0x80]
        );
        round_trip(CacheValue::Decimal(Decimal::MAX));
        round_trip(CacheValue::Decimal(Decimal::MIN));
    }

    #[test]
    fn test_duration_ticks() {
        let delta = TimeDelta::milliseconds(1);
        assert_eq!(payload_of(&CacheValue::Duration(delta)), 10_000i64.to_le_bytes().to_vec());
        round_trip(CacheValue::Duration(TimeDelta::nanoseconds(-1_234_567_800)));
        round_trip(CacheValue::Duration(TimeDelta::zero()));
        assert_eq!(delta_to_ticks(ticks_to_delta(i64::MAX).unwrap()).unwrap(), i64::MAX);
        assert_eq!(delta_to_ticks(ticks_to_delta(i64::MIN).unwrap()).unwrap(), i64::MIN);
    }

    #[test]
    fn test_timestamp_packs_kind_in_top_bits() {
        let epoch = DateTime::from_timestamp(0, 0).unwrap().naive_utc();
        let payload = payload_of(&CacheValue::Timestamp(Timestamp::utc(epoch.and_utc())));
        let word = u64::from_le_bytes(payload.try_into().unwrap());
        assert_eq!(word >> 62, 1);
        assert_eq!(word & TICKS_MASK, UNIX_EPOCH_TICKS as u64);
    }

    #[test]
    fn test_timestamp_bounds() {
        let min = NaiveDate::from_ymd_opt(1, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let max = NaiveDate::from_ymd_opt(9999, 12, 31)
            .unwrap()
            .and_hms_nano_opt(23, 59, 59, 999_999_900)
            .unwrap();
        assert_eq!(datetime_to_ticks(&min).unwrap(), 0);
        assert_eq!(datetime_to_ticks(&max).unwrap(), MAX_TICKS);
        round_trip(CacheValue::Timestamp(Timestamp::local(max)));
        round_trip(CacheValue::Timestamp(Timestamp::unspecified(min)));

        let too_late = NaiveDate::from_ymd_opt(10000, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let result = encode(&CacheValue::Timestamp(Timestamp::unspecified(too_late)), &plain());
        assert!(matches!(result, Err(CacheError::OutOfRange(_))));
    }

    #[test]
    fn test_ambiguous_local_kind_reads_as_local() {
        let word = 3u64 << 62;
        let ts = timestamp_from_word(word).unwrap();
        assert_eq!(ts.kind, DateTimeKind::Local);
    }

    #[test]
    fn test_timestamp_offset_layout() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let value = offset.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
        let payload = payload_of(&CacheValue::TimestampOffset(value));
        let clock = i64::from_le_bytes(payload[..8].try_into().unwrap());
        let offset_ticks = i64::from_le_bytes(payload[8..].try_into().unwrap());
        assert_eq!(clock, datetime_to_ticks(&value.naive_local()).unwrap());
        assert_eq!(offset_ticks, 2 * 3600 * TICKS_PER_SECOND);
        round_trip(CacheValue::TimestampOffset(value));
    }

    #[test]
    fn test_timestamp_offset_rejects_fractional_offset() {
        let mut bytes = [0u8; 16];
        bytes[8..].copy_from_slice(&5i64.to_le_bytes());
        assert!(matches!(
            decode(TypeTag::TimestampOffset, &bytes),
            Err(CacheError::Corrupt(_))
        ));
    }

    #[test]
    fn test_guid_mixed_endian_layout() {
        let guid = Uuid::from_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        assert_eq!(
            payload_of(&CacheValue::Guid(guid)),
            vec![
                0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xaa, 0xbb, 0xcc,
                0xdd, 0xee, 0xff
            ]
        );
        round_trip(CacheValue::Guid(Uuid::new_v4()));
    }

    #[test]
    fn test_variable_length_payloads() {
        round_trip(CacheValue::String(String::new()));
        round_trip(CacheValue::String("héllo wörld".into()));
        round_trip(CacheValue::Bytes(vec![]));
        round_trip(CacheValue::Bytes((0..=255).collect()));
        round_trip(CacheValue::IpAddress(IpAddr::from_str("10.0.0.1").unwrap()));
        round_trip(CacheValue::IpAddress(IpAddr::from_str("::1").unwrap()));
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(decode(TypeTag::Int32, &[1, 2]), Err(CacheError::Corrupt(_))));
        assert!(matches!(decode(TypeTag::Bool, &[]), Err(CacheError::Corrupt(_))));
        assert!(matches!(decode(TypeTag::IpAddress, &[1, 2, 3]), Err(CacheError::Corrupt(_))));
        assert!(matches!(decode(TypeTag::String, &[0xC3]), Err(CacheError::Corrupt(_))));
    }

    #[test]
    fn test_current_time_round_trips_at_tick_precision() {
        let now = Utc::now();
        let ticks = datetime_to_ticks(&now.naive_utc()).unwrap();
        let back = ticks_to_datetime(ticks).unwrap();
        assert!((now.naive_utc() - back).num_nanoseconds().unwrap() < 100);
    }
}
