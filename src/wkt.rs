//! Well-known `google.protobuf` types that get special JSON treatment.
//!
//! Recognition is by full type name, so any descriptor carrying one of
//! these names participates, regardless of how it was constructed. The
//! date math is self-contained civil-calendar arithmetic; no timezone
//! ever applies because the wire types are fixed to UTC.

use crate::error::SerializationError;

/// Field numbers shared by Timestamp and Duration.
pub const SECONDS_FIELD: u32 = 1;
pub const NANOS_FIELD: u32 = 2;
/// The single field of every wrapper type.
pub const WRAPPER_VALUE_FIELD: u32 = 1;

pub const TIMESTAMP_TYPE: &str = "google.protobuf.Timestamp";
pub const DURATION_TYPE: &str = "google.protobuf.Duration";

/// Seconds of `0001-01-01T00:00:00Z` relative to the Unix epoch.
pub const TIMESTAMP_MIN_SECONDS: i64 = -62_135_596_800;
/// Seconds of `9999-12-31T23:59:59Z` relative to the Unix epoch.
pub const TIMESTAMP_MAX_SECONDS: i64 = 253_402_300_799;
/// Duration magnitude cap: ±10,000 years in seconds.
pub const DURATION_MAX_SECONDS: i64 = 315_576_000_000;

const NANOS_PER_SECOND: i32 = 1_000_000_000;
const SECONDS_PER_DAY: i64 = 86_400;

/// Whether `full_name` is one of the nine wrapper types whose JSON form
/// is the bare value of their single field.
pub fn is_wrapper_type(full_name: &str) -> bool {
    matches!(
        full_name,
        "google.protobuf.DoubleValue"
            | "google.protobuf.FloatValue"
            | "google.protobuf.Int64Value"
            | "google.protobuf.UInt64Value"
            | "google.protobuf.Int32Value"
            | "google.protobuf.UInt32Value"
            | "google.protobuf.BoolValue"
            | "google.protobuf.StringValue"
            | "google.protobuf.BytesValue"
    )
}

/// Days since the Unix epoch for a civil date. Gregorian, proleptic.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u64;
    let mp = (month + 9) % 12;
    let doy = (153 * mp as u64 + 2) / 5 + day as u64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe as i64 - 719_468
}

/// Inverse of [`days_from_civil`].
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

/// Appends `value` as `width` zero-padded digits.
fn push_padded(out: &mut String, value: u64, width: usize) {
    let digits = value.to_string();
    for _ in digits.len()..width {
        out.push('0');
    }
    out.push_str(&digits);
}

/// Appends a fractional-seconds suffix using 3, 6, or 9 digits, or
/// nothing when `nanos` is zero.
fn push_fraction(out: &mut String, nanos: u32) {
    if nanos == 0 {
        return;
    }
    out.push('.');
    if nanos % 1_000_000 == 0 {
        push_padded(out, (nanos / 1_000_000) as u64, 3);
    } else if nanos % 1_000 == 0 {
        push_padded(out, (nanos / 1_000) as u64, 6);
    } else {
        push_padded(out, nanos as u64, 9);
    }
}

/// Renders a Timestamp as RFC 3339 UTC, e.g. `1972-01-01T10:00:20.021Z`.
pub fn format_timestamp(seconds: i64, nanos: i32) -> Result<String, SerializationError> {
    if !(TIMESTAMP_MIN_SECONDS..=TIMESTAMP_MAX_SECONDS).contains(&seconds)
        || !(0..NANOS_PER_SECOND).contains(&nanos)
    {
        return Err(SerializationError::TimestampOutOfRange { seconds, nanos });
    }
    let days = seconds.div_euclid(SECONDS_PER_DAY);
    let secs_of_day = seconds.rem_euclid(SECONDS_PER_DAY);
    let (year, month, day) = civil_from_days(days);

    let mut out = String::with_capacity(30);
    push_padded(&mut out, year as u64, 4);
    out.push('-');
    push_padded(&mut out, month as u64, 2);
    out.push('-');
    push_padded(&mut out, day as u64, 2);
    out.push('T');
    push_padded(&mut out, (secs_of_day / 3600) as u64, 2);
    out.push(':');
    push_padded(&mut out, (secs_of_day / 60 % 60) as u64, 2);
    out.push(':');
    push_padded(&mut out, (secs_of_day % 60) as u64, 2);
    push_fraction(&mut out, nanos as u32);
    out.push('Z');
    Ok(out)
}

struct DateTimeParser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> DateTimeParser<'a> {
    fn digits(&mut self, count: usize) -> Option<u64> {
        let end = self.pos.checked_add(count)?;
        let slice = self.input.get(self.pos..end)?;
        let mut value = 0u64;
        for &byte in slice {
            if !byte.is_ascii_digit() {
                return None;
            }
            value = value * 10 + (byte - b'0') as u64;
        }
        self.pos = end;
        Some(value)
    }

    fn literal(&mut self, expected: u8) -> Option<()> {
        let byte = *self.input.get(self.pos)?;
        // 'T' and 'Z' are also accepted lowercase per RFC 3339.
        if byte == expected || byte.to_ascii_uppercase() == expected {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }
}

/// Parses an RFC 3339 timestamp into `(seconds, nanos)`. Accepts any
/// fraction up to 9 digits and numeric UTC offsets, normalizing to UTC.
/// Returns `None` for anything malformed or out of the representable
/// range.
pub fn parse_timestamp(text: &str) -> Option<(i64, i32)> {
    let mut p = DateTimeParser {
        input: text.as_bytes(),
        pos: 0,
    };
    let year = p.digits(4)? as i64;
    p.literal(b'-')?;
    let month = p.digits(2)? as u32;
    p.literal(b'-')?;
    let day = p.digits(2)? as u32;
    p.literal(b'T')?;
    let hour = p.digits(2)?;
    p.literal(b':')?;
    let minute = p.digits(2)?;
    p.literal(b':')?;
    let second = p.digits(2)?;

    if !(1..=12).contains(&month) || day < 1 || day > days_in_month(year, month) {
        return None;
    }
    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }

    let mut nanos: i32 = 0;
    if p.peek() == Some(b'.') {
        p.pos += 1;
        let mut scale = 100_000_000i32;
        let mut seen = 0;
        while let Some(byte) = p.peek() {
            if !byte.is_ascii_digit() {
                break;
            }
            if seen >= 9 {
                return None;
            }
            nanos += (byte - b'0') as i32 * scale;
            scale /= 10;
            seen += 1;
            p.pos += 1;
        }
        if seen == 0 {
            return None;
        }
    }

    let offset_seconds: i64 = match p.peek()? {
        b'Z' | b'z' => {
            p.pos += 1;
            0
        }
        sign @ (b'+' | b'-') => {
            p.pos += 1;
            let oh = p.digits(2)?;
            p.literal(b':')?;
            let om = p.digits(2)?;
            if oh > 23 || om > 59 {
                return None;
            }
            let magnitude = (oh * 3600 + om * 60) as i64;
            if sign == b'+' {
                magnitude
            } else {
                -magnitude
            }
        }
        _ => return None,
    };
    if p.pos != p.input.len() {
        return None;
    }

    let days = days_from_civil(year, month, day);
    let seconds =
        days * SECONDS_PER_DAY + (hour * 3600 + minute * 60 + second) as i64 - offset_seconds;
    if !(TIMESTAMP_MIN_SECONDS..=TIMESTAMP_MAX_SECONDS).contains(&seconds) {
        return None;
    }
    Some((seconds, nanos))
}

/// Renders a Duration as a decimal-seconds string with `s` suffix,
/// e.g. `"1s"`, `"-3.000000001s"`.
pub fn format_duration(seconds: i64, nanos: i32) -> Result<String, SerializationError> {
    let valid_range = seconds.abs() <= DURATION_MAX_SECONDS && nanos.abs() < NANOS_PER_SECOND;
    let signs_agree = seconds == 0 || nanos == 0 || (seconds < 0) == (nanos < 0);
    if !valid_range || !signs_agree {
        return Err(SerializationError::DurationOutOfRange { seconds, nanos });
    }
    let mut out = String::with_capacity(22);
    if seconds < 0 || nanos < 0 {
        out.push('-');
    }
    push_padded(&mut out, seconds.unsigned_abs(), 1);
    push_fraction(&mut out, nanos.unsigned_abs());
    out.push('s');
    Ok(out)
}

/// Parses a duration string into `(seconds, nanos)`. The signs of both
/// components always agree. Returns `None` when malformed or beyond
/// ±10,000 years.
pub fn parse_duration(text: &str) -> Option<(i64, i32)> {
    let body = text.strip_suffix('s')?;
    let (negative, body) = match body.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    let (whole, fraction) = match body.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (body, ""),
    };
    if whole.is_empty() || whole.bytes().any(|b| !b.is_ascii_digit()) {
        return None;
    }
    if fraction.len() > 9 || (body.contains('.') && fraction.is_empty()) {
        return None;
    }
    let seconds: i64 = whole.parse().ok()?;
    let mut nanos: i32 = 0;
    let mut scale = 100_000_000i32;
    for byte in fraction.bytes() {
        if !byte.is_ascii_digit() {
            return None;
        }
        nanos += (byte - b'0') as i32 * scale;
        scale /= 10;
    }
    if seconds > DURATION_MAX_SECONDS {
        return None;
    }
    if negative {
        Some((-seconds, -nanos))
    } else {
        Some((seconds, nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp_epoch() {
        assert_eq!(format_timestamp(0, 0).unwrap(), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_format_timestamp_fraction_widths() {
        assert_eq!(
            format_timestamp(63_108_020, 21_000_000).unwrap(),
            "1972-01-01T10:00:20.021Z"
        );
        assert_eq!(
            format_timestamp(0, 21_000).unwrap(),
            "1970-01-01T00:00:00.000021Z"
        );
        assert_eq!(
            format_timestamp(0, 21).unwrap(),
            "1970-01-01T00:00:00.000000021Z"
        );
    }

    #[test]
    fn test_format_timestamp_range_ends() {
        assert_eq!(
            format_timestamp(TIMESTAMP_MIN_SECONDS, 0).unwrap(),
            "0001-01-01T00:00:00Z"
        );
        assert_eq!(
            format_timestamp(TIMESTAMP_MAX_SECONDS, 999_999_999).unwrap(),
            "9999-12-31T23:59:59.999999999Z"
        );
        assert!(format_timestamp(TIMESTAMP_MAX_SECONDS + 1, 0).is_err());
        assert!(format_timestamp(0, -1).is_err());
    }

    #[test]
    fn test_parse_timestamp_roundtrip() {
        for seconds in [TIMESTAMP_MIN_SECONDS, -1, 0, 951_782_400, TIMESTAMP_MAX_SECONDS] {
            for nanos in [0, 1, 999_999_999] {
                let text = format_timestamp(seconds, nanos).unwrap();
                assert_eq!(parse_timestamp(&text), Some((seconds, nanos)), "{text}");
            }
        }
    }

    #[test]
    fn test_parse_timestamp_offset_normalized() {
        assert_eq!(
            parse_timestamp("1970-01-01T01:00:00+01:00"),
            Some((0, 0))
        );
        assert_eq!(
            parse_timestamp("1969-12-31T19:00:00-05:00"),
            Some((0, 0))
        );
    }

    #[test]
    fn test_parse_timestamp_rejects_malformed() {
        for bad in [
            "1970-01-01 00:00:00Z",   // missing T
            "1970-01-01T00:00:00",    // missing offset
            "1970-02-30T00:00:00Z",   // no such day
            "1970-13-01T00:00:00Z",   // no such month
            "1970-01-01T24:00:00Z",   // hour out of range
            "1970-01-01T00:00:00.Z",  // empty fraction
            "1970-01-01T00:00:00.0000000001Z", // 10 fraction digits
            "1970-01-01T00:00:00Zx",  // trailing garbage
            "10000-01-01T00:00:00Z",  // beyond year 9999
        ] {
            assert_eq!(parse_timestamp(bad), None, "{bad}");
        }
    }

    #[test]
    fn test_leap_year_handling() {
        // 2000-02-29 exists (divisible by 400), 1900-02-29 does not.
        assert!(parse_timestamp("2000-02-29T00:00:00Z").is_some());
        assert!(parse_timestamp("1900-02-29T00:00:00Z").is_none());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(1, 0).unwrap(), "1s");
        assert_eq!(format_duration(0, 0).unwrap(), "0s");
        assert_eq!(format_duration(-3, -1).unwrap(), "-3.000000001s");
        assert_eq!(format_duration(0, 500_000_000).unwrap(), "0.500s");
    }

    #[test]
    fn test_format_duration_rejects_disagreeing_signs() {
        assert!(format_duration(1, -1).is_err());
        assert!(format_duration(DURATION_MAX_SECONDS + 1, 0).is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1s"), Some((1, 0)));
        assert_eq!(parse_duration("-3.000000001s"), Some((-3, -1)));
        assert_eq!(parse_duration("0.5s"), Some((0, 500_000_000)));
        assert_eq!(parse_duration("315576000000s"), Some((DURATION_MAX_SECONDS, 0)));
    }

    #[test]
    fn test_parse_duration_rejects_malformed() {
        for bad in ["1", "s", ".5s", "1.s", "1.0000000001s", "--1s", "1e3s", "315576000001s"] {
            assert_eq!(parse_duration(bad), None, "{bad}");
        }
    }

    #[test]
    fn test_wrapper_detection() {
        assert!(is_wrapper_type("google.protobuf.Int32Value"));
        assert!(is_wrapper_type("google.protobuf.BytesValue"));
        assert!(!is_wrapper_type("google.protobuf.Timestamp"));
        assert!(!is_wrapper_type("example.Int32Value"));
    }
}
