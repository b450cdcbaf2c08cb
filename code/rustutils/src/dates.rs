/// Timestamps in experiment logs.
///
/// The load generator stamps every request with the wall-clock time at which it was sent, in the
/// form `H:M:S:F`.  The hour, minute and second have one or two digits and no zero padding; F is
/// the fraction of the second written without a decimal point, so `12:5:7:801` is 12:05:07.801.
/// There is no date, hence the times are naive and durations computed from them wrap around
/// midnight.

use anyhow::{bail, Result};
use chrono::NaiveTime;

pub type Timestamp = NaiveTime;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Parse an `H:M:S:F` timestamp.  The fraction can have from one to nine digits.

pub fn parse_timestamp(s: &str) -> Result<Timestamp> {
    let parts = s.split(':').collect::<Vec<&str>>();
    if parts.len() != 4 {
        bail!("Expected four ':'-separated parts in timestamp");
    }
    let hour = get_clock_part(parts[0], 23)?;
    let minute = get_clock_part(parts[1], 59)?;
    let second = get_clock_part(parts[2], 59)?;
    let frac = parts[3];
    if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|c| c.is_ascii_digit()) {
        bail!("Bad fractional second in timestamp");
    }
    let nanos = frac.parse::<u32>()? * 10u32.pow(9 - frac.len() as u32);
    match NaiveTime::from_hms_nano_opt(hour, minute, second, nanos) {
        Some(t) => Ok(t),
        None => bail!("Timestamp out of range"),
    }
}

fn get_clock_part(s: &str, max: u32) -> Result<u32> {
    if s.is_empty() || s.len() > 2 || !s.bytes().all(|c| c.is_ascii_digit()) {
        bail!("Bad clock field in timestamp");
    }
    let n = s.parse::<u32>()?;
    if n > max {
        bail!("Clock field out of range in timestamp");
    }
    Ok(n)
}

/// The number of whole seconds from `from` to `to`.  If `to` is earlier than `from` then the
/// interval is taken to span midnight.

pub fn elapsed_seconds(from: Timestamp, to: Timestamp) -> i64 {
    let mut millis = to.signed_duration_since(from).num_milliseconds();
    if millis < 0 {
        millis += MILLIS_PER_DAY;
    }
    millis / 1000
}

#[test]
fn test_parse_timestamp() {
    let t = parse_timestamp("12:5:7:801").unwrap();
    assert!(t == NaiveTime::from_hms_milli_opt(12, 5, 7, 801).unwrap());

    let t = parse_timestamp("0:00:59:5").unwrap();
    assert!(t == NaiveTime::from_hms_milli_opt(0, 0, 59, 500).unwrap());

    let t = parse_timestamp("23:59:59:000000001").unwrap();
    assert!(t == NaiveTime::from_hms_nano_opt(23, 59, 59, 1).unwrap());
}

#[test]
fn test_parse_timestamp_errors() {
    assert!(parse_timestamp("12:5:7").is_err());
    assert!(parse_timestamp("12:5:7:8:9").is_err());
    assert!(parse_timestamp("24:0:0:0").is_err());
    assert!(parse_timestamp("12:60:0:0").is_err());
    assert!(parse_timestamp("12:5:7:").is_err());
    assert!(parse_timestamp("12:5:x:1").is_err());
    assert!(parse_timestamp("123:5:7:1").is_err());
    assert!(parse_timestamp("12:5:7:1234567890").is_err());
    assert!(parse_timestamp("").is_err());
}

#[test]
fn test_elapsed_seconds() {
    let a = parse_timestamp("10:0:0:0").unwrap();
    let b = parse_timestamp("10:1:30:999").unwrap();
    assert!(elapsed_seconds(a, b) == 90);
    assert!(elapsed_seconds(a, a) == 0);

    // Across midnight
    let c = parse_timestamp("23:59:50:0").unwrap();
    let d = parse_timestamp("0:0:10:0").unwrap();
    assert!(elapsed_seconds(c, d) == 20);
}
