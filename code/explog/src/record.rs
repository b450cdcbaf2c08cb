/// Parser for experiment data lines.
///
/// Each data line records one request made by the load generator:
///
///   timestamp,key,latency,declared_server,observed_server,received/total
///
/// The timestamp and key are always present, as is the latency (in milliseconds, -1.0 if no
/// response arrived).  The trailing fields were added to the log format over time and may be
/// missing in older logs, so they are validated when the line is parsed but their absence is only
/// reported when they are asked for.
///
/// The server indices are positions in the roster of the log (see loader.rs); -1 means "unknown"
/// for the declared server and "the response was lost" for the observed server.  In the packet
/// counts a received count of -1 means all packets were lost and a total that is not positive means
/// the counts are unavailable.

use crate::errors::{LogError, Result};

use rustutils::{parse_timestamp, Timestamp};
use ustr::Ustr;

/// Latency value for a request that never got a response.

pub const LATENCY_LOST: f64 = -1.0;

/// Server index for "unknown" (declared) or "no response" (observed).

pub const LOST_SERVER_INDEX: i32 = -1;

// Field positions, and the number of fields needed to access each.
const TIMESTAMP_FIELD: usize = 0;
const KEY_FIELD: usize = 1;
const LATENCY_FIELD: usize = 2;
const DECLARED_SERVER_FIELD: usize = 3;
const OBSERVED_SERVER_FIELD: usize = 4;
const PACKETS_FIELD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketCounts {
    pub received: i32,
    pub total: i32,
}

impl PacketCounts {
    /// False iff every packet of the response was lost.

    pub fn has_packets(&self) -> bool {
        self.received != -1
    }

    /// The number of lost packets, when both counts are known.

    pub fn lost(&self) -> Option<i32> {
        if self.total > 0 && self.received >= 0 {
            Some(self.total - self.received)
        } else {
            None
        }
    }
}

/// The Request is immutable once parsed.  It is small and Copy; the key is interned since the
/// number of distinct keys is tiny compared to the number of requests.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Request {
    timestamp: Timestamp,
    key: Ustr,
    latency_ms: f64,
    declared_server: Option<i32>,
    observed_server: Option<i32>,
    packets: Option<PacketCounts>,
    num_fields: usize,
}

impl Request {
    /// Parse a data line.  This fails if there are fewer than three fields or if any field that is
    /// present is not well-formed.  Fields beyond the sixth are ignored.

    pub fn parse(line: &str) -> Result<Request> {
        let fields = line.split(',').collect::<Vec<&str>>();
        if fields.len() <= LATENCY_FIELD {
            return Err(malformed("latency", LATENCY_FIELD, fields.len()));
        }
        let timestamp = parse_timestamp(fields[TIMESTAMP_FIELD].trim())
            .map_err(|_| LogError::InvalidTimestamp(fields[TIMESTAMP_FIELD].to_string()))?;
        let key = Ustr::from(fields[KEY_FIELD]);
        let latency_ms = parse_f64("latency", fields[LATENCY_FIELD])?;
        let declared_server = fields
            .get(DECLARED_SERVER_FIELD)
            .map(|s| parse_i32("declared server index", s))
            .transpose()?;
        let observed_server = fields
            .get(OBSERVED_SERVER_FIELD)
            .map(|s| parse_i32("observed server index", s))
            .transpose()?;
        let packets = fields
            .get(PACKETS_FIELD)
            .map(|s| parse_packet_counts(s))
            .transpose()?;
        Ok(Request {
            timestamp,
            key,
            latency_ms,
            declared_server,
            observed_server,
            packets,
            num_fields: fields.len(),
        })
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn key(&self) -> Ustr {
        self.key
    }

    /// The latency in milliseconds, or a negative number if there was no response.

    pub fn latency_ms(&self) -> f64 {
        self.latency_ms
    }

    pub fn is_latency_lost(&self) -> bool {
        self.latency_ms < 0.0
    }

    /// The server the client sent the request to, -1 if unknown.

    pub fn declared_server_index(&self) -> Result<i32> {
        self.declared_server
            .ok_or_else(|| malformed("declared server index", DECLARED_SERVER_FIELD, self.num_fields))
    }

    /// The server that responded, -1 if the response was lost.

    pub fn observed_server_index(&self) -> Result<i32> {
        self.observed_server
            .ok_or_else(|| malformed("observed server index", OBSERVED_SERVER_FIELD, self.num_fields))
    }

    pub fn packet_counts(&self) -> Result<PacketCounts> {
        self.packets
            .ok_or_else(|| malformed("packet counts", PACKETS_FIELD, self.num_fields))
    }

    pub fn has_packets(&self) -> Result<bool> {
        Ok(self.packet_counts()?.has_packets())
    }

    /// The number of packets lost, or None if that can't be known.

    pub fn packets_lost(&self) -> Result<Option<i32>> {
        Ok(self.packet_counts()?.lost())
    }

    /// True if the request lost its response entirely, in which case the packet counts are not
    /// consulted, or if all its packets were lost.

    pub fn has_packet_loss(&self) -> Result<bool> {
        if self.is_latency_lost() {
            return Ok(true);
        }
        Ok(!self.has_packets()?)
    }
}

fn malformed(field: &'static str, position: usize, found: usize) -> LogError {
    LogError::MalformedRecord {
        field,
        needed: position + 1,
        found,
    }
}

fn parse_f64(field: &'static str, s: &str) -> Result<f64> {
    match s.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(LogError::InvalidField {
            field,
            text: s.to_string(),
        }),
    }
}

fn parse_i32(field: &'static str, s: &str) -> Result<i32> {
    s.trim().parse::<i32>().map_err(|_| LogError::InvalidField {
        field,
        text: s.to_string(),
    })
}

fn parse_packet_counts(s: &str) -> Result<PacketCounts> {
    let Some((received, total)) = s.split_once('/') else {
        return Err(LogError::InvalidField {
            field: "packet counts",
            text: s.to_string(),
        });
    };
    Ok(PacketCounts {
        received: parse_i32("received packet count", received)?,
        total: parse_i32("total packet count", total)?,
    })
}

#[cfg(test)]
use chrono::NaiveTime;

#[test]
fn test_parse_full() {
    let r = Request::parse("13:4:22:817,key17,0.532,2,2,3/3").unwrap();
    assert!(r.timestamp() == NaiveTime::from_hms_milli_opt(13, 4, 22, 817).unwrap());
    assert!(r.key().as_str() == "key17");
    assert!(r.latency_ms() == 0.532);
    assert!(r.declared_server_index().unwrap() == 2);
    assert!(r.observed_server_index().unwrap() == 2);
    assert!(r.packet_counts().unwrap() == PacketCounts { received: 3, total: 3 });
    assert!(r.has_packets().unwrap());
    assert!(r.packets_lost().unwrap() == Some(0));
    assert!(!r.has_packet_loss().unwrap());
}

#[test]
fn test_parse_lossy() {
    let r = Request::parse("13:4:22:817,key17,-1.0,1,-1,-1/3").unwrap();
    assert!(r.is_latency_lost());
    assert!(r.observed_server_index().unwrap() == LOST_SERVER_INDEX);
    assert!(!r.has_packets().unwrap());
    assert!(r.packets_lost().unwrap().is_none());
    assert!(r.has_packet_loss().unwrap());

    let r = Request::parse("13:4:22:817,key17,2.5,1,1,1/4").unwrap();
    assert!(r.packets_lost().unwrap() == Some(3));
    assert!(!r.has_packet_loss().unwrap());

    // Counts unavailable
    let r = Request::parse("13:4:22:817,key17,2.5,1,1,2/0").unwrap();
    assert!(r.packets_lost().unwrap().is_none());
    assert!(r.has_packets().unwrap());
}

#[test]
fn test_parse_short() {
    match Request::parse("13:4:22:817,key17") {
        Err(LogError::MalformedRecord { found: 2, .. }) => {}
        _ => panic!("Expected MalformedRecord"),
    }

    let r = Request::parse("13:4:22:817,key17,0.5,1").unwrap();
    assert!(r.declared_server_index().unwrap() == 1);
    match r.observed_server_index() {
        Err(LogError::MalformedRecord { needed: 5, found: 4, .. }) => {}
        _ => panic!("Expected MalformedRecord"),
    }
    assert!(matches!(r.packet_counts(), Err(LogError::MalformedRecord { needed: 6, .. })));

    // Latency loss is known without the packet counts
    let r = Request::parse("13:4:22:817,key17,-1.0,1,-1").unwrap();
    assert!(r.has_packet_loss().unwrap());
    let r = Request::parse("13:4:22:817,key17,1.0,1,1").unwrap();
    assert!(r.has_packet_loss().is_err());
}

#[test]
fn test_parse_invalid() {
    assert!(matches!(
        Request::parse("13:4:22,key17,0.5,1,1,1/1"),
        Err(LogError::InvalidTimestamp(_))
    ));
    assert!(matches!(
        Request::parse("13:4:22:1,key17,fast,1,1,1/1"),
        Err(LogError::InvalidField { field: "latency", .. })
    ));
    assert!(matches!(
        Request::parse("13:4:22:1,key17,0.5,one,1,1/1"),
        Err(LogError::InvalidField { .. })
    ));
    assert!(matches!(
        Request::parse("13:4:22:1,key17,0.5,1,1,11"),
        Err(LogError::InvalidField { field: "packet counts", .. })
    ));
    assert!(matches!(
        Request::parse("13:4:22:1,key17,0.5,1,1,1/x"),
        Err(LogError::InvalidField { .. })
    ));
}
