/// Bucket requests by the server that handled them.
///
/// A request can be attributed to the server the client declared it was sending to, or to the
/// server that was observed to respond.  When the observed server is unknown because the response
/// was lost, the declared server stands in.

use crate::errors::{LogError, Result};
use crate::record::{Request, LOST_SERVER_INDEX};

use tracing::debug;
use ustr::Ustr;

/// When a key only ever appears in requests with a lost response, but does so more than this many
/// times, the declared server of the last such request is taken to be the key's server.

pub const LOSS_FALLBACK_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPolicy {
    /// The server the client sent the request to.
    Declared,

    /// The server that responded to the request.
    Observed,
}

impl ServerPolicy {
    pub fn new(according_to_response: bool) -> ServerPolicy {
        if according_to_response {
            ServerPolicy::Observed
        } else {
            ServerPolicy::Declared
        }
    }

    // The raw index for the policy, without any fallback.
    fn raw_index(self, r: &Request) -> Result<i32> {
        match self {
            ServerPolicy::Declared => r.declared_server_index(),
            ServerPolicy::Observed => r.observed_server_index(),
        }
    }
}

/// Request buckets, indexed by server.

pub type ServerBuckets = Vec<Vec<Request>>;

/// The server index for `r` under `policy`, falling back to the declared index when the observed
/// one is lost.  The result may still be -1 if the declared index is unknown.

pub fn resolve_server_index(r: &Request, policy: ServerPolicy) -> Result<i32> {
    let index = policy.raw_index(r)?;
    if index == LOST_SERVER_INDEX && policy == ServerPolicy::Observed {
        r.declared_server_index()
    } else {
        Ok(index)
    }
}

/// Split `records` into `server_count` buckets, preserving the record order within each bucket.
/// With `drop_on_loss`, records with packet loss are left out.  Every other record must resolve to
/// a server in range.

pub fn partition(
    records: &[Request],
    server_count: usize,
    policy: ServerPolicy,
    drop_on_loss: bool,
) -> Result<ServerBuckets> {
    let mut buckets = vec![vec![]; server_count];
    let mut dropped = 0usize;
    for r in records {
        if drop_on_loss && r.has_packet_loss()? {
            dropped += 1;
            continue;
        }
        let index = checked_index(resolve_server_index(r, policy)?, server_count)?;
        buckets[index].push(*r);
    }
    debug!(?policy, server_count, dropped, "partitioned {} records", records.len());
    Ok(buckets)
}

/// Find the server that serves `key`: the first non-lost index under `policy` among the requests
/// for the key.  If there is no such request, fall back to the declared server of the last lost
/// request.  More than LOSS_FALLBACK_THRESHOLD lost requests is logged.
///
/// Unlike `resolve_server_index` the observed policy does not fall back per request.

pub fn server_index_for_key(records: &[Request], key: Ustr, policy: ServerPolicy) -> Result<i32> {
    let mut lost = 0usize;
    let mut last_declared = LOST_SERVER_INDEX;
    for r in records.iter().filter(|r| r.key() == key) {
        let index = policy.raw_index(r)?;
        if index != LOST_SERVER_INDEX {
            return Ok(index);
        }
        lost += 1;
        last_declared = r.declared_server_index()?;
    }
    if lost == 0 {
        return Err(LogError::KeyNotFound(key.to_string()));
    }
    if lost > LOSS_FALLBACK_THRESHOLD {
        debug!(key = key.as_str(), lost, last_declared, "key resolved by loss fallback");
    }
    Ok(last_declared)
}

/// Convert a server index to a bucket index, or fail if it is out of range.

pub fn checked_index(index: i32, server_count: usize) -> Result<usize> {
    match usize::try_from(index) {
        Ok(i) if i < server_count => Ok(i),
        _ => Err(LogError::OutOfRangeServerIndex {
            index: index as i64,
            servers: server_count,
        }),
    }
}

#[cfg(test)]
fn read_requests(file: &str) -> Vec<Request> {
    crate::loader::load(file).unwrap().requests().unwrap()
}

#[cfg(test)]
fn parse_all(lines: &[&str]) -> Vec<Request> {
    lines.iter().map(|l| Request::parse(l).unwrap()).collect()
}

#[test]
fn test_partition_declared() {
    let rs = read_requests("../tests/explog/single.txt");
    let buckets = partition(&rs, 3, ServerPolicy::Declared, false).unwrap();
    assert!(buckets.iter().map(|b| b.len()).collect::<Vec<usize>>() == vec![4, 2, 2]);
    assert!(buckets.iter().map(|b| b.len()).sum::<usize>() == rs.len());
    // Order within a bucket is record order
    assert!(buckets[1][0].key().as_str() == "beta");
    assert!(buckets[1][1].latency_ms() == 1.25);

    let buckets = partition(&rs, 3, ServerPolicy::Declared, true).unwrap();
    assert!(buckets.iter().map(|b| b.len()).collect::<Vec<usize>>() == vec![3, 2, 2]);
}

#[test]
fn test_partition_observed() {
    let rs = read_requests("../tests/explog/single.txt");
    // The lost alpha request falls back to its declared server, the second beta request was
    // answered by server 2.
    let buckets = partition(&rs, 3, ServerPolicy::Observed, false).unwrap();
    assert!(buckets.iter().map(|b| b.len()).collect::<Vec<usize>>() == vec![4, 1, 3]);

    let rs = parse_all(&["1:0:0:0,k,-1.0,2,-1,-1/1"]);
    assert!(resolve_server_index(&rs[0], ServerPolicy::Observed).unwrap() == 2);
    let buckets = partition(&rs, 3, ServerPolicy::Observed, false).unwrap();
    assert!(buckets[2].len() == 1);
}

#[test]
fn test_partition_out_of_range() {
    let rs = parse_all(&["1:0:0:0,k,0.1,3,3,1/1"]);
    assert!(matches!(
        partition(&rs, 3, ServerPolicy::Declared, false),
        Err(LogError::OutOfRangeServerIndex { index: 3, servers: 3 })
    ));
    let rs = parse_all(&["1:0:0:0,k,-1.0,-1,-1,-1/1"]);
    assert!(matches!(
        partition(&rs, 3, ServerPolicy::Observed, false),
        Err(LogError::OutOfRangeServerIndex { index: -1, .. })
    ));
    // But that one is dropped if lossy records are
    let buckets = partition(&rs, 3, ServerPolicy::Observed, true).unwrap();
    assert!(buckets.iter().all(|b| b.is_empty()));
}

#[test]
fn test_server_index_for_key() {
    let rs = read_requests("../tests/explog/single.txt");
    assert!(server_index_for_key(&rs, Ustr::from("alpha"), ServerPolicy::Observed).unwrap() == 0);
    assert!(server_index_for_key(&rs, Ustr::from("gamma"), ServerPolicy::Declared).unwrap() == 2);
    assert!(matches!(
        server_index_for_key(&rs, Ustr::from("delta"), ServerPolicy::Declared),
        Err(LogError::KeyNotFound(_))
    ));
}

#[test]
fn test_server_index_for_lost_key() {
    // A few lost requests resolve to the declared server, as in partition()
    let mut lines = vec!["1:0:0:0,k,-1.0,1,-1,-1/1"; 3];
    let rs = parse_all(&lines);
    assert!(server_index_for_key(&rs, Ustr::from("k"), ServerPolicy::Observed).unwrap() == 1);
    let buckets = partition(&rs, 2, ServerPolicy::Observed, false).unwrap();
    assert!(buckets[1].len() == 3);

    lines.extend(["1:0:0:0,k,-1.0,1,-1,-1/1"; 2]);
    let rs = parse_all(&lines);
    assert!(server_index_for_key(&rs, Ustr::from("k"), ServerPolicy::Observed).unwrap() == 1);

    lines.push("1:0:0:1,k,-1.0,2,-1,-1/1");
    let rs = parse_all(&lines);
    assert!(server_index_for_key(&rs, Ustr::from("k"), ServerPolicy::Observed).unwrap() == 2);

    // A responding request wins no matter how many lost ones precede it
    lines.push("1:0:0:2,k,0.5,1,0,1/1");
    let rs = parse_all(&lines);
    assert!(server_index_for_key(&rs, Ustr::from("k"), ServerPolicy::Observed).unwrap() == 0);
}
