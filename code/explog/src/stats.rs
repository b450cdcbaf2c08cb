/// Summary statistics for request buckets.

use crate::errors::Result;
use crate::partition::ServerBuckets;
use crate::record::Request;

use rustutils::elapsed_seconds;

pub fn request_counts(buckets: &ServerBuckets) -> Vec<usize> {
    buckets.iter().map(|b| b.len()).collect()
}

/// The number of requests in each bucket whose response had packets.

pub fn successful_request_counts(buckets: &ServerBuckets) -> Result<Vec<usize>> {
    buckets
        .iter()
        .map(|b| {
            b.iter()
                .try_fold(0usize, |n, r| -> Result<usize> {
                    Ok(if r.has_packets()? { n + 1 } else { n })
                })
        })
        .collect()
}

/// Each bucket's share of all the requests, in percent.  All zero if there are no requests.

pub fn request_shares(buckets: &ServerBuckets) -> Vec<f64> {
    let total = buckets.iter().map(|b| b.len()).sum::<usize>();
    buckets
        .iter()
        .map(|b| {
            if total == 0 {
                0.0
            } else {
                b.len() as f64 / total as f64 * 100.0
            }
        })
        .collect()
}

/// The average of the latencies of the requests that got a response, None if none did.

pub fn average_latency(records: &[Request]) -> Option<f64> {
    let (sum, n) = records
        .iter()
        .filter(|r| !r.is_latency_lost())
        .fold((0.0, 0usize), |(sum, n), r| (sum + r.latency_ms(), n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Lost and total packets, over the requests where both are known.

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PacketTotals {
    pub lost: i64,
    pub total: i64,
}

impl PacketTotals {
    pub fn loss_pct(&self) -> Option<f64> {
        if self.total > 0 {
            Some(self.lost as f64 / self.total as f64 * 100.0)
        } else {
            None
        }
    }

    pub fn add(&self, other: &PacketTotals) -> PacketTotals {
        PacketTotals {
            lost: self.lost + other.lost,
            total: self.total + other.total,
        }
    }
}

/// A request that lost its whole response (received -1) has no known loss count and contributes
/// neither lost nor total packets, so the per-server and overall totals agree.

pub fn packet_totals(records: &[Request]) -> Result<PacketTotals> {
    let mut totals = PacketTotals::default();
    for r in records {
        let counts = r.packet_counts()?;
        if let Some(lost) = counts.lost() {
            totals.lost += lost as i64;
            totals.total += counts.total as i64;
        }
    }
    Ok(totals)
}

/// The duration of the experiment in whole seconds, from the first to the last request, wrapping
/// around midnight.  None if there are no requests.

pub fn experiment_duration(records: &[Request]) -> Option<i64> {
    match (records.first(), records.last()) {
        (Some(first), Some(last)) => Some(elapsed_seconds(first.timestamp(), last.timestamp())),
        _ => None,
    }
}

/// Throughput in Mbit/s of `requests` objects of `object_size` bytes over `duration` seconds.

pub fn mbit_per_second(requests: usize, duration: u64, object_size: u64) -> f64 {
    requests as f64 * object_size as f64 * 8.0 / 1_000_000.0 / duration as f64
}

pub fn requests_per_second(requests: usize, duration: u64) -> f64 {
    requests as f64 / duration as f64
}

#[cfg(test)]
use crate::partition::{partition, ServerPolicy};

#[cfg(test)]
fn single_buckets() -> (Vec<Request>, ServerBuckets) {
    let rs = crate::loader::load("../tests/explog/single.txt").unwrap().requests().unwrap();
    let buckets = partition(&rs, 3, ServerPolicy::Declared, false).unwrap();
    (rs, buckets)
}

#[test]
fn test_counts_and_shares() {
    let (_, buckets) = single_buckets();
    assert!(request_counts(&buckets) == vec![4, 2, 2]);
    assert!(successful_request_counts(&buckets).unwrap() == vec![3, 2, 2]);
    assert!(request_shares(&buckets) == vec![50.0, 25.0, 25.0]);
    assert!(request_shares(&vec![vec![], vec![]]) == vec![0.0, 0.0]);
}

#[test]
fn test_average_latency() {
    let (_, buckets) = single_buckets();
    assert!((average_latency(&buckets[0]).unwrap() - 0.25).abs() < 1e-9);
    assert!((average_latency(&buckets[1]).unwrap() - 0.8).abs() < 1e-9);
    assert!(average_latency(&[]).is_none());
    let lost = Request::parse("1:0:0:0,k,-1.0,0,-1,-1/1").unwrap();
    assert!(average_latency(&[lost]).is_none());
}

#[test]
fn test_packet_totals() {
    let (_, buckets) = single_buckets();
    // The lost request on server 0 is not counted
    assert!(packet_totals(&buckets[0]).unwrap() == PacketTotals { lost: 0, total: 6 });
    let t2 = packet_totals(&buckets[2]).unwrap();
    assert!(t2 == PacketTotals { lost: 1, total: 4 });
    assert!(t2.loss_pct() == Some(25.0));
    assert!(PacketTotals::default().loss_pct().is_none());
    assert!(t2.add(&t2) == PacketTotals { lost: 2, total: 8 });

    let rs = ["1:0:0:0,k,-1.0,0,-1,-1/3", "1:0:0:1,k,0.2,0,0,1/2"]
        .iter()
        .map(|l| Request::parse(l).unwrap())
        .collect::<Vec<Request>>();
    assert!(packet_totals(&rs).unwrap() == PacketTotals { lost: 1, total: 2 });
}

#[test]
fn test_duration_and_rates() {
    let (rs, _) = single_buckets();
    assert!(experiment_duration(&rs) == Some(4));
    assert!(experiment_duration(&[]).is_none());

    let merged = crate::loader::load("../tests/explog/merge-*.txt").unwrap().requests().unwrap();
    assert!(experiment_duration(&merged) == Some(4));

    assert!(mbit_per_second(1000, 4, 1000) == 2.0);
    assert!(requests_per_second(8, 4) == 2.0);
}
