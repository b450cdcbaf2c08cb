/// Cumulative distributions of latency and packet loss.
///
/// A distribution is a sequence of points (x, cumulative percentage), ordered by x, where the
/// percentage is of all valid values that are at most x (for integer data) or below x (for
/// bucketed data).  The last point is always at 100.  Values that are not valid - negative
/// latencies, which signal a lost response, and non-positive loss counts - are left out of both
/// the buckets and the denominator.

use crate::errors::{LogError, Result};
use crate::partition::ServerBuckets;
use crate::record::Request;

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CdfPoint {
    pub x: f64,
    pub cumulative_pct: f64,
}

/// Bucket the non-negative `values` into half-open buckets [k*w, (k+1)*w) and return the CDF over
/// the buckets that have values, where x is the upper bound of the bucket.  The width must be
/// positive and finite.

pub fn histogram(values: &[f64], bucket_width: f64) -> Result<Vec<CdfPoint>> {
    if !bucket_width.is_finite() || bucket_width <= 0.0 {
        return Err(LogError::InvalidBucketWidth(bucket_width));
    }
    let mut counts = BTreeMap::<u64, usize>::new();
    let mut valid = 0usize;
    for v in values.iter().copied().filter(|v| *v >= 0.0) {
        *counts.entry(bucket_index(v, bucket_width)).or_insert(0) += 1;
        valid += 1;
    }
    Ok(accumulate(
        counts
            .into_iter()
            .map(|(k, n)| ((k as f64 + 1.0) * bucket_width, n)),
        valid,
    ))
}

// Values within this fraction of a bucket below a boundary are taken to be on the boundary, so
// that eg 0.3 lands in [0.3,0.4) with a width of 0.1.
const BOUNDARY_SLACK: f64 = 1e-9;

// Saturates at u64::MAX for values far beyond the width.
fn bucket_index(v: f64, w: f64) -> u64 {
    (v / w + BOUNDARY_SLACK).floor() as u64
}

/// The CDF of integer values where every distinct positive value is its own point.

pub fn int_cdf(values: &[i64]) -> Vec<CdfPoint> {
    let mut counts = BTreeMap::<i64, usize>::new();
    for v in values.iter().copied().filter(|v| *v > 0) {
        *counts.entry(v).or_insert(0) += 1;
    }
    let valid = counts.values().sum::<usize>();
    accumulate(counts.into_iter().map(|(v, n)| (v as f64, n)), valid)
}

fn accumulate(counts: impl Iterator<Item = (f64, usize)>, valid: usize) -> Vec<CdfPoint> {
    if valid == 0 {
        return vec![];
    }
    let mut running = 0usize;
    counts
        .map(|(x, n)| {
            running += n;
            CdfPoint {
                x,
                cumulative_pct: running as f64 / valid as f64 * 100.0,
            }
        })
        .collect()
}

/// The latency CDF of a set of requests.

pub fn latency_cdf(records: &[Request], bucket_width: f64) -> Result<Vec<CdfPoint>> {
    histogram(
        &records.iter().map(|r| r.latency_ms()).collect::<Vec<f64>>(),
        bucket_width,
    )
}

pub fn latency_cdf_per_server(
    buckets: &ServerBuckets,
    bucket_width: f64,
) -> Result<Vec<Vec<CdfPoint>>> {
    buckets
        .iter()
        .map(|b| latency_cdf(b, bucket_width))
        .collect()
}

/// The number of packets lost by each request, -1 where that is not known.

pub fn packet_loss_per_request(records: &[Request]) -> Result<Vec<i64>> {
    records
        .iter()
        .map(|r| Ok(r.packets_lost()?.map(i64::from).unwrap_or(-1)))
        .collect()
}

/// The CDF of the number of packets lost per request, among requests that lost packets.

pub fn packet_loss_cdf(records: &[Request]) -> Result<Vec<CdfPoint>> {
    Ok(int_cdf(&packet_loss_per_request(records)?))
}

pub fn packet_loss_cdf_per_server(buckets: &ServerBuckets) -> Result<Vec<Vec<CdfPoint>>> {
    buckets.iter().map(|b| packet_loss_cdf(b)).collect()
}

#[cfg(test)]
fn assert_cdf(cdf: &[CdfPoint], expect: &[(f64, f64)]) {
    assert!(cdf.len() == expect.len(), "{:?}", cdf);
    for (p, (x, pct)) in cdf.iter().zip(expect) {
        assert!((p.x - x).abs() < 1e-9, "{:?}", cdf);
        assert!((p.cumulative_pct - pct).abs() < 1e-9, "{:?}", cdf);
    }
}

#[test]
fn test_histogram() {
    let cdf = histogram(&[0.05, 0.15, 0.12, -1.0, 0.35], 0.1).unwrap();
    assert_cdf(&cdf, &[(0.1, 25.0), (0.2, 75.0), (0.4, 100.0)]);

    // Boundary values go in the bucket above
    let cdf = histogram(&[0.3, 0.7, 0.0], 0.1).unwrap();
    assert_cdf(&cdf, &[(0.1, 100.0 / 3.0), (0.4, 200.0 / 3.0), (0.8, 100.0)]);

    let cdf = histogram(&[2.0, 5.0, 5.5, 9.99], 5.0).unwrap();
    assert_cdf(&cdf, &[(5.0, 25.0), (10.0, 100.0)]);
}

#[test]
fn test_histogram_monotone() {
    let values = (0..1000).map(|i| ((i * 7919) % 1000) as f64 / 313.0).collect::<Vec<f64>>();
    let cdf = histogram(&values, 0.1).unwrap();
    assert!(cdf.windows(2).all(|w| w[0].x < w[1].x && w[0].cumulative_pct <= w[1].cumulative_pct));
    assert!((cdf.last().unwrap().cumulative_pct - 100.0).abs() < 1e-9);
}

#[test]
fn test_histogram_edge_cases() {
    assert!(histogram(&[], 0.1).unwrap().is_empty());
    assert!(histogram(&[-1.0, -1.0], 0.1).unwrap().is_empty());
    assert!(matches!(histogram(&[1.0], 0.0), Err(LogError::InvalidBucketWidth(_))));

    // A huge latency lands in the last bucket without overflowing the bound
    let cdf = histogram(&[1.0e20, 0.5], 0.1).unwrap();
    assert!(cdf.len() == 2);
    assert!((cdf[0].x - 0.6).abs() < 1e-9 && (cdf[0].cumulative_pct - 50.0).abs() < 1e-9);
    assert!(cdf[1].x > 1.0e17 && (cdf[1].cumulative_pct - 100.0).abs() < 1e-9);
    assert!(histogram(&[1.0, 2.0], 1.0e-300).unwrap().len() == 1);
    assert!(matches!(histogram(&[1.0], -0.1), Err(LogError::InvalidBucketWidth(_))));
    assert!(matches!(histogram(&[1.0], f64::NAN), Err(LogError::InvalidBucketWidth(_))));
    assert!(matches!(histogram(&[1.0], f64::INFINITY), Err(LogError::InvalidBucketWidth(_))));
}

#[test]
fn test_int_cdf() {
    let cdf = int_cdf(&[0, 2, -1, 1, 2, 5, 0]);
    assert_cdf(&cdf, &[(1.0, 25.0), (2.0, 75.0), (5.0, 100.0)]);
    assert!(int_cdf(&[0, -1, 0]).is_empty());
}

#[test]
fn test_per_server() {
    let rs = crate::loader::load("../tests/explog/single.txt").unwrap().requests().unwrap();
    let buckets = crate::partition::partition(&rs, 3, crate::ServerPolicy::Declared, false).unwrap();

    // Server 0 has latencies 0.25, -1.0, 0.05, 0.45
    let cdfs = latency_cdf_per_server(&buckets, 0.1).unwrap();
    assert!(cdfs.len() == 3);
    assert_cdf(&cdfs[0], &[(0.1, 100.0 / 3.0), (0.3, 200.0 / 3.0), (0.5, 100.0)]);

    // Only server 2 has a request that lost some but not all packets
    assert!(packet_loss_per_request(&buckets[0]).unwrap() == vec![0, -1, 0, 0]);
    let cdfs = packet_loss_cdf_per_server(&buckets).unwrap();
    assert!(cdfs[0].is_empty());
    assert!(cdfs[1].is_empty());
    assert_cdf(&cdfs[2], &[(1.0, 100.0)]);
}
