// Greedy placement of hot keys.
//
// Given the number of requests each server handled and the hot keys with their request counts and
// current servers, compute a new server for every hot key.  The hot keys' requests are first taken
// off their current servers, then the keys are placed one at a time, in the order given, on the
// server with the lowest load at that point, ties going to the lowest server index.  The load of
// the chosen server goes up by the key's count before the next key is placed.
//
// The result is not optimal, but it is deterministic given the order of the hot keys.

use explog::{checked_index, server_index_for_key, LogError, Request, ServerPolicy};
use tracing::debug;
use ustr::Ustr;

/// A hot key and the server currently serving it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotKeyPlacement {
    pub key: Ustr,
    pub count: usize,
    pub current: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reassignment {
    pub key: Ustr,
    pub count: usize,
    pub current: usize,
    pub target: usize,
}

impl Reassignment {
    pub fn moves(&self) -> bool {
        self.current != self.target
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalancePlan {
    /// One entry per hot key, in hot key order.
    pub assignments: Vec<Reassignment>,

    /// The load of each server once the hot keys have been placed.
    pub projected_loads: Vec<i64>,
}

/// Find the current server of every hot key.

pub fn place_hot_keys(
    records: &[Request],
    hot_keys: &[(Ustr, usize)],
    server_count: usize,
    policy: ServerPolicy,
) -> explog::Result<Vec<HotKeyPlacement>> {
    hot_keys
        .iter()
        .map(|&(key, count)| {
            let index = server_index_for_key(records, key, policy)?;
            Ok(HotKeyPlacement {
                key,
                count,
                current: checked_index(index, server_count)?,
            })
        })
        .collect()
}

/// Compute the plan.  `current_loads` is not changed.  A hot key whose current server is not
/// among the loads is an error.

pub fn rebalance(
    current_loads: &[usize],
    hot_keys: &[HotKeyPlacement],
) -> explog::Result<RebalancePlan> {
    let mut residual = current_loads.iter().map(|&n| n as i64).collect::<Vec<i64>>();
    for hk in hot_keys {
        if hk.current >= residual.len() {
            return Err(LogError::OutOfRangeServerIndex {
                index: hk.current as i64,
                servers: residual.len(),
            });
        }
        residual[hk.current] -= hk.count as i64;
    }
    debug!(?residual, "loads without hot keys");

    let (assignments, projected_loads) = hot_keys.iter().try_fold(
        (Vec::with_capacity(hot_keys.len()), residual),
        |(mut assignments, mut loads), hk| {
            let target = least_loaded(&loads).ok_or(LogError::OutOfRangeServerIndex {
                index: hk.current as i64,
                servers: 0,
            })?;
            loads[target] += hk.count as i64;
            debug!(key = hk.key.as_str(), count = hk.count, current = hk.current, target, "placed");
            assignments.push(Reassignment {
                key: hk.key,
                count: hk.count,
                current: hk.current,
                target,
            });
            Ok::<_, LogError>((assignments, loads))
        },
    )?;

    Ok(RebalancePlan {
        assignments,
        projected_loads,
    })
}

// The index of the first minimum.
fn least_loaded(loads: &[i64]) -> Option<usize> {
    loads
        .iter()
        .enumerate()
        .min_by_key(|(_, load)| **load)
        .map(|(i, _)| i)
}

#[cfg(test)]
fn hot(key: &str, count: usize, current: usize) -> HotKeyPlacement {
    HotKeyPlacement {
        key: Ustr::from(key),
        count,
        current,
    }
}

#[test]
fn test_rebalance() {
    // Both hot keys live on server 0; without them both servers carry 60.
    let loads = vec![100, 60];
    let plan = rebalance(&loads, &[hot("k1", 20, 0), hot("k2", 20, 0)]).unwrap();
    assert!(plan.assignments[0].target == 0);
    assert!(plan.assignments[1].target == 1);
    assert!(!plan.assignments[0].moves());
    assert!(plan.assignments[1].moves());
    assert!(plan.projected_loads == vec![80, 80]);
    // Input untouched
    assert!(loads == vec![100, 60]);

    // Reversing equal keys swaps their placement and keeps the loads
    let plan = rebalance(&loads, &[hot("k2", 20, 0), hot("k1", 20, 0)]).unwrap();
    assert!(plan.assignments[0].key.as_str() == "k2" && plan.assignments[0].target == 0);
    assert!(plan.assignments[1].key.as_str() == "k1" && plan.assignments[1].target == 1);
    assert!(plan.projected_loads == vec![80, 80]);
}

#[test]
fn test_rebalance_greedy() {
    // Residual [10, 30, 30]: 50 -> 0, then 30 -> 1 (tie with 2, lowest index), 25 -> 2
    let plan = rebalance(
        &[60, 60, 55],
        &[hot("a", 50, 0), hot("b", 30, 1), hot("c", 25, 2)],
    )
    .unwrap();
    let targets = plan.assignments.iter().map(|a| a.target).collect::<Vec<usize>>();
    assert!(targets == vec![0, 1, 2]);
    assert!(plan.projected_loads == vec![60, 60, 55]);

    let plan = rebalance(&[100, 0, 0], &[hot("a", 40, 0), hot("b", 30, 0), hot("c", 20, 0)]).unwrap();
    let targets = plan.assignments.iter().map(|a| a.target).collect::<Vec<usize>>();
    assert!(targets == vec![1, 2, 0]);
    assert!(plan.projected_loads == vec![30, 40, 30]);
}

#[test]
fn test_rebalance_edge_cases() {
    let plan = rebalance(&[5, 7], &[]).unwrap();
    assert!(plan.assignments.is_empty());
    assert!(plan.projected_loads == vec![5, 7]);

    assert!(matches!(
        rebalance(&[5, 7], &[hot("a", 1, 2)]),
        Err(LogError::OutOfRangeServerIndex { index: 2, servers: 2 })
    ));
    // Not wrapped into range
    assert!(matches!(
        rebalance(&[5, 7], &[hot("a", 1, 1 << 32)]),
        Err(LogError::OutOfRangeServerIndex { servers: 2, .. })
    ));
}

#[test]
fn test_place_hot_keys() {
    let records = ["1:0:0:0,a,0.1,1,1,1/1", "1:0:0:1,b,0.1,0,0,1/1", "1:0:0:2,a,0.1,1,0,1/1"]
        .iter()
        .map(|l| Request::parse(l).unwrap())
        .collect::<Vec<Request>>();
    let hot_keys = vec![(Ustr::from("a"), 2), (Ustr::from("b"), 1)];
    let placed = place_hot_keys(&records, &hot_keys, 2, ServerPolicy::Declared).unwrap();
    assert!(placed == vec![hot("a", 2, 1), hot("b", 1, 0)]);
    assert!(place_hot_keys(&records, &hot_keys, 1, ServerPolicy::Declared).is_err());
    assert!(place_hot_keys(&records, &[(Ustr::from("c"), 1)], 2, ServerPolicy::Declared).is_err());
}
