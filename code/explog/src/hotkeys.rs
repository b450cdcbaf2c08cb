/// Key popularity.

use crate::record::Request;

use itertools::Itertools;
use std::collections::HashMap;
use ustr::Ustr;

/// The number of requests for each key, in the order the keys are first seen.

pub fn key_occurrences(records: &[Request]) -> Vec<(Ustr, usize)> {
    let mut index = HashMap::<Ustr, usize>::new();
    let mut counts = Vec::<(Ustr, usize)>::new();
    for r in records {
        match index.get(&r.key()) {
            Some(i) => counts[*i].1 += 1,
            None => {
                index.insert(r.key(), counts.len());
                counts.push((r.key(), 1));
            }
        }
    }
    counts
}

/// The `n` most requested keys, all keys if `n` is None, most requested first.  Keys with the same
/// count are in the order they were first seen.

pub fn top_keys(records: &[Request], n: Option<usize>) -> Vec<(Ustr, usize)> {
    let counts = key_occurrences(records);
    let n = n.unwrap_or(counts.len());
    counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1))
        .take(n)
        .collect()
}

#[cfg(test)]
fn requests_for_keys(keys: &[&str]) -> Vec<Request> {
    keys.iter()
        .map(|k| Request::parse(&format!("1:0:0:0,{k},0.5,0,0,1/1")).unwrap())
        .collect()
}

#[test]
fn test_top_keys() {
    let rs = requests_for_keys(&["a", "a", "b", "c", "c", "c"]);
    let top = top_keys(&rs, Some(2));
    assert!(top == vec![(Ustr::from("c"), 3), (Ustr::from("a"), 2)]);

    let all = top_keys(&rs, None);
    assert!(all.len() == 3);
    assert!(all[2] == (Ustr::from("b"), 1));

    assert!(top_keys(&rs, Some(10)).len() == 3);
    assert!(top_keys(&rs, Some(0)).is_empty());
    assert!(top_keys(&[], None).is_empty());
}

#[test]
fn test_top_keys_stable() {
    let rs = requests_for_keys(&["x", "y", "z", "y", "x", "w"]);
    let top = top_keys(&rs, None);
    let keys = top.iter().map(|(k, _)| k.as_str()).collect::<Vec<&str>>();
    assert!(keys == vec!["x", "y", "z", "w"]);
}
