// The `keys` report: the hottest keys with their current servers and the servers the rebalancer
// would move them to, then the load of each server before and after the move.  With a switch port
// table the controller rules for the move are printed last, one JSON object per line.

use crate::format;
use crate::rebalance::{self, Reassignment};
use crate::rules::{self, DryRunController};
use crate::servers::server_address;
use crate::KeysPrintArgs;

use anyhow::Result;
use explog::{Request, ServerPolicy};
use std::collections::HashMap;
use std::io;
use tracing::info;

struct LoadRow {
    server: usize,
    load: usize,
    projected: i64,
}

pub fn print_keys(
    output: &mut dyn io::Write,
    print_args: &KeysPrintArgs,
    roster: &[String],
    records: &[Request],
    policy: ServerPolicy,
) -> Result<()> {
    let hot_keys = explog::top_keys(records, print_args.number_of_keys);
    let placements = rebalance::place_hot_keys(records, &hot_keys, roster.len(), policy)?;
    let buckets = explog::partition(records, roster.len(), policy, false)?;
    let loads = explog::request_counts(&buckets);
    let plan = rebalance::rebalance(&loads, &placements)?;
    info!(
        hot_keys = plan.assignments.len(),
        moved = plan.assignments.iter().filter(|a| a.moves()).count(),
        "rebalanced"
    );

    let (formatters, aliases) = my_formatters();
    let spec = print_args.fmt.as_deref().unwrap_or(FMT_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    format::format_data(
        output,
        &fields,
        &formatters,
        &opts,
        plan.assignments.clone(),
        roster,
    )?;

    output.write_all(b"\n")?;
    let (load_formatters, _) = load_formatters();
    let load_data = loads
        .iter()
        .zip(plan.projected_loads.iter())
        .enumerate()
        .map(|(server, (&load, &projected))| LoadRow {
            server,
            load,
            projected,
        })
        .collect::<Vec<LoadRow>>();
    format::format_data(
        output,
        &["server", "load", "projected"],
        &load_formatters,
        &opts,
        load_data,
        roster,
    )?;

    if let Some(ref filename) = print_args.switch_ports {
        let ports = rustutils::read_switch_ports(filename)?;
        output.write_all(b"\n")?;
        let mut controller = DryRunController::new(ports, &mut *output);
        rules::emit_rules(&mut controller, None, &plan, roster, print_args.group)?;
    }
    Ok(())
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help {
        fields: formatters.keys().cloned().collect::<Vec<String>>(),
        aliases: aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<(String, Vec<String>)>>(),
        defaults: FMT_DEFAULTS.to_string(),
    }
}

const FMT_DEFAULTS: &str = "key,count,current,target,moved";

fn my_formatters() -> (
    HashMap<String, &'static dyn Fn(KeyDatum, KeyCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(KeyDatum, KeyCtx) -> String> =
        HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("key".to_string(), &format_key);
    formatters.insert("count".to_string(), &format_count);
    formatters.insert("current".to_string(), &format_current);
    formatters.insert("target".to_string(), &format_target);
    formatters.insert("current-address".to_string(), &format_current_address);
    formatters.insert("target-address".to_string(), &format_target_address);
    formatters.insert("moved".to_string(), &format_moved);

    aliases.insert(
        "addresses".to_string(),
        vec!["current-address".to_string(), "target-address".to_string()],
    );

    (formatters, aliases)
}

type KeyDatum<'a> = &'a Reassignment;
type KeyCtx<'a> = &'a [String];

fn format_key(d: KeyDatum, _: KeyCtx) -> String {
    d.key.to_string()
}

fn format_count(d: KeyDatum, _: KeyCtx) -> String {
    d.count.to_string()
}

fn format_current(d: KeyDatum, _: KeyCtx) -> String {
    d.current.to_string()
}

fn format_target(d: KeyDatum, _: KeyCtx) -> String {
    d.target.to_string()
}

fn format_current_address(d: KeyDatum, c: KeyCtx) -> String {
    server_address(Some(d.current), c)
}

fn format_target_address(d: KeyDatum, c: KeyCtx) -> String {
    server_address(Some(d.target), c)
}

fn format_moved(d: KeyDatum, _: KeyCtx) -> String {
    let moved = if d.moves() { "yes" } else { "no" };
    moved.to_string()
}

fn load_formatters() -> (
    HashMap<String, &'static dyn Fn(LoadDatum, KeyCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(LoadDatum, KeyCtx) -> String> =
        HashMap::new();
    formatters.insert("server".to_string(), &format_load_server);
    formatters.insert("load".to_string(), &format_load);
    formatters.insert("projected".to_string(), &format_projected);
    (formatters, HashMap::new())
}

type LoadDatum<'a> = &'a LoadRow;

fn format_load_server(d: LoadDatum, _: KeyCtx) -> String {
    d.server.to_string()
}

fn format_load(d: LoadDatum, _: KeyCtx) -> String {
    d.load.to_string()
}

fn format_projected(d: LoadDatum, _: KeyCtx) -> String {
    d.projected.to_string()
}

#[cfg(test)]
use crate::test_records;

#[test]
fn test_print_keys() {
    let (roster, records) = test_records();
    let mut out = Vec::<u8>::new();
    let args = KeysPrintArgs {
        number_of_keys: Some(2),
        fmt: Some("key,count,current,target,moved,csv".to_string()),
        ..Default::default()
    };
    print_keys(&mut out, &args, &roster, &records, ServerPolicy::Declared).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(s == "alpha,4,0,0,no\nbeta,2,1,1,no\n\n0,4,4\n1,2,2\n2,2,2\n");
}

#[test]
fn test_print_keys_with_rules() {
    // By response the loads are [4,1,3], and with the hot keys taken off [0,-1,1], so alpha goes
    // to 1, beta to 0, gamma stays.
    let (roster, records) = test_records();
    let mut out = Vec::<u8>::new();
    let args = KeysPrintArgs {
        switch_ports: Some("../tests/rustutils/switch-ports.json".to_string()),
        fmt: Some("key,current,target,moved,csv".to_string()),
        ..Default::default()
    };
    print_keys(&mut out, &args, &roster, &records, ServerPolicy::Observed).unwrap();
    let s = String::from_utf8(out).unwrap();
    let mut sections = s.split("\n\n");
    assert!(sections.next() == Some("alpha,0,1,yes\nbeta,1,0,yes\ngamma,2,2,no"));
    assert!(sections.next() == Some("0,4,2\n1,1,3\n2,3,3"));
    let rules = sections
        .next()
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
        .collect::<Vec<serde_json::Value>>();
    assert!(rules.len() == 2);
    assert!(rules[0]["KeyReq"]["key"] == "alpha");
    let actions = &rules[0]["KeyReq"]["instructions"]["OFPInstructionActions"]["actions"];
    assert!(actions[2]["OFPActionOutput"]["port"] == 2);
    assert!(rules[1]["KeyReq"]["key"] == "beta");

    let mut out = Vec::<u8>::new();
    let args = KeysPrintArgs {
        switch_ports: Some("../tests/rustutils/switch-ports.json".to_string()),
        group: true,
        fmt: Some("key,csv".to_string()),
        ..Default::default()
    };
    print_keys(&mut out, &args, &roster, &records, ServerPolicy::Observed).unwrap();
    let s = String::from_utf8(out).unwrap();
    let rules = s.split("\n\n").nth(2).unwrap().lines().collect::<Vec<&str>>();
    assert!(rules.len() == 4);
    assert!(rules[0].contains("OFPGroupMod"));
}
