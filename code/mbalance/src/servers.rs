// The `servers` and `rps` reports: how the requests were spread over the servers.
//
// There is one row per server and then a total row.  The throughput fields are only computed when
// the object size is known, and they are computed over the duration of the whole experiment.

use crate::format;
use crate::{rate_duration, RpsPrintArgs, ServersPrintArgs};

use anyhow::Result;
use explog::{Request, ServerPolicy};
use std::collections::HashMap;
use std::io;
use tracing::debug;

struct ServerRow {
    server: Option<usize>, // None for the total row
    requests: usize,
    percent: f64,
    successful: usize,
    mbits: Option<f64>,
    rps: Option<f64>,
}

struct ServersContext<'a> {
    roster: &'a [String],
    duration: Option<u64>,
}

pub fn print_servers(
    output: &mut dyn io::Write,
    print_args: &ServersPrintArgs,
    roster: &[String],
    records: &[Request],
    policy: ServerPolicy,
) -> Result<()> {
    let buckets = explog::partition(records, roster.len(), policy, false)?;
    let counts = explog::request_counts(&buckets);
    let shares = explog::request_shares(&buckets);
    let successful = explog::successful_request_counts(&buckets)?;
    let total_requests = counts.iter().sum::<usize>();

    let throughput = if let Some(object_size) = print_args.object_size {
        let duration = rate_duration(print_args.experiment_duration, records)?;
        let n = print_args.number_of_requests.unwrap_or(total_requests);
        debug!(duration, object_size, requests = n, "computing throughput");
        Some((duration, object_size, n))
    } else {
        None
    };

    let mut data = counts
        .iter()
        .zip(shares.iter())
        .zip(successful.iter())
        .enumerate()
        .map(|(server, ((&requests, &percent), &successful))| ServerRow {
            server: Some(server),
            requests,
            percent,
            successful,
            mbits: throughput.map(|(duration, object_size, _)| {
                explog::mbit_per_second(requests, duration, object_size).trunc()
            }),
            rps: throughput
                .map(|(duration, _, _)| explog::requests_per_second(requests, duration)),
        })
        .collect::<Vec<ServerRow>>();
    data.push(ServerRow {
        server: None,
        requests: total_requests,
        percent: shares.iter().sum::<f64>(),
        successful: successful.iter().sum::<usize>(),
        mbits: throughput.map(|(duration, object_size, n)| {
            explog::mbit_per_second(n, duration, object_size)
        }),
        rps: throughput
            .map(|(duration, _, _)| explog::requests_per_second(total_requests, duration)),
    });

    let (formatters, aliases) = my_formatters();
    let spec: &str = if let Some(ref fmt) = print_args.fmt {
        fmt
    } else if throughput.is_some() {
        FMT_DEFAULTS_THROUGHPUT
    } else {
        FMT_DEFAULTS
    };
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    let ctx = ServersContext {
        roster,
        duration: throughput.map(|(duration, _, _)| duration),
    };
    format::format_data(output, &fields, &formatters, &opts, data, &ctx)
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help {
        fields: formatters.keys().cloned().collect::<Vec<String>>(),
        aliases: aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<(String, Vec<String>)>>(),
        defaults: format!("{FMT_DEFAULTS}, or with --object-size {FMT_DEFAULTS_THROUGHPUT}"),
    }
}

const FMT_DEFAULTS: &str = "server,address,requests,percent,successful";
const FMT_DEFAULTS_THROUGHPUT: &str = "server,address,requests,percent,successful,throughput";

fn my_formatters() -> (
    HashMap<String, &'static dyn Fn(ServerDatum, ServerCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(ServerDatum, ServerCtx) -> String> =
        HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("server".to_string(), &format_server);
    formatters.insert("address".to_string(), &format_address);
    formatters.insert("requests".to_string(), &format_requests);
    formatters.insert("percent".to_string(), &format_percent);
    formatters.insert("successful".to_string(), &format_successful);
    formatters.insert("duration".to_string(), &format_duration);
    formatters.insert("mbits".to_string(), &format_mbits);
    formatters.insert("rps".to_string(), &format_rps);

    aliases.insert(
        "throughput".to_string(),
        vec!["duration".to_string(), "mbits".to_string(), "rps".to_string()],
    );
    aliases.insert(
        "all".to_string(),
        vec![
            "server".to_string(),
            "address".to_string(),
            "requests".to_string(),
            "percent".to_string(),
            "successful".to_string(),
            "duration".to_string(),
            "mbits".to_string(),
            "rps".to_string(),
        ],
    );

    (formatters, aliases)
}

type ServerDatum<'a> = &'a ServerRow;
type ServerCtx<'a> = &'a ServersContext<'a>;

fn format_server(d: ServerDatum, _: ServerCtx) -> String {
    server_label(d.server)
}

fn format_address(d: ServerDatum, c: ServerCtx) -> String {
    server_address(d.server, c.roster)
}

fn format_requests(d: ServerDatum, _: ServerCtx) -> String {
    d.requests.to_string()
}

fn format_percent(d: ServerDatum, _: ServerCtx) -> String {
    format!("{:.2}", d.percent)
}

fn format_successful(d: ServerDatum, _: ServerCtx) -> String {
    d.successful.to_string()
}

fn format_duration(_: ServerDatum, c: ServerCtx) -> String {
    c.duration.map(|d| d.to_string()).unwrap_or_default()
}

fn format_mbits(d: ServerDatum, _: ServerCtx) -> String {
    d.mbits.map(|m| format!("{:.2}", m)).unwrap_or_default()
}

fn format_rps(d: ServerDatum, _: ServerCtx) -> String {
    d.rps.map(|r| format!("{:.2}", r)).unwrap_or_default()
}

/// The label of a row: the server index, or "total".

pub fn server_label(server: Option<usize>) -> String {
    match server {
        Some(i) => i.to_string(),
        None => "total".to_string(),
    }
}

pub fn server_address(server: Option<usize>, roster: &[String]) -> String {
    server
        .and_then(|i| roster.get(i))
        .cloned()
        .unwrap_or_default()
}

// The `rps` report.

struct RpsRow {
    server: Option<usize>,
    rps: f64,
}

pub fn print_rps(
    output: &mut dyn io::Write,
    print_args: &RpsPrintArgs,
    roster: &[String],
    records: &[Request],
    policy: ServerPolicy,
) -> Result<()> {
    let duration = rate_duration(print_args.experiment_duration, records)?;
    let buckets = explog::partition(records, roster.len(), policy, false)?;
    let counts = explog::request_counts(&buckets);
    let mut data = counts
        .iter()
        .enumerate()
        .map(|(server, &n)| RpsRow {
            server: Some(server),
            rps: explog::requests_per_second(n, duration),
        })
        .collect::<Vec<RpsRow>>();
    data.push(RpsRow {
        server: None,
        rps: explog::requests_per_second(counts.iter().sum::<usize>(), duration),
    });

    let (formatters, aliases) = rps_formatters();
    let spec: &str = if let Some(ref fmt) = print_args.fmt {
        fmt
    } else {
        RPS_FMT_DEFAULTS
    };
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    format::format_data(output, &fields, &formatters, &opts, data, roster)
}

pub fn rps_fmt_help() -> format::Help {
    let (formatters, aliases) = rps_formatters();
    format::Help {
        fields: formatters.keys().cloned().collect::<Vec<String>>(),
        aliases: aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<(String, Vec<String>)>>(),
        defaults: RPS_FMT_DEFAULTS.to_string(),
    }
}

const RPS_FMT_DEFAULTS: &str = "server,address,rps";

fn rps_formatters() -> (
    HashMap<String, &'static dyn Fn(RpsDatum, RpsCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(RpsDatum, RpsCtx) -> String> =
        HashMap::new();
    formatters.insert("server".to_string(), &format_rps_server);
    formatters.insert("address".to_string(), &format_rps_address);
    formatters.insert("rps".to_string(), &format_rps_rps);
    (formatters, HashMap::new())
}

type RpsDatum<'a> = &'a RpsRow;
type RpsCtx<'a> = &'a [String];

fn format_rps_server(d: RpsDatum, _: RpsCtx) -> String {
    server_label(d.server)
}

fn format_rps_address(d: RpsDatum, c: RpsCtx) -> String {
    server_address(d.server, c)
}

fn format_rps_rps(d: RpsDatum, _: RpsCtx) -> String {
    format!("{:.2}", d.rps)
}

#[cfg(test)]
use crate::test_records;

#[test]
fn test_print_servers() {
    let (roster, records) = test_records();
    let mut out = Vec::<u8>::new();
    let args = ServersPrintArgs {
        fmt: Some("all,csv".to_string()),
        ..Default::default()
    };
    print_servers(&mut out, &args, &roster, &records, ServerPolicy::Declared).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(
        s == "0,10.0.0.1:11211,4,50.00,3,,,
1,10.0.0.2:11211,2,25.00,2,,,
2,10.0.0.3:11211,2,25.00,2,,,
total,,8,100.00,7,,,
"
    );
}

#[test]
fn test_print_servers_throughput() {
    let (roster, records) = test_records();
    let mut out = Vec::<u8>::new();
    let args = ServersPrintArgs {
        object_size: Some(1_000_000),
        fmt: Some("server,requests,throughput,csv".to_string()),
        ..Default::default()
    };
    print_servers(&mut out, &args, &roster, &records, ServerPolicy::Declared).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(
        s == "0,4,4,8.00,1.00
1,2,4,4.00,0.50
2,2,4,4.00,0.50
total,8,4,16.00,2.00
"
    );

    // Explicit duration and request count
    let mut out = Vec::<u8>::new();
    let args = ServersPrintArgs {
        object_size: Some(1_000_000),
        experiment_duration: Some(8),
        number_of_requests: Some(2),
        fmt: Some("server,mbits,csv".to_string()),
        ..Default::default()
    };
    print_servers(&mut out, &args, &roster, &records, ServerPolicy::Declared).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(s == "0,4.00\n1,2.00\n2,2.00\ntotal,2.00\n");
}

#[test]
fn test_print_rps() {
    let (roster, records) = test_records();
    let mut out = Vec::<u8>::new();
    let args = RpsPrintArgs::default();
    print_rps(&mut out, &args, &roster, &records, ServerPolicy::Observed).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(
        s == "server  address         rps
0       10.0.0.1:11211  1.00
1       10.0.0.2:11211  0.25
2       10.0.0.3:11211  0.75
total                   2.00
"
    );

    let args = RpsPrintArgs {
        experiment_duration: Some(0),
        ..Default::default()
    };
    assert!(print_rps(&mut Vec::<u8>::new(), &args, &roster, &records, ServerPolicy::Observed).is_err());
}
