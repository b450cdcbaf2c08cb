// The `latency` report: average latency per server, or with --cdf the distribution of latency per
// server.  Requests without a response have no latency and are left out of both.

use crate::cdf::{self, CdfContext};
use crate::format;
use crate::servers::{server_address, server_label};
use crate::LatencyPrintArgs;

use anyhow::Result;
use explog::{Request, ServerPolicy};
use std::collections::HashMap;
use std::io;

struct LatencyRow {
    server: Option<usize>,
    requests: usize,
    average: Option<f64>,
}

pub fn print_latency(
    output: &mut dyn io::Write,
    print_args: &LatencyPrintArgs,
    roster: &[String],
    records: &[Request],
    policy: ServerPolicy,
) -> Result<()> {
    let buckets = explog::partition(records, roster.len(), policy, print_args.ignore_packet_loss)?;

    if print_args.cdf {
        let per_server = explog::latency_cdf_per_server(&buckets, print_args.bucket_width)?;
        let ctx = CdfContext {
            roster,
            bound_decimals: decimals(print_args.bucket_width),
        };
        return cdf::print_cdfs(output, &print_args.fmt, &ctx, per_server);
    }

    let mut data = buckets
        .iter()
        .enumerate()
        .map(|(server, b)| LatencyRow {
            server: Some(server),
            requests: b.len(),
            average: explog::average_latency(b),
        })
        .collect::<Vec<LatencyRow>>();
    let retained = buckets.concat();
    data.push(LatencyRow {
        server: None,
        requests: retained.len(),
        average: explog::average_latency(&retained),
    });

    let (formatters, aliases) = my_formatters();
    let spec = print_args.fmt.as_deref().unwrap_or(FMT_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    format::format_data(output, &fields, &formatters, &opts, data, roster)
}

// The number of decimals needed to print multiples of `width` exactly, at most 6.
fn decimals(width: f64) -> usize {
    (0..6)
        .find(|&d| {
            let scaled = width * 10f64.powi(d as i32);
            (scaled - scaled.round()).abs() < 1e-9
        })
        .unwrap_or(6)
}

pub fn fmt_help(cdf: bool) -> format::Help {
    if cdf {
        return cdf::fmt_help();
    }
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

const FMT_DEFAULTS: &str = "server,address,requests,average";

fn my_formatters() -> (
    HashMap<String, &'static dyn Fn(LatencyDatum, LatencyCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(LatencyDatum, LatencyCtx) -> String> =
        HashMap::new();
    formatters.insert("server".to_string(), &format_server);
    formatters.insert("address".to_string(), &format_address);
    formatters.insert("requests".to_string(), &format_requests);
    formatters.insert("average".to_string(), &format_average);
    (formatters, HashMap::new())
}

type LatencyDatum<'a> = &'a LatencyRow;
type LatencyCtx<'a> = &'a [String];

fn format_server(d: LatencyDatum, _: LatencyCtx) -> String {
    server_label(d.server)
}

fn format_address(d: LatencyDatum, c: LatencyCtx) -> String {
    server_address(d.server, c)
}

fn format_requests(d: LatencyDatum, _: LatencyCtx) -> String {
    d.requests.to_string()
}

// In milliseconds.
fn format_average(d: LatencyDatum, _: LatencyCtx) -> String {
    d.average.map(|a| format!("{:.3}", a)).unwrap_or_default()
}

#[cfg(test)]
use crate::test_records;

#[test]
fn test_print_latency() {
    let (roster, records) = test_records();
    let mut out = Vec::<u8>::new();
    let args = LatencyPrintArgs {
        bucket_width: 0.1,
        fmt: Some("server,requests,average,csv".to_string()),
        ..Default::default()
    };
    print_latency(&mut out, &args, &roster, &records, ServerPolicy::Declared).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(s == "0,4,0.250\n1,2,0.800\n2,2,0.225\ntotal,8,0.400\n");

    let mut out = Vec::<u8>::new();
    let args = LatencyPrintArgs {
        bucket_width: 0.1,
        ignore_packet_loss: true,
        fmt: Some("server,requests,average,csv".to_string()),
        ..Default::default()
    };
    print_latency(&mut out, &args, &roster, &records, ServerPolicy::Declared).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(s == "0,3,0.250\n1,2,0.800\n2,2,0.225\ntotal,7,0.400\n");
}

#[test]
fn test_print_latency_cdf() {
    let (roster, records) = test_records();
    let mut out = Vec::<u8>::new();
    let args = LatencyPrintArgs {
        cdf: true,
        bucket_width: 0.1,
        fmt: Some("server,bound,percent,csv".to_string()),
        ..Default::default()
    };
    print_latency(&mut out, &args, &roster, &records, ServerPolicy::Declared).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(
        s == "0,0.1,33.33
0,0.3,66.67
0,0.5,100.00
1,0.4,50.00
1,1.3,100.00
2,0.2,50.00
2,0.4,100.00
"
    );

    let args = LatencyPrintArgs {
        cdf: true,
        bucket_width: 0.0,
        ..Default::default()
    };
    assert!(print_latency(&mut Vec::<u8>::new(), &args, &roster, &records, ServerPolicy::Declared).is_err());
}

#[test]
fn test_decimals() {
    assert!(decimals(1.0) == 0);
    assert!(decimals(0.1) == 1);
    assert!(decimals(0.25) == 2);
}
