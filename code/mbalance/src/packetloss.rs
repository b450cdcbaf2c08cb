// The `packet-loss` report: lost and total packets per server and overall, or with --cdf the
// distribution per server of the number of packets lost by the requests that lost any.
//
// Only requests whose packet counts are both known contribute to the totals.  A request that got
// no packets at all (received -1) is left out of the packet totals of its server as well as the
// overall totals, so the overall row is the sum of the server rows.

use crate::cdf::{self, CdfContext};
use crate::format;
use crate::servers::{server_address, server_label};
use crate::PacketLossPrintArgs;

use anyhow::Result;
use explog::{PacketTotals, Request, ServerPolicy};
use std::collections::HashMap;
use std::io;
use tracing::info;

struct PacketLossRow {
    server: Option<usize>,
    totals: PacketTotals,
}

pub fn print_packet_loss(
    output: &mut dyn io::Write,
    print_args: &PacketLossPrintArgs,
    roster: &[String],
    records: &[Request],
    policy: ServerPolicy,
) -> Result<()> {
    let buckets = explog::partition(records, roster.len(), policy, false)?;

    if print_args.cdf {
        let per_server = explog::packet_loss_cdf_per_server(&buckets)?;
        let ctx = CdfContext {
            roster,
            bound_decimals: 0,
        };
        return cdf::print_cdfs(output, &print_args.fmt, &ctx, per_server);
    }

    let mut data = vec![];
    let mut overall = PacketTotals::default();
    for (server, b) in buckets.iter().enumerate() {
        let totals = explog::packet_totals(b)?;
        overall = overall.add(&totals);
        data.push(PacketLossRow {
            server: Some(server),
            totals,
        });
    }
    info!(lost = overall.lost, packets = overall.total, "packet loss");
    data.push(PacketLossRow {
        server: None,
        totals: overall,
    });

    let (formatters, aliases) = my_formatters();
    let spec = print_args.fmt.as_deref().unwrap_or(FMT_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    format::format_data(output, &fields, &formatters, &opts, data, roster)
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

const FMT_DEFAULTS: &str = "server,address,lost,packets,percent";

fn my_formatters() -> (
    HashMap<String, &'static dyn Fn(LossDatum, LossCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(LossDatum, LossCtx) -> String> =
        HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("server".to_string(), &format_server);
    formatters.insert("address".to_string(), &format_address);
    formatters.insert("lost".to_string(), &format_lost);
    formatters.insert("packets".to_string(), &format_packets);
    formatters.insert("percent".to_string(), &format_percent);

    aliases.insert(
        "counts".to_string(),
        vec!["lost".to_string(), "packets".to_string()],
    );

    (formatters, aliases)
}

type LossDatum<'a> = &'a PacketLossRow;
type LossCtx<'a> = &'a [String];

fn format_server(d: LossDatum, _: LossCtx) -> String {
    server_label(d.server)
}

fn format_address(d: LossDatum, c: LossCtx) -> String {
    server_address(d.server, c)
}

fn format_lost(d: LossDatum, _: LossCtx) -> String {
    d.totals.lost.to_string()
}

fn format_packets(d: LossDatum, _: LossCtx) -> String {
    d.totals.total.to_string()
}

fn format_percent(d: LossDatum, _: LossCtx) -> String {
    d.totals
        .loss_pct()
        .map(|p| format!("{:.2}", p))
        .unwrap_or_default()
}

#[cfg(test)]
use crate::test_records;

#[test]
fn test_print_packet_loss() {
    let (roster, records) = test_records();
    let mut out = Vec::<u8>::new();
    let args = PacketLossPrintArgs {
        fmt: Some("server,counts,percent,csv".to_string()),
        ..Default::default()
    };
    print_packet_loss(&mut out, &args, &roster, &records, ServerPolicy::Declared).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(s == "0,0,6,0.00\n1,0,4,0.00\n2,1,4,25.00\ntotal,1,14,7.14\n");

    // No packets at all on a server gives no percentage
    let mut out = Vec::<u8>::new();
    let roster4 = [roster.clone(), vec!["10.0.0.4:11211".to_string()]].concat();
    print_packet_loss(&mut out, &args, &roster4, &records, ServerPolicy::Declared).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(s.lines().nth(3) == Some("3,0,0,"));
}

#[test]
fn test_print_packet_loss_cdf() {
    let (roster, records) = test_records();
    let mut out = Vec::<u8>::new();
    let args = PacketLossPrintArgs {
        cdf: true,
        fmt: Some("all,csv".to_string()),
    };
    print_packet_loss(&mut out, &args, &roster, &records, ServerPolicy::Declared).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(s == "2,10.0.0.3:11211,1,100.00\n");
}
