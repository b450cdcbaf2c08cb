// Printing of per-server cumulative distributions, one row per point.

use crate::format;

use anyhow::Result;
use explog::CdfPoint;
use std::collections::HashMap;
use std::io;

struct CdfRow {
    server: usize,
    bound: f64,
    percent: f64,
}

pub struct CdfContext<'a> {
    pub roster: &'a [String],

    /// Decimals in the printed bound.
    pub bound_decimals: usize,
}

pub fn print_cdfs(
    output: &mut dyn io::Write,
    fmt: &Option<String>,
    ctx: &CdfContext,
    per_server: Vec<Vec<CdfPoint>>,
) -> Result<()> {
    let (formatters, aliases) = my_formatters();
    let spec = fmt.as_deref().unwrap_or(FMT_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    let data = per_server
        .into_iter()
        .enumerate()
        .flat_map(|(server, points)| {
            points.into_iter().map(move |p| CdfRow {
                server,
                bound: p.x,
                percent: p.cumulative_pct,
            })
        })
        .collect::<Vec<CdfRow>>();
    format::format_data(output, &fields, &formatters, &opts, data, ctx)
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

const FMT_DEFAULTS: &str = "server,bound,percent";

fn my_formatters() -> (
    HashMap<String, &'static dyn Fn(CdfDatum, CdfCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(CdfDatum, CdfCtx) -> String> =
        HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("server".to_string(), &format_server);
    formatters.insert("address".to_string(), &format_address);
    formatters.insert("bound".to_string(), &format_bound);
    formatters.insert("percent".to_string(), &format_percent);

    aliases.insert(
        "all".to_string(),
        vec![
            "server".to_string(),
            "address".to_string(),
            "bound".to_string(),
            "percent".to_string(),
        ],
    );

    (formatters, aliases)
}

type CdfDatum<'a> = &'a CdfRow;
type CdfCtx<'a> = &'a CdfContext<'a>;

fn format_server(d: CdfDatum, _: CdfCtx) -> String {
    d.server.to_string()
}

fn format_address(d: CdfDatum, c: CdfCtx) -> String {
    c.roster.get(d.server).cloned().unwrap_or_default()
}

fn format_bound(d: CdfDatum, c: CdfCtx) -> String {
    format!("{:.*}", c.bound_decimals, d.bound)
}

fn format_percent(d: CdfDatum, _: CdfCtx) -> String {
    format!("{:.2}", d.percent)
}

#[test]
fn test_print_cdfs() {
    let roster = vec!["a:1".to_string(), "b:1".to_string()];
    let ctx = CdfContext {
        roster: &roster,
        bound_decimals: 1,
    };
    let per_server = vec![
        vec![
            CdfPoint {
                x: 0.1,
                cumulative_pct: 50.0,
            },
            CdfPoint {
                x: 0.30000000000000004,
                cumulative_pct: 100.0,
            },
        ],
        vec![],
    ];
    let mut out = Vec::<u8>::new();
    print_cdfs(&mut out, &Some("all,csv".to_string()), &ctx, per_server).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(s == "0,a:1,0.1,50.00\n0,a:1,0.3,100.00\n");
}
