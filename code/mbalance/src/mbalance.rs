/// `mbalance` -- Analyze the logs of key-value load balancing experiments
///
/// Run with --help for brief help.
///
/// The log of an experiment is a single file or a set of files matched by a pattern, see the
/// `explog` library.  Every command reads the log, assigns the requests to servers, and prints a
/// table; the `keys` command additionally computes a new placement for the hottest keys and can
/// print the controller rules that would implement it.
///
/// Quirks
///
/// Requests are assigned to the server the client sent them to, unless --according-to-response is
/// given, in which case they are assigned to the server that responded.  A request that got no
/// response is then still assigned to the server it was sent to.
///
/// Rates (requests per second, Mbit/s) are computed over the duration of the whole experiment, also
/// for the per-server values, and the duration is computed in whole seconds from the first and the
/// last request in the log unless given explicitly.  A log that spans less than a second needs an
/// explicit --experiment-duration.
mod cdf;
mod format;
mod keys;
mod latency;
mod packetloss;
mod rebalance;
mod rules;
mod servers;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use explog::ServerPolicy;
use std::env;
use std::io;
use std::process;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print information about the program
    Version,

    /// Print the number of requests and throughput per server
    Servers(ServersCmdArgs),

    /// Print the hottest keys and a plan for spreading them over the servers
    Keys(KeysCmdArgs),

    /// Print the latency per server, or its distribution
    Latency(LatencyCmdArgs),

    /// Print the requests per second per server
    Rps(RpsCmdArgs),

    /// Print the packet loss per server, or its distribution
    PacketLoss(PacketLossCmdArgs),
}

#[derive(Args, Debug)]
pub struct ServersCmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    print_args: ServersPrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct KeysCmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    print_args: KeysPrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct LatencyCmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    print_args: LatencyPrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct RpsCmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    print_args: RpsPrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct PacketLossCmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    print_args: PacketLossPrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Log file, or a pattern in the file name matching a set of log files [default: $MBALANCE_DATA]
    #[arg(long, short)]
    data_file: Option<String>,

    /// Assign requests to the server that responded rather than the one they were sent to
    #[arg(long, visible_alias = "atr", default_value_t = false)]
    according_to_response: bool,
}

#[derive(Args, Debug, Default)]
pub struct ServersPrintArgs {
    /// Size in bytes of the objects stored in the servers, enables the throughput fields
    #[arg(long)]
    object_size: Option<u64>,

    /// Duration of the experiment in seconds [default: computed from the log]
    #[arg(long)]
    experiment_duration: Option<u64>,

    /// Number of requests to compute the total throughput for [default: all]
    #[arg(long)]
    number_of_requests: Option<usize>,

    /// Select fields and format for the output, "help" for a list
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct KeysPrintArgs {
    /// Number of hot keys to consider [default: all keys]
    #[arg(long, short)]
    number_of_keys: Option<usize>,

    /// JSON file with the switch's port table, enables printing the controller rules
    #[arg(long)]
    switch_ports: Option<String>,

    /// Send the hot keys to a select group spanning all servers instead of moving them
    #[arg(long, default_value_t = false)]
    group: bool,

    /// Select fields and format for the output, "help" for a list
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct LatencyPrintArgs {
    /// Print the cumulative distribution of latency per server
    #[arg(long, default_value_t = false)]
    cdf: bool,

    /// Width in milliseconds of the buckets of the distribution
    #[arg(long, default_value_t = 0.1)]
    bucket_width: f64,

    /// Leave out the requests that lost packets
    #[arg(long, default_value_t = false)]
    ignore_packet_loss: bool,

    /// Select fields and format for the output, "help" for a list
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct RpsPrintArgs {
    /// Duration of the experiment in seconds [default: computed from the log]
    #[arg(long)]
    experiment_duration: Option<u64>,

    /// Select fields and format for the output, "help" for a list
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct PacketLossPrintArgs {
    /// Print the cumulative distribution of lost packets per request, per server
    #[arg(long, default_value_t = false)]
    cdf: bool,

    /// Select fields and format for the output, "help" for a list
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct MetaArgs {
    /// Print progress and debugging information to stderr
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() {
    match mbalance() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn mbalance() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        // Syntax:
        //  - components of the version string are space-separated but there are spaces nowhere else
        //  - the keyword "mbalance" is always the first component
        //  - every component is keyword(value)
        //  - "version" carries a semver
        //  - "features" carries a comma-separated list of enabled features
        println!("mbalance version(0.1.0) features()");
        return Ok(());
    }

    if match cli.command {
        Commands::Servers(ref args) => format::maybe_help(&args.print_args.fmt, &servers::fmt_help),
        Commands::Keys(ref args) => format::maybe_help(&args.print_args.fmt, &keys::fmt_help),
        Commands::Latency(ref args) => format::maybe_help(&args.print_args.fmt, || {
            latency::fmt_help(args.print_args.cdf)
        }),
        Commands::Rps(ref args) => format::maybe_help(&args.print_args.fmt, &servers::rps_fmt_help),
        Commands::PacketLoss(ref args) => format::maybe_help(&args.print_args.fmt, || {
            packetloss::fmt_help(args.print_args.cdf)
        }),
        Commands::Version => false,
    } {
        return Ok(());
    }

    let (source_args, meta_args) = match cli.command {
        Commands::Servers(ref args) => (&args.source_args, &args.meta_args),
        Commands::Keys(ref args) => (&args.source_args, &args.meta_args),
        Commands::Latency(ref args) => (&args.source_args, &args.meta_args),
        Commands::Rps(ref args) => (&args.source_args, &args.meta_args),
        Commands::PacketLoss(ref args) => (&args.source_args, &args.meta_args),
        Commands::Version => bail!("Unexpected command"),
    };

    init_logging(meta_args);

    let data_file = if let Some(ref name) = source_args.data_file {
        name.clone()
    } else if let Ok(val) = env::var("MBALANCE_DATA") {
        val
    } else {
        bail!("No log file, use --data-file or set MBALANCE_DATA")
    };

    let log = explog::load(&data_file)?;
    let roster = log.roster()?;
    let records = log.requests()?;
    info!(
        files = log.files.len(),
        servers = roster.len(),
        requests = records.len(),
        "log loaded"
    );
    let policy = ServerPolicy::new(source_args.according_to_response);

    match cli.command {
        Commands::Servers(ref args) => servers::print_servers(
            &mut io::stdout(),
            &args.print_args,
            &roster,
            &records,
            policy,
        ),
        Commands::Keys(ref args) => {
            keys::print_keys(&mut io::stdout(), &args.print_args, &roster, &records, policy)
        }
        Commands::Latency(ref args) => latency::print_latency(
            &mut io::stdout(),
            &args.print_args,
            &roster,
            &records,
            policy,
        ),
        Commands::Rps(ref args) => {
            servers::print_rps(&mut io::stdout(), &args.print_args, &roster, &records, policy)
        }
        Commands::PacketLoss(ref args) => packetloss::print_packet_loss(
            &mut io::stdout(),
            &args.print_args,
            &roster,
            &records,
            policy,
        ),
        Commands::Version => bail!("Unexpected command"),
    }
}

fn init_logging(meta_args: &MetaArgs) {
    let level = if meta_args.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// The duration to compute rates over: `given`, or else the duration of the log.  It must be
/// positive.

pub fn rate_duration(given: Option<u64>, records: &[explog::Request]) -> Result<u64> {
    let duration = match given {
        Some(d) => d,
        None => match explog::experiment_duration(records) {
            Some(d) => d.max(0) as u64,
            None => bail!("No requests in the log"),
        },
    };
    if duration == 0 {
        bail!("The experiment duration is zero, use --experiment-duration")
    }
    Ok(duration)
}

#[cfg(test)]
pub fn test_records() -> (Vec<String>, Vec<explog::Request>) {
    let log = explog::load("../tests/explog/single.txt").unwrap();
    (log.roster().unwrap(), log.requests().unwrap())
}

#[test]
fn test_rate_duration() {
    let (_, records) = test_records();
    assert!(rate_duration(None, &records).unwrap() == 4);
    assert!(rate_duration(Some(10), &records).unwrap() == 10);
    assert!(rate_duration(Some(0), &records).is_err());
    assert!(rate_duration(None, &records[0..1]).is_err());
    assert!(rate_duration(None, &[]).is_err());
}
