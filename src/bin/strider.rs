//! Binary entry point: worker, coordinator and shard splitting.
#![forbid(unsafe_code)]

use std::error::Error;
use std::fs::File;
use std::io::{self, BufReader};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use strider::config::{StriderConfig, CONFIG_ENV};
use strider::graph::shard::split_edge_list;
use strider::graph::{SplitOptions, SplitSummary};
use strider::{Coordinator, Engine, HostId, MemoryPartition, RunSummary};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "strider",
    version,
    about = "Distributed random walks over a partitioned graph",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = CONFIG_ENV,
        value_name = "FILE",
        help = "Configuration file (defaults to the per-user config directory)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Run one worker until it is killed")]
    Worker(WorkerCmd),

    #[command(about = "Drive one run across every worker and print the reports")]
    Coordinator(CoordinatorCmd),

    #[command(about = "Split a text edge list into per-worker shard files")]
    Split(SplitCmd),
}

#[derive(Args, Debug)]
struct WorkerCmd {
    #[arg(long, help = "Index of this worker in the peer list")]
    host_id: Option<u32>,

    #[arg(long, value_name = "FILE", help = "Shard file of this worker's partition")]
    shard: Option<PathBuf>,

    #[arg(long, value_name = "IP:PORT", help = "Peer data address, repeat in host id order")]
    peer: Vec<SocketAddrV4>,
}

#[derive(Args, Debug)]
struct CoordinatorCmd {
    #[arg(long, value_name = "IP:PORT", help = "Worker data address, repeat in host id order")]
    worker: Vec<SocketAddrV4>,

    #[arg(long, help = "Address announced to workers for reports")]
    address: Option<Ipv4Addr>,

    #[arg(long, help = "Walks seeded at every vertex")]
    walks: Option<u32>,

    #[arg(long, help = "Seconds between start and end of the measured run")]
    run_secs: Option<u64>,

    #[arg(long, help = "Warm the remote-vertex caches before measuring")]
    warm: bool,
}

#[derive(Args, Debug)]
struct SplitCmd {
    #[arg(long, value_name = "FILE", help = "Text edge list, `-` for stdin")]
    input: PathBuf,

    #[arg(long, value_name = "DIR", help = "Directory receiving <part>.shard")]
    out: PathBuf,

    #[arg(long, help = "Number of partitions")]
    parts: u32,

    #[arg(long, help = "Also store the reverse of every edge")]
    mirror: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    let config = StriderConfig::load(cli.config.clone())?;

    match cli.command {
        Command::Worker(cmd) => run_worker(cmd, config),
        Command::Coordinator(cmd) => {
            let summary = run_coordinator(cmd, config)?;
            emit(&cli.format, &summary, |_| print_run_text(&summary))
        }
        Command::Split(cmd) => {
            let summary = run_split(&cmd)?;
            emit(&cli.format, &summary, |_| print_split_text(&summary))
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strider=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run_worker(cmd: WorkerCmd, config: StriderConfig) -> Result<(), Box<dyn Error>> {
    let mut worker = config.worker;
    if let Some(host_id) = cmd.host_id {
        worker.host_id = host_id;
    }
    if let Some(shard) = cmd.shard {
        worker.shard = Some(shard);
    }
    if !cmd.peer.is_empty() {
        worker.peers = cmd.peer;
    }
    worker.validate()?;
    let shard = worker
        .shard
        .clone()
        .ok_or("worker needs a shard file (--shard or `shard` in the config)")?;
    let graph = MemoryPartition::load_shard(HostId(worker.host_id), &shard)?;
    let engine = Arc::new(Engine::new(worker, Box::new(graph))?);
    let handle = engine.start()?;
    info!(host = %engine.host(), "worker.ready");
    handle.join();
    Ok(())
}

fn run_coordinator(cmd: CoordinatorCmd, config: StriderConfig) -> Result<RunSummary, Box<dyn Error>> {
    let mut coordinator = config.coordinator;
    if !cmd.worker.is_empty() {
        coordinator.workers = cmd.worker;
    }
    if let Some(address) = cmd.address {
        coordinator.address = address;
    }
    if let Some(walks) = cmd.walks {
        coordinator.walks_per_vertex = walks;
    }
    if let Some(run_secs) = cmd.run_secs {
        coordinator.run_secs = run_secs;
    }
    coordinator.warm |= cmd.warm;
    Ok(Coordinator::new(coordinator)?.run()?)
}

fn run_split(cmd: &SplitCmd) -> Result<SplitSummary, Box<dyn Error>> {
    let opts = SplitOptions {
        parts: cmd.parts,
        mirror: cmd.mirror,
    };
    let summary = if cmd.input.as_os_str() == "-" {
        split_edge_list(io::stdin().lock(), &cmd.out, &opts)?
    } else {
        let file = File::open(&cmd.input)?;
        split_edge_list(BufReader::new(file), &cmd.out, &opts)?
    };
    Ok(summary)
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(OutputFormat),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(OutputFormat::Text),
    }
    Ok(())
}

fn print_run_text(summary: &RunSummary) {
    for report in &summary.warm {
        println!("warm {}: walkers={}", report.host, report.walkers);
    }
    for report in &summary.reports {
        println!(
            "run {}: completed={} execution_time={:.3}s send_failures={}",
            report.host, report.completed, report.execution_time, report.send_failures
        );
    }
    println!(
        "Total: completed={} execution_time={:.3}s throughput={:.1}/s missing={}",
        summary.completed, summary.execution_time, summary.throughput, summary.missing
    );
}

fn print_split_text(summary: &SplitSummary) {
    println!(
        "Split {} edges into {} shards",
        summary.edges_read,
        summary.files.len()
    );
    for (path, records) in summary.files.iter().zip(&summary.records_per_part) {
        println!("  {}: records={records}", path.display());
    }
}
