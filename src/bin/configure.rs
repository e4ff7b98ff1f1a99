// src/bin/configure.rs
//
// Generates one JSON descriptor per engine of a testbed run:
//
//   roomie-configure -c usher -w estats-1,xavier:4 -w estats-2,nvidia_a100 \
//       -m ctl-host -q qgen-host -Q 50 -p /data/traces
//
// writes config/usher/{ctl-host,estats-1_0..3,estats-2_0,qgen-host}.json

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing::info;

use roomie_testbed::constants::{DEFAULT_CONFIG_ROOT, DEFAULT_QUERY_DURATION_MIN};
use roomie_testbed::logging::init_tracing;
use roomie_testbed::policy::Policy;
use roomie_testbed::topology::{build_topology, write_topology, TopologyRequest};
use roomie_testbed::LogLevelArgs;

#[derive(Parser, Debug)]
#[command(name = "roomie-configure", version)]
#[command(about = "Generate testbed configuration\n E.g., roomie-configure -c usher -w estats-1,xavier:4,nvidia_geforce_rtx_2080_ti:2,nvidia_a100 ...")]
struct Cli {
    /// Scheduling policy of the controller
    #[arg(short = 'c', long = "config", value_enum)]
    config: Policy,

    /// Worker host: host[,hardware_platform[:count]]* (repeatable)
    #[arg(short = 'w', long = "worker-host", required = true)]
    worker_hosts: Vec<String>,

    /// Controller host
    #[arg(short = 'm', long = "controller-host")]
    controller_host: String,

    /// Query generator host (repeatable)
    #[arg(short = 'q', long = "query-host", required = true)]
    query_hosts: Vec<String>,

    /// Duration of the simulation in minutes
    #[arg(short = 'd', long, default_value_t = DEFAULT_QUERY_DURATION_MIN)]
    duration: f64,

    /// Average queries per second
    #[arg(short = 'Q', long)]
    qps: u32,

    /// Trace directory read by the query generators
    #[arg(short = 'p', long)]
    path: String,

    /// Root directory for descriptors; files land in <root>/<config>/
    #[arg(long, default_value = DEFAULT_CONFIG_ROOT)]
    output_root: PathBuf,

    /// Print descriptors instead of writing them
    #[arg(long)]
    dry_run: bool,

    #[command(flatten)]
    log: LogLevelArgs,
}

fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing("roomie_configure", cli.log.level());

    let request = TopologyRequest {
        policy: cli.config,
        worker_hosts: cli.worker_hosts,
        controller_host: cli.controller_host,
        query_hosts: cli.query_hosts,
        duration: cli.duration,
        qps: cli.qps,
        path: cli.path,
    };
    let topology = build_topology(&request)?;

    if cli.dry_run {
        for engine in topology.engines() {
            println!("# {}\n{}\n", engine, engine.to_json()?);
        }
        return Ok(());
    }

    let written = write_topology(&topology, &cli.output_root)?;
    for path in &written {
        info!("  {}", path.display());
    }
    Ok(())
}
