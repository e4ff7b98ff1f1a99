// src/bin/gpu_trace.rs
//
// Long-running GPU trace collector. Appends samples to
// <directory>/<filename>_gpu_trace.csv until killed.

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tokio::runtime::Builder as RtBuilder;
use tracing::error;

use roomie_testbed::constants::{COLLECTOR_SHUTDOWN_GRACE, DEFAULT_SAMPLE_INTERVAL_SECS};
use roomie_testbed::logging::{failure_banner, init_tracing, local_hostname};
use roomie_testbed::trace::runner::{self, TraceConfig};
use roomie_testbed::LogLevelArgs;

#[derive(Parser, Debug)]
#[command(name = "roomie-gpu-trace", version, about = "Collect GPU traces into a CSV file")]
struct Cli {
    /// Target directory
    #[arg(short = 'd', long)]
    directory: PathBuf,

    /// Filename stem; output is <filename>_gpu_trace.csv
    #[arg(short = 'f', long)]
    filename: String,

    /// Sampling interval in seconds (dGPU only)
    #[arg(short = 'i', long, default_value_t = DEFAULT_SAMPLE_INTERVAL_SECS)]
    interval: f64,

    /// iGPU for Jetson boards (tegrastats), dGPU for discrete NVIDIA GPUs (nvidia-smi)
    #[arg(short = 'g', long = "gpu_type")]
    gpu_type: String,

    /// Seconds between CSV flushes
    #[arg(long)]
    flush_period: Option<f64>,

    #[command(flatten)]
    log: LogLevelArgs,
}

async fn trace(cli: Cli) -> Result<()> {
    let config = TraceConfig::new(
        cli.directory,
        cli.filename,
        &cli.gpu_type,
        cli.interval,
        cli.flush_period,
    )?;
    runner::run(&config).await
}

fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing("roomie_gpu_trace", cli.log.level());

    let rt = RtBuilder::new_multi_thread().enable_all().build()?;
    let result = rt.block_on(trace(cli));
    // A collector blocked inside a vendor tool must not keep the process alive
    rt.shutdown_timeout(COLLECTOR_SHUTDOWN_GRACE);

    if let Err(e) = result {
        error!("{}", failure_banner(&local_hostname(), &e));
        return Err(e);
    }
    Ok(())
}
