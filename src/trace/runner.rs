//! Wires a metrics source and the flush loop together.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use super::logger::TraceLogger;
use super::source::{DgpuSource, IgpuSource, MetricsSource};
use super::GpuType;
use crate::constants::{DEFAULT_FLUSH_PERIOD, NVIDIA_SMI_ENV, TEGRASTATS_ENV};

/// Validated trace logger settings
#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub directory: PathBuf,
    pub filename: String,
    pub gpu_type: GpuType,
    /// dGPU sampling interval; the iGPU source ignores it
    pub interval: Duration,
    pub flush_period: Duration,
}

impl TraceConfig {
    /// Validate raw CLI values. Fails on an unknown GPU type or a
    /// non-positive interval, before anything is collected.
    pub fn new(
        directory: PathBuf,
        filename: String,
        gpu_type: &str,
        interval_secs: f64,
        flush_period_secs: Option<f64>,
    ) -> Result<Self> {
        let gpu_type: GpuType = gpu_type.parse()?;
        let interval = positive_secs(interval_secs).context("Invalid --interval")?;
        let flush_period = match flush_period_secs {
            Some(secs) => positive_secs(secs).context("Invalid --flush-period")?,
            None => DEFAULT_FLUSH_PERIOD,
        };
        Ok(Self {
            directory,
            filename,
            gpu_type,
            interval,
            flush_period,
        })
    }
}

fn positive_secs(secs: f64) -> Result<Duration> {
    if secs.is_nan() || secs <= 0.0 {
        anyhow::bail!("expected a positive number of seconds, got {}", secs);
    }
    Duration::try_from_secs_f64(secs).with_context(|| format!("{} seconds is out of range", secs))
}

/// Collector for the configured GPU type. `ROOMIE_NVIDIA_SMI` and
/// `ROOMIE_TEGRASTATS` override the vendor tool paths.
pub fn make_source(config: &TraceConfig) -> Box<dyn MetricsSource> {
    match config.gpu_type {
        GpuType::Integrated => {
            debug!("--- Will start tracing for iGPU. ---");
            let mut source = IgpuSource::new();
            if let Ok(program) = env::var(TEGRASTATS_ENV) {
                source = source.with_program(program);
            }
            Box::new(source)
        }
        GpuType::Discrete => {
            debug!("--- Will start tracing for dGPU. ---");
            let mut source = DgpuSource::new(config.interval);
            if let Ok(program) = env::var(NVIDIA_SMI_ENV) {
                source = source.with_program(program);
            }
            Box::new(source)
        }
    }
}

/// Run until the process is killed or either loop fails.
pub async fn run(config: &TraceConfig) -> Result<()> {
    let source = make_source(config);
    run_with_source(config, source).await
}

/// Run `source` on the blocking pool next to the flush loop. A source that
/// finishes cleanly leaves the flush loop running; the first error from
/// either side is returned. The sink is closed on return so a source still
/// collecting stops at its next tick.
pub async fn run_with_source(config: &TraceConfig, mut source: Box<dyn MetricsSource>) -> Result<()> {
    let logger = TraceLogger::new(&config.directory, &config.filename)?;
    info!(
        "Tracing {} via {} into {} (flush every {:?})",
        config.gpu_type,
        source.name(),
        logger.writer().path().display(),
        config.flush_period
    );

    let sink = logger.sink();
    let closer = logger.sink();
    let collector = async move {
        tokio::task::spawn_blocking(move || source.run(sink))
            .await
            .context("Metrics collector panicked")?
    };
    let flusher = logger.run_flush_loop(config.flush_period);

    let result = tokio::try_join!(collector, flusher);
    closer.close();
    result?;
    Ok(())
}
