//! Log level flags and tracing setup shared by both binaries.

use clap::Args;
use tracing::Level;

/// Mutually independent level flags. When several are given the most verbose
/// one wins (debug > info > warn > error); with none, info.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct LogLevelArgs {
    /// Print logs at debug level (default info)
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Print logs at info level (default info)
    #[arg(short = 'I', long)]
    pub info: bool,

    /// Print logs at warn level (default info)
    #[arg(short = 'W', long)]
    pub warn: bool,

    /// Print logs at error level (default info)
    #[arg(short = 'E', long)]
    pub error: bool,
}

impl LogLevelArgs {
    pub fn level(&self) -> Level {
        if self.debug {
            Level::DEBUG
        } else if self.info {
            Level::INFO
        } else if self.warn {
            Level::WARN
        } else if self.error {
            Level::ERROR
        } else {
            Level::INFO
        }
    }
}

/// Initialize the global tracing subscriber for `bin_target` and the library.
pub fn init_tracing(bin_target: &str, level: Level) {
    use tracing_subscriber::{fmt, EnvFilter};
    let level = level.as_str().to_ascii_lowercase();
    let filter = EnvFilter::new(format!("{}={},roomie_testbed={}", bin_target, level, level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Operator banner naming the host a trace collector died on.
///
/// ```text
/// ==================================================
/// === Error running GPU profiling at host node-3. ===
/// ==================================================
/// <error chain>
/// ```
pub fn failure_banner(host: &str, err: &anyhow::Error) -> String {
    let msg = format!("=== Error running GPU profiling at host {}. ===", host);
    let frame = "=".repeat(msg.chars().count());
    format!("\n\n{}\n{}\n{}\n{:#}", frame, msg, frame, err)
}

/// Name of the local machine, or "unknown" if it cannot be read.
pub fn local_hostname() -> String {
    hostname::get()
        .unwrap_or_else(|_| "unknown".into())
        .to_string_lossy()
        .to_string()
}
