//! GPU metrics sources
//!
//! Sources block their thread and push one record per sampling tick. There
//! is no timeout around a tick: a hung vendor tool stalls collection.

use anyhow::{bail, Context, Result};
use chrono::Local;
use regex::Regex;
use serde_json::Value;
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::logger::TraceSink;
use super::TraceRecord;
use crate::constants::NVIDIA_SMI_FIELDS;

pub trait MetricsSource: Send {
    fn name(&self) -> &'static str;

    /// Collect until the underlying tool stops, it fails, or `sink` is
    /// closed.
    fn run(&mut self, sink: TraceSink) -> Result<()>;
}

/// Numbers become JSON numbers, anything else (`[N/A]`, names) stays text.
fn metric_value(raw: &str) -> Value {
    match raw.parse::<f64>() {
        Ok(v) if raw.contains('.') => Value::from(v),
        Ok(v) => raw.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::from(v)),
        Err(_) => Value::from(raw),
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

// -----------------------------------------------------------------------------
// dGPU: nvidia-smi
// -----------------------------------------------------------------------------

/// Polls `nvidia-smi` every `interval` and merges all devices into a record
/// keyed `gpu:<index>/<field>`.
pub struct DgpuSource {
    interval: Duration,
    program: String,
}

impl DgpuSource {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            program: "nvidia-smi".to_string(),
        }
    }

    /// Run a different nvidia-smi binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn query_args() -> Vec<String> {
        vec![
            format!("--query-gpu={}", NVIDIA_SMI_FIELDS.join(",")),
            "--format=csv,noheader,nounits".to_string(),
        ]
    }

    fn sample(&self) -> Result<TraceRecord> {
        let output = Command::new(&self.program)
            .args(Self::query_args())
            .output()
            .with_context(|| format!("Failed to run {}", self.program))?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        parse_nvidia_smi_output(&String::from_utf8_lossy(&output.stdout), timestamp())
    }
}

impl MetricsSource for DgpuSource {
    fn name(&self) -> &'static str {
        "nvidia-smi"
    }

    fn run(&mut self, sink: TraceSink) -> Result<()> {
        info!("Sampling {} every {:?}", self.program, self.interval);
        while !sink.is_closed() {
            let record = self.sample()?;
            sink.log(record);
            std::thread::sleep(self.interval);
        }
        debug!("Trace sink closed; {} sampling stopped", self.program);
        Ok(())
    }
}

/// Parse `--format=csv,noheader,nounits` output, one line per device in
/// NVIDIA_SMI_FIELDS order.
pub fn parse_nvidia_smi_output(text: &str, timestamp: String) -> Result<TraceRecord> {
    let mut record = TraceRecord::new().with("timestamp", timestamp);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut devices = 0;
    for row in rdr.records() {
        let row = row.context("Malformed nvidia-smi output")?;
        if row.len() != NVIDIA_SMI_FIELDS.len() {
            bail!(
                "nvidia-smi returned {} fields, expected {}: {:?}",
                row.len(),
                NVIDIA_SMI_FIELDS.len(),
                row
            );
        }
        let index = &row[0];
        for (field, raw) in NVIDIA_SMI_FIELDS.iter().zip(row.iter()).skip(1) {
            record.insert(format!("gpu:{}/{}", index, field), metric_value(raw));
        }
        devices += 1;
    }
    if devices == 0 {
        bail!("nvidia-smi reported no devices");
    }
    Ok(record)
}

// -----------------------------------------------------------------------------
// iGPU: tegrastats
// -----------------------------------------------------------------------------

/// Streams `tegrastats` and pushes one record per output line while the
/// tool keeps running. Uses tegrastats' own cadence.
pub struct IgpuSource {
    program: String,
}

impl IgpuSource {
    pub fn new() -> Self {
        Self {
            program: "tegrastats".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for IgpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for IgpuSource {
    fn name(&self) -> &'static str {
        "tegrastats"
    }

    fn run(&mut self, sink: TraceSink) -> Result<()> {
        let mut child = Command::new(&self.program)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.program))?;
        let stdout = child
            .stdout
            .take()
            .context("tegrastats stdout was not captured")?;
        info!("Streaming {} (pid {})", self.program, child.id());

        let parser = TegrastatsParser::new()?;
        for line in BufReader::new(stdout).lines() {
            if sink.is_closed() {
                debug!("Trace sink closed; stopping {}", self.program);
                // Already exited if kill fails; wait reaps it either way
                let _ = child.kill();
                child.wait().context("Failed to wait for tegrastats")?;
                return Ok(());
            }
            let line = line.context("Failed to read tegrastats output")?;
            if line.trim().is_empty() {
                continue;
            }
            let record = parser.parse(&line, timestamp());
            if record.len() <= 1 {
                debug!("No metrics in tegrastats line: {}", line);
                continue;
            }
            sink.log(record);
        }

        let status = child.wait().context("Failed to wait for tegrastats")?;
        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        warn!("{} output ended; collection stopped", self.program);
        Ok(())
    }
}

/// Extracts metrics from one tegrastats line, e.g.
/// `RAM 2715/15823MB (lfb 2979x4MB) SWAP 0/7911MB (cached 0MB) CPU [3%@1190,off]
///  EMC_FREQ 0%@1600 GR3D_FREQ 0%@114 GPU@37.5C VDD_IN 3440/3440`
pub struct TegrastatsParser {
    ram: Regex,
    swap: Regex,
    cpu: Regex,
    freq: Regex,
    temp: Regex,
    power: Regex,
}

impl TegrastatsParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            ram: Regex::new(r"\bRAM (\d+)/(\d+)MB").context("ram pattern")?,
            swap: Regex::new(r"\bSWAP (\d+)/(\d+)MB").context("swap pattern")?,
            cpu: Regex::new(r"\bCPU \[([^\]]*)\]").context("cpu pattern")?,
            freq: Regex::new(r"\b(\w+)_FREQ (\d+)%(?:@(\d+))?").context("freq pattern")?,
            temp: Regex::new(r"\b(\w+)@(-?\d+(?:\.\d+)?)C\b").context("temp pattern")?,
            power: Regex::new(r"\b([A-Za-z]\w*) (\d+)(?:mW)?/(\d+)(?:mW)?\b").context("power pattern")?,
        })
    }

    pub fn parse(&self, line: &str, timestamp: String) -> TraceRecord {
        let mut record = TraceRecord::new().with("timestamp", timestamp);

        if let Some(c) = self.ram.captures(line) {
            record.insert("RAM used (MB)", metric_value(&c[1]));
            record.insert("RAM total (MB)", metric_value(&c[2]));
        }
        if let Some(c) = self.swap.captures(line) {
            record.insert("SWAP used (MB)", metric_value(&c[1]));
            record.insert("SWAP total (MB)", metric_value(&c[2]));
        }
        if let Some(c) = self.cpu.captures(line) {
            for (i, core) in c[1].split(',').enumerate() {
                let key = format!("CPU{}", i + 1);
                match core.split_once("%@") {
                    Some((load, freq)) => {
                        record.insert(format!("{} (%)", key), metric_value(load));
                        record.insert(format!("{} (MHz)", key), metric_value(freq));
                    }
                    None => {
                        // "off" or a bare load without frequency
                        let load = core.trim_end_matches('%');
                        record.insert(format!("{} (%)", key), metric_value(load));
                        record.insert(format!("{} (MHz)", key), Value::Null);
                    }
                }
            }
        }
        for c in self.freq.captures_iter(line) {
            record.insert(format!("{}_FREQ (%)", &c[1]), metric_value(&c[2]));
            let mhz = c.get(3).map(|m| metric_value(m.as_str())).unwrap_or(Value::Null);
            record.insert(format!("{}_FREQ (MHz)", &c[1]), mhz);
        }
        for c in self.temp.captures_iter(line) {
            record.insert(format!("{} temp (C)", &c[1]), metric_value(&c[2]));
        }
        for c in self.power.captures_iter(line) {
            let rail = &c[1];
            if rail == "RAM" || rail == "SWAP" {
                continue;
            }
            record.insert(format!("{} power (mW)", rail), metric_value(&c[2]));
            record.insert(format!("{} avg power (mW)", rail), metric_value(&c[3]));
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XAVIER_LINE: &str = "RAM 2715/15823MB (lfb 2979x4MB) SWAP 0/7911MB (cached 0MB) \
        CPU [3%@1190,2%@1190,off,off] EMC_FREQ 0%@1600 GR3D_FREQ 12%@114 APE 150 \
        AO@38C GPU@37.5C Tboard@35C VDD_IN 3440/3440 VDD_CPU_GPU_CV 458/458";

    #[test]
    fn test_metric_value_types() {
        assert_eq!(metric_value("42"), Value::from(42));
        assert_eq!(metric_value("55.20"), Value::from(55.2));
        assert_eq!(metric_value("[N/A]"), Value::from("[N/A]"));
    }

    #[test]
    fn test_parse_nvidia_smi_two_devices() {
        let text = "0, NVIDIA A100-SXM4-40GB, 87, 41, 30012, 40960, 61, 312.45, 1410, 1215\n\
                    1, NVIDIA A100-SXM4-40GB, 0, 0, 4, 40960, 33, [N/A], 210, 1215\n";
        let record = parse_nvidia_smi_output(text, "t0".to_string()).unwrap();

        assert_eq!(record.keys().next(), Some("timestamp"));
        assert_eq!(record.len(), 1 + 2 * (NVIDIA_SMI_FIELDS.len() - 1));
        assert_eq!(record.get("gpu:0/utilization.gpu"), Some(&Value::from(87)));
        assert_eq!(record.get("gpu:0/power.draw"), Some(&Value::from(312.45)));
        assert_eq!(record.get("gpu:1/power.draw"), Some(&Value::from("[N/A]")));
        assert_eq!(record.get("gpu:1/name"), Some(&Value::from("NVIDIA A100-SXM4-40GB")));
    }

    #[test]
    fn test_parse_nvidia_smi_rejects_empty_and_short() {
        assert!(parse_nvidia_smi_output("", "t".to_string()).is_err());
        assert!(parse_nvidia_smi_output("0, A100, 5\n", "t".to_string()).is_err());
    }

    #[test]
    fn test_tegrastats_memory_and_cpu() {
        let parser = TegrastatsParser::new().unwrap();
        let record = parser.parse(XAVIER_LINE, "t".to_string());

        assert_eq!(record.get("RAM used (MB)"), Some(&Value::from(2715)));
        assert_eq!(record.get("RAM total (MB)"), Some(&Value::from(15823)));
        assert_eq!(record.get("SWAP used (MB)"), Some(&Value::from(0)));
        assert_eq!(record.get("CPU1 (%)"), Some(&Value::from(3)));
        assert_eq!(record.get("CPU2 (MHz)"), Some(&Value::from(1190)));
        assert_eq!(record.get("CPU3 (%)"), Some(&Value::from("off")));
    }

    #[test]
    fn test_tegrastats_freq_temp_power() {
        let parser = TegrastatsParser::new().unwrap();
        let record = parser.parse(XAVIER_LINE, "t".to_string());

        assert_eq!(record.get("GR3D_FREQ (%)"), Some(&Value::from(12)));
        assert_eq!(record.get("GR3D_FREQ (MHz)"), Some(&Value::from(114)));
        assert_eq!(record.get("EMC_FREQ (%)"), Some(&Value::from(0)));
        assert_eq!(record.get("GPU temp (C)"), Some(&Value::from(37.5)));
        assert_eq!(record.get("Tboard temp (C)"), Some(&Value::from(35)));
        assert_eq!(record.get("VDD_IN power (mW)"), Some(&Value::from(3440)));
        assert_eq!(record.get("VDD_CPU_GPU_CV avg power (mW)"), Some(&Value::from(458)));
        assert!(record.get("RAM power (mW)").is_none());
    }

    #[test]
    fn test_tegrastats_milliwatt_suffix() {
        let parser = TegrastatsParser::new().unwrap();
        let record = parser.parse("RAM 1/2MB VDD_IN 5002mW/4990mW", "t".to_string());
        assert_eq!(record.get("VDD_IN power (mW)"), Some(&Value::from(5002)));
        assert_eq!(record.get("VDD_IN avg power (mW)"), Some(&Value::from(4990)));
    }

    #[test]
    fn test_tegrastats_hotplug_keeps_key_set() {
        let parser = TegrastatsParser::new().unwrap();
        let offline = parser.parse("RAM 1/2MB CPU [3%@1190,off] EMC_FREQ 0% GR3D_FREQ 0%@114", "t0".to_string());
        let online = parser.parse("RAM 1/2MB CPU [3%@1190,5%@1190] EMC_FREQ 0%@1600 GR3D_FREQ 0%@114", "t1".to_string());

        assert_eq!(offline.keys().collect::<Vec<_>>(), online.keys().collect::<Vec<_>>());
        assert_eq!(offline.get("CPU2 (MHz)"), Some(&Value::Null));
        assert_eq!(offline.get("EMC_FREQ (MHz)"), Some(&Value::Null));
        assert_eq!(online.get("CPU2 (MHz)"), Some(&Value::from(1190)));
    }

    #[test]
    fn test_tegrastats_same_line_same_keys() {
        let parser = TegrastatsParser::new().unwrap();
        let a = parser.parse(XAVIER_LINE, "t0".to_string());
        let b = parser.parse(XAVIER_LINE, "t1".to_string());
        assert_eq!(a.keys().collect::<Vec<_>>(), b.keys().collect::<Vec<_>>());
    }
}
