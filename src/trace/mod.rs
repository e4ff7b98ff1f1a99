//! GPU trace collection
//!
//! A metrics source pushes one [`TraceRecord`] per sampling tick into a
//! lock-free queue; a flush loop drains the queue into an append-mode CSV
//! file every few seconds.

use anyhow::{bail, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub mod csv_writer;
pub mod logger;
pub mod runner;
pub mod source;

/// Which collector to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuType {
    /// Integrated GPU on a Jetson board (tegrastats)
    Integrated,
    /// Discrete NVIDIA GPU (nvidia-smi)
    Discrete,
}

impl FromStr for GpuType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "iGPU" => Ok(GpuType::Integrated),
            "dGPU" => Ok(GpuType::Discrete),
            other => bail!("The given gpu type is not supported: {:?} (expected iGPU or dGPU)", other),
        }
    }
}

impl fmt::Display for GpuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuType::Integrated => f.write_str("iGPU"),
            GpuType::Discrete => f.write_str("dGPU"),
        }
    }
}

/// One sampled snapshot of device metrics. Keys keep insertion order,
/// which becomes the CSV column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceRecord {
    fields: Vec<(String, Value)>,
}

impl TraceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Render a metric value as a CSV cell: strings unquoted, null empty.
pub fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
