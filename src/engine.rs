//! Engine descriptors
//!
//! One descriptor file per logical engine of the testbed. The engine runtime
//! reads `id`, `host`, `port`, `type`, `parameters` and `remote_engines`
//! back from these files, so field names and their order are fixed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Role of an engine in the testbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineType {
    Controller,
    WorkerExecutor,
    PoissonZipfQueryGenerator,
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineType::Controller => "Controller",
            EngineType::WorkerExecutor => "WorkerExecutor",
            EngineType::PoissonZipfQueryGenerator => "PoissonZipfQueryGenerator",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerParams {
    pub scheduling: String,
    pub log_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerParams {
    pub log_dir: String,
    pub use_cuda_stream: bool,
    pub hardware_platform: String,
    pub device: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryGeneratorParams {
    /// Run duration in minutes. Whole values are written as integers.
    #[serde(serialize_with = "serialize_minutes")]
    pub duration: f64,
    pub domain: Vec<String>,
    pub qps: u32,
    /// Directory holding the query traces
    pub path: String,
}

fn serialize_minutes<S: Serializer>(minutes: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    if minutes.fract() == 0.0 && minutes.abs() < i64::MAX as f64 {
        serializer.serialize_i64(*minutes as i64)
    } else {
        serializer.serialize_f64(*minutes)
    }
}

/// Role-specific parameters, serialized without a tag so the JSON object
/// carries only the role's own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineParams {
    Controller(ControllerParams),
    Worker(WorkerParams),
    QueryGenerator(QueryGeneratorParams),
}

/// Outbound connection target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEngine {
    pub remote_host: String,
    pub remote_port: u16,
}

impl RemoteEngine {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            remote_host: host.into(),
            remote_port: port,
        }
    }
}

/// On-disk descriptor layout, in the order the fields are written
#[derive(Debug, Serialize, Deserialize)]
struct Descriptor {
    id: Option<i64>,
    host: String,
    port: Option<u16>,
    #[serde(rename = "type")]
    engine_type: EngineType,
    parameters: EngineParams,
    remote_engines: Vec<RemoteEngine>,
}

/// A named endpoint of the testbed
#[derive(Debug, Clone, PartialEq)]
pub struct Engine {
    /// Assigned by the engine runtime, never by the configurator
    pub id: Option<i64>,
    /// Filename stem of the descriptor; not written into it
    pub name: String,
    pub engine_type: EngineType,
    pub host: String,
    pub port: Option<u16>,
    pub parameters: EngineParams,
    pub remote_engines: Vec<RemoteEngine>,
}

impl Engine {
    pub fn new(
        name: impl Into<String>,
        engine_type: EngineType,
        host: impl Into<String>,
        port: Option<u16>,
        parameters: EngineParams,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            engine_type,
            host: host.into(),
            port,
            parameters,
            remote_engines: Vec::new(),
        }
    }

    /// `{host, port}` of this engine as seen from a peer.
    /// Engines without a listener have no address.
    pub fn address(&self) -> Option<RemoteEngine> {
        self.port.map(|port| RemoteEngine::new(self.host.clone(), port))
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor {
            id: self.id,
            host: self.host.clone(),
            port: self.port,
            engine_type: self.engine_type,
            parameters: self.parameters.clone(),
            remote_engines: self.remote_engines.clone(),
        }
    }

    /// Descriptor JSON with 2-space indentation
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.descriptor())
            .with_context(|| format!("Failed to serialize engine {}", self.name))
    }

    /// Path this engine is saved to inside `directory`
    pub fn descriptor_path(&self, directory: &Path) -> PathBuf {
        directory.join(format!("{}.json", self.name))
    }

    /// Write `<directory>/<name>.json`, replacing any existing file.
    pub fn save(&self, directory: &Path) -> Result<PathBuf> {
        let path = self.descriptor_path(directory);
        let json = self.to_json()?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write descriptor {}", path.display()))?;
        Ok(path)
    }

    /// Read a descriptor back; the name is taken from the file stem.
    pub fn load(path: &Path) -> Result<Self> {
        let buf = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let d: Descriptor = serde_json::from_slice(&buf)
            .with_context(|| format!("parse {}", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            id: d.id,
            name,
            engine_type: d.engine_type,
            host: d.host,
            port: d.port,
            parameters: d.parameters,
            remote_engines: d.remote_engines,
        })
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let port = self
            .port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(f, "{} [{}] {}:{}", self.name, self.engine_type, self.host, port)?;
        for remote in &self.remote_engines {
            write!(f, "\n    -> {}:{}", remote.remote_host, remote.remote_port)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn worker() -> Engine {
        let mut engine = Engine::new(
            "node-1_0",
            EngineType::WorkerExecutor,
            "node-1",
            Some(8081),
            EngineParams::Worker(WorkerParams {
                log_dir: "logger/usher/node-1".to_string(),
                use_cuda_stream: false,
                hardware_platform: "xavier".to_string(),
                device: 0,
            }),
        );
        engine.remote_engines.push(RemoteEngine::new("ctl", 8081));
        engine
    }

    #[test]
    fn test_descriptor_shape() {
        let value: Value = serde_json::from_str(&worker().to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "id": null,
                "host": "node-1",
                "port": 8081,
                "type": "WorkerExecutor",
                "parameters": {
                    "log_dir": "logger/usher/node-1",
                    "use_cuda_stream": false,
                    "hardware_platform": "xavier",
                    "device": 0
                },
                "remote_engines": [
                    { "remote_host": "ctl", "remote_port": 8081 }
                ]
            })
        );
    }

    #[test]
    fn test_descriptor_key_order_and_indent() {
        let text = worker().to_json().unwrap();
        let keys = ["\"id\"", "\"host\"", "\"port\"", "\"type\"", "\"parameters\"", "\"remote_engines\""];
        let positions: Vec<usize> = keys.iter().map(|k| text.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "keys out of order: {}", text);
        assert!(text.contains("\n  \"host\": \"node-1\""));
        assert!(text.contains("\n    \"device\": 0"));
    }

    #[test]
    fn test_query_generator_has_null_port() {
        let engine = Engine::new(
            "qg",
            EngineType::PoissonZipfQueryGenerator,
            "qg",
            None,
            EngineParams::QueryGenerator(QueryGeneratorParams {
                duration: 10.0,
                domain: vec!["alexnet".into()],
                qps: 50,
                path: "traces/".into(),
            }),
        );
        let text = engine.to_json().unwrap();
        assert!(text.contains("\"duration\": 10,"), "{}", text);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["port"], Value::Null);
        assert_eq!(value["type"], "PoissonZipfQueryGenerator");
        assert!(engine.address().is_none());
    }

    #[test]
    fn test_duration_whole_minutes_as_integer() {
        let generator = |duration: f64| {
            Engine::new(
                "qg",
                EngineType::PoissonZipfQueryGenerator,
                "qg",
                None,
                EngineParams::QueryGenerator(QueryGeneratorParams {
                    duration,
                    domain: vec![],
                    qps: 1,
                    path: String::new(),
                }),
            )
        };
        let whole: Value = serde_json::from_str(&generator(10.0).to_json().unwrap()).unwrap();
        assert_eq!(whole["parameters"]["duration"], Value::from(10));
        let partial: Value = serde_json::from_str(&generator(2.5).to_json().unwrap()).unwrap();
        assert_eq!(partial["parameters"]["duration"], Value::from(2.5));

        let dir = TempDir::new().unwrap();
        let path = generator(10.0).save(dir.path()).unwrap();
        assert_eq!(Engine::load(&path).unwrap(), generator(10.0));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let engine = worker();
        let path = engine.save(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("node-1_0.json"));

        let loaded = Engine::load(&path).unwrap();
        assert_eq!(loaded, engine);
    }

    #[test]
    fn test_params_are_not_shared_between_clones() {
        let a = worker();
        let mut b = a.clone();
        if let EngineParams::Worker(p) = &mut b.parameters {
            p.device = 3;
        }
        assert_ne!(a.parameters, b.parameters);
    }
}
