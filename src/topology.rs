//! Testbed topology construction and descriptor output
//!
//! The controller knows every worker; workers and query generators know
//! only the controller. Workers report on the controller's port + 1,
//! query generators submit on the controller's primary port.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::{CONTROLLER_PORT, ENGINE_LOG_ROOT, QUERY_DOMAIN, WORKER_REPORT_PORT_OFFSET};
use crate::engine::{
    ControllerParams, Engine, EngineParams, EngineType, QueryGeneratorParams, RemoteEngine, WorkerParams,
};
use crate::host_spec::{parse_worker_host, WorkerSlot};
use crate::policy::Policy;

/// Parsed configurator input, independent of argv
#[derive(Debug, Clone)]
pub struct TopologyRequest {
    pub policy: Policy,
    /// Raw `host[,platform[:count]]*` specs
    pub worker_hosts: Vec<String>,
    pub controller_host: String,
    pub query_hosts: Vec<String>,
    /// Minutes
    pub duration: f64,
    pub qps: u32,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct Topology {
    pub policy: Policy,
    pub controller: Engine,
    pub workers: Vec<Engine>,
    pub query_generators: Vec<Engine>,
}

impl Topology {
    /// Controller first, then workers, then query generators
    pub fn engines(&self) -> impl Iterator<Item = &Engine> {
        std::iter::once(&self.controller)
            .chain(self.workers.iter())
            .chain(self.query_generators.iter())
    }
}

fn worker_engine(policy: Policy, slot: WorkerSlot) -> Engine {
    let params = WorkerParams {
        log_dir: format!("{}/{}/{}", ENGINE_LOG_ROOT, policy.name(), slot.host),
        use_cuda_stream: policy.uses_cuda_stream(),
        hardware_platform: slot.hardware_platform,
        device: slot.device,
    };
    Engine::new(
        format!("{}_{}", slot.host, slot.device),
        EngineType::WorkerExecutor,
        slot.host,
        Some(slot.port),
        EngineParams::Worker(params),
    )
}

fn query_generator_engine(host: &str, req: &TopologyRequest) -> Engine {
    let params = QueryGeneratorParams {
        duration: req.duration,
        domain: QUERY_DOMAIN.iter().map(|m| m.to_string()).collect(),
        qps: req.qps,
        path: req.path.clone(),
    };
    Engine::new(
        host,
        EngineType::PoissonZipfQueryGenerator,
        host,
        None,
        EngineParams::QueryGenerator(params),
    )
}

/// Build every engine and wire their `remote_engines`.
pub fn build_topology(req: &TopologyRequest) -> Result<Topology> {
    let mut workers = Vec::new();
    for spec in &req.worker_hosts {
        let parsed = parse_worker_host(spec)
            .with_context(|| format!("Invalid --worker-host {:?}", spec))?;
        let slots = parsed.slots();
        if slots.is_empty() {
            warn!("Worker host {} declares no hardware platforms; no workers created", parsed.host);
        }
        for slot in slots {
            workers.push(worker_engine(req.policy, slot));
        }
    }

    let mut controller = Engine::new(
        req.controller_host.clone(),
        EngineType::Controller,
        req.controller_host.clone(),
        Some(CONTROLLER_PORT),
        EngineParams::Controller(ControllerParams {
            scheduling: req.policy.scheduling().to_string(),
            log_dir: req.policy.log_dir(),
        }),
    );
    controller.remote_engines = workers.iter().filter_map(Engine::address).collect();

    let mut query_generators: Vec<Engine> = req
        .query_hosts
        .iter()
        .map(|host| query_generator_engine(host, req))
        .collect();
    for generator in &mut query_generators {
        generator.remote_engines = vec![RemoteEngine::new(controller.host.clone(), CONTROLLER_PORT)];
    }
    for worker in &mut workers {
        worker.remote_engines = vec![RemoteEngine::new(
            controller.host.clone(),
            CONTROLLER_PORT + WORKER_REPORT_PORT_OFFSET,
        )];
    }

    info!(
        "Topology for {}: 1 controller, {} workers, {} query generators",
        req.policy,
        workers.len(),
        query_generators.len()
    );

    Ok(Topology {
        policy: req.policy,
        controller,
        workers,
        query_generators,
    })
}

/// `<root>/<policy>`
pub fn config_dir(root: &Path, policy: Policy) -> PathBuf {
    root.join(policy.name())
}

/// Delete every `*.json` file directly inside `dir`. Returns how many.
pub fn clear_descriptors(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false) {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            debug!("Removed stale descriptor {}", path.display());
            removed += 1;
        }
    }
    Ok(removed)
}

/// Write the topology to `<root>/<policy>/`, replacing any previous descriptors.
/// Returns the paths written, in engine order.
pub fn write_topology(topology: &Topology, root: &Path) -> Result<Vec<PathBuf>> {
    let dir = config_dir(root, topology.policy);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

    let removed = clear_descriptors(&dir)?;
    if removed > 0 {
        info!("Removed {} existing descriptors from {}", removed, dir.display());
    }

    let mut seen = HashSet::new();
    let mut written = Vec::new();
    for engine in topology.engines() {
        if !seen.insert(engine.name.as_str()) {
            warn!(
                "Engine name {} is used more than once; {} overwrites the earlier descriptor",
                engine.name,
                engine.descriptor_path(&dir).display()
            );
        }
        let path = engine.save(&dir)?;
        debug!("Wrote {}", path.display());
        written.push(path);
    }

    info!("Wrote {} descriptors to {}", written.len(), dir.display());
    Ok(written)
}
