// src/constants.rs
//
// Central location for the fixed values shared by roomie-configure and
// roomie-gpu-trace. Port numbers and names here are read by the engine
// runtime, so changing them breaks already-deployed descriptors.

use std::time::Duration;

// =============================================================================
// Topology layout
// =============================================================================

/// Primary listener port of the controller engine
pub const CONTROLLER_PORT: u16 = 8080;

/// Port of device 0 on a worker host; device N listens on WORKER_BASE_PORT + N
pub const WORKER_BASE_PORT: u16 = 8081;

/// Workers report to the controller on CONTROLLER_PORT + this offset
pub const WORKER_REPORT_PORT_OFFSET: u16 = 1;

/// Device count used when a hardware platform token carries no `:count`
pub const DEFAULT_DEVICE_COUNT: u16 = 1;

/// Default root directory for generated descriptors (config/<policy>/)
pub const DEFAULT_CONFIG_ROOT: &str = "config";

/// Root directory engines write their own logs to
pub const ENGINE_LOG_ROOT: &str = "logger";

/// Default query-generator run duration in minutes
pub const DEFAULT_QUERY_DURATION_MIN: f64 = 10.0;

/// Models the Poisson/Zipf query generator draws requests from
pub const QUERY_DOMAIN: &[&str] = &[
    "alexnet",
    "squeezenet1_1",
    "shufflenet_v2_x2_0",
    "googlenet",
    "resnet18",
    "inception_v3",
    "densenet121",
    "convnext_tiny",
    "resnet101",
    "mobilenet_v3_large",
    "mobilenet_v2",
    "maxvit_t",
    "efficientnet_v2_l",
    "wide_resnet101_2",
    "convnext_base",
    "convnext_large",
    "fcos_resnet50_fpn",
    "fasterrcnn_resnet50_fpn",
    "retinanet_resnet50_fpn_v2",
];

// =============================================================================
// GPU tracing
// =============================================================================

/// Default sampling interval for the dGPU collector (seconds)
pub const DEFAULT_SAMPLE_INTERVAL_SECS: f64 = 0.5;

/// Default period between CSV flushes
pub const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_secs(5);

/// Suffix appended to the --filename stem
pub const TRACE_FILE_SUFFIX: &str = "_gpu_trace.csv";

/// Fields queried from nvidia-smi on every dGPU sample
pub const NVIDIA_SMI_FIELDS: &[&str] = &[
    "index",
    "name",
    "utilization.gpu",
    "utilization.memory",
    "memory.used",
    "memory.total",
    "temperature.gpu",
    "power.draw",
    "clocks.sm",
    "clocks.mem",
];

/// Overrides the nvidia-smi binary used by the dGPU collector
pub const NVIDIA_SMI_ENV: &str = "ROOMIE_NVIDIA_SMI";

/// Overrides the tegrastats binary used by the iGPU collector
pub const TEGRASTATS_ENV: &str = "ROOMIE_TEGRASTATS";

/// How long roomie-gpu-trace waits for a collector to stop after a fatal error
pub const COLLECTOR_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
