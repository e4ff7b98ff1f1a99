// src/lib.rs

pub mod constants;
pub mod engine; // Engine descriptors written by roomie-configure
pub mod host_spec;
pub mod logging; // Log level flags and tracing setup for both binaries
pub mod policy;
pub mod topology;
pub mod trace; // GPU trace collection for roomie-gpu-trace

pub use logging::LogLevelArgs;
