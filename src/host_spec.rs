//! Worker host specification parsing
//!
//! A worker host argument names a machine and the accelerators it exposes:
//!
//! - `estats-1` → host with no devices (produces no workers)
//! - `estats-1,xavier:4` → four `xavier` devices
//! - `estats-1,xavier:4,nvidia_a100` → four `xavier` plus one `nvidia_a100`
//!
//! Device indices restart at 0 for every platform token.

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::constants::{DEFAULT_DEVICE_COUNT, WORKER_BASE_PORT};

/// `name[:count]`, name made of word characters and dashes
const PLATFORM_TOKEN_PATTERN: &str = r"^([\w-]+):?(\d+)?";

/// One `hardware_platform[:count]` token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSpec {
    pub hardware_platform: String,
    pub devices: u16,
}

/// Parsed `host[,hardware_platform[:count]]*` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHostSpec {
    pub host: String,
    pub platforms: Vec<PlatformSpec>,
}

/// A single worker instance derived from a host spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSlot {
    pub host: String,
    pub hardware_platform: String,
    pub device: u16,
    pub port: u16,
}

impl WorkerHostSpec {
    /// Expand into one slot per device, platform-major then device-minor.
    pub fn slots(&self) -> Vec<WorkerSlot> {
        let mut slots = Vec::new();
        for platform in &self.platforms {
            for device in 0..platform.devices {
                slots.push(WorkerSlot {
                    host: self.host.clone(),
                    hardware_platform: platform.hardware_platform.clone(),
                    device,
                    port: WORKER_BASE_PORT + device,
                });
            }
        }
        slots
    }
}

/// Parse one `--worker-host` argument.
///
/// Tokens that do not start with a platform name are skipped, same as an
/// absent token. An explicit `:0` count yields no devices for that token.
pub fn parse_worker_host(input: &str) -> Result<WorkerHostSpec> {
    let mut parts = input.split(',');
    let host = parts.next().unwrap_or_default().trim();
    if host.is_empty() {
        bail!("Worker host spec has no host name: {:?}", input);
    }

    let re = Regex::new(PLATFORM_TOKEN_PATTERN).context("Invalid platform token pattern")?;
    let mut platforms = Vec::new();
    for token in parts {
        let Some(caps) = re.captures(token) else {
            tracing::debug!("Ignoring unrecognized hardware token {:?} for host {}", token, host);
            continue;
        };
        let devices = match caps.get(2) {
            Some(count) => count
                .as_str()
                .parse::<u16>()
                .map_err(|e| anyhow::anyhow!("Invalid device count in {:?}: {}", token, e))?,
            None => DEFAULT_DEVICE_COUNT,
        };
        if devices > u16::MAX - WORKER_BASE_PORT + 1 {
            bail!("Too many devices in {:?}: ports would exceed {}", token, u16::MAX);
        }
        platforms.push(PlatformSpec {
            hardware_platform: caps[1].to_string(),
            devices,
        });
    }

    Ok(WorkerHostSpec {
        host: host.to_string(),
        platforms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_without_platforms_has_no_slots() {
        let spec = parse_worker_host("estats-1").unwrap();
        assert_eq!(spec.host, "estats-1");
        assert!(spec.platforms.is_empty());
        assert!(spec.slots().is_empty());
    }

    #[test]
    fn test_mixed_platforms_expand_per_device() {
        let spec = parse_worker_host("h,a:2,b").unwrap();
        let slots: Vec<(String, u16, u16)> = spec
            .slots()
            .into_iter()
            .map(|s| (s.hardware_platform, s.device, s.port))
            .collect();
        assert_eq!(
            slots,
            vec![
                ("a".to_string(), 0, 8081),
                ("a".to_string(), 1, 8082),
                ("b".to_string(), 0, 8081),
            ]
        );
        assert!(spec.slots().iter().all(|s| s.host == "h"));
    }

    #[test]
    fn test_platform_names_with_underscores_and_dashes() {
        let spec = parse_worker_host("estats-1,xavier:4,nvidia_geforce_rtx_2080_ti:2,nvidia_a100").unwrap();
        assert_eq!(
            spec.platforms,
            vec![
                PlatformSpec { hardware_platform: "xavier".into(), devices: 4 },
                PlatformSpec { hardware_platform: "nvidia_geforce_rtx_2080_ti".into(), devices: 2 },
                PlatformSpec { hardware_platform: "nvidia_a100".into(), devices: 1 },
            ]
        );
        assert_eq!(spec.slots().len(), 7);
    }

    #[test]
    fn test_unmatched_tokens_are_skipped() {
        let spec = parse_worker_host("node,:3,,jetson-nano:1").unwrap();
        assert_eq!(spec.platforms.len(), 1);
        assert_eq!(spec.platforms[0].hardware_platform, "jetson-nano");
    }

    #[test]
    fn test_zero_count_yields_no_devices() {
        let spec = parse_worker_host("node,xavier:0").unwrap();
        assert_eq!(spec.platforms.len(), 1);
        assert!(spec.slots().is_empty());
    }

    #[test]
    fn test_empty_host_rejected() {
        assert!(parse_worker_host("").is_err());
        assert!(parse_worker_host(",xavier:2").is_err());
    }
}
