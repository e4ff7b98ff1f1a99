//! Scheduling policies the controller can be configured with.

use anyhow::{bail, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::ENGINE_LOG_ROOT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Policy {
    Roomie,
    RoomieHeuristic,
    RoomieHeuristicV2,
    Usher,
    Infaas,
}

impl Policy {
    pub const ALL: [Policy; 5] = [
        Policy::Roomie,
        Policy::RoomieHeuristic,
        Policy::RoomieHeuristicV2,
        Policy::Usher,
        Policy::Infaas,
    ];

    /// Name used on the command line and as the config/logger subdirectory
    pub fn name(&self) -> &'static str {
        match self {
            Policy::Roomie => "roomie",
            Policy::RoomieHeuristic => "roomie_heuristic",
            Policy::RoomieHeuristicV2 => "roomie_heuristic_v2",
            Policy::Usher => "usher",
            Policy::Infaas => "infaas",
        }
    }

    /// Scheduler class name the controller instantiates.
    /// Spelling must match the controller's registry exactly.
    pub fn scheduling(&self) -> &'static str {
        match self {
            Policy::Infaas => "INFaaSSchaduling",
            Policy::Usher => "UsherSchaduling",
            Policy::Roomie => "InterferenceAwareScheduling",
            Policy::RoomieHeuristic => "HeuristicInterferenceAwareScheduling",
            Policy::RoomieHeuristicV2 => "HeuristicInterferenceAwareSchedulingV2",
        }
    }

    /// Controller log directory, `logger/<policy>`
    pub fn log_dir(&self) -> String {
        format!("{}/{}", ENGINE_LOG_ROOT, self.name())
    }

    /// Interference-aware policies run each model on its own CUDA stream
    pub fn uses_cuda_stream(&self) -> bool {
        self.name().contains("roomie")
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Policy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match Policy::ALL.iter().find(|p| p.name() == s) {
            Some(p) => Ok(*p),
            None => bail!(
                "Unsupported scheduling policy {:?}. Supported: {}",
                s,
                Policy::ALL.map(|p| p.name()).join(", ")
            ),
        }
    }
}
