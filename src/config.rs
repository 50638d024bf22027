//! Simulation configuration.

use std::{fmt, path::PathBuf, str::FromStr};

use crate::{
    core::Ticks,
    error::{Error, Result},
};

pub const DEFAULT_MEMORY_CAPACITY: u64 = 1024;
pub const DEFAULT_QUANTUM: Ticks = 2;

/// Which ready-queue discipline drives the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyKind {
    /// Highest priority first, non-preemptive.
    #[default]
    Hpf,
    /// Shortest remaining time next, preemptive.
    Srtn,
    /// Round robin with a fixed quantum.
    RoundRobin,
}

impl FromStr for PolicyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hpf" => Ok(Self::Hpf),
            "srtn" | "srt" => Ok(Self::Srtn),
            "rr" => Ok(Self::RoundRobin),
            other => Err(Error::UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hpf => "hpf",
            Self::Srtn => "srtn",
            Self::RoundRobin => "rr",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub policy: PolicyKind,
    /// Only consulted by round robin.
    pub quantum: Ticks,
    pub memory_capacity: u64,
    pub scheduler_log: Option<PathBuf>,
    pub memory_log: Option<PathBuf>,
    pub perf_log: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            quantum: DEFAULT_QUANTUM,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            scheduler_log: None,
            memory_log: None,
            perf_log: None,
        }
    }
}

impl SimConfig {
    pub fn new(policy: PolicyKind) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn with_quantum(mut self, quantum: Ticks) -> Self {
        self.quantum = quantum;
        self
    }

    pub fn with_memory_capacity(mut self, capacity: u64) -> Self {
        self.memory_capacity = capacity;
        self
    }

    /// Writes all three trace files into `dir` using the conventional names.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.scheduler_log = Some(dir.join("scheduler.log"));
        self.memory_log = Some(dir.join("memory.log"));
        self.perf_log = Some(dir.join("scheduler.perf"));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory_capacity == 0 || !self.memory_capacity.is_power_of_two() {
            return Err(Error::InvalidCapacity(self.memory_capacity));
        }
        if self.policy == PolicyKind::RoundRobin && self.quantum == 0 {
            return Err(Error::InvalidQuantum);
        }
        Ok(())
    }
}
