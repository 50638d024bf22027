pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod exec;
pub mod memory;
pub mod scheduler;
pub mod sim;
pub mod stats;
pub mod trace;

pub use config::{PolicyKind, SimConfig};
pub use crate::core::{SchedEvent, Ticks, Transition, WorkloadId, WorkloadState};
pub use error::{Error, Result};
pub use scheduler::Policy;
pub use sim::{Sim, SimReport, WorkloadSpec};

use scheduler::{Hpf, RoundRobin, Srtn};

/// Runs `schedule` to completion under the policy named in `config`.
pub fn simulate(config: SimConfig, schedule: Vec<WorkloadSpec>) -> Result<SimReport> {
    match config.policy {
        PolicyKind::Hpf => Sim::<Hpf>::new(config, schedule)?.run(),
        PolicyKind::Srtn => Sim::<Srtn>::new(config, schedule)?.run(),
        PolicyKind::RoundRobin => Sim::<RoundRobin>::new(config, schedule)?.run(),
    }
}
