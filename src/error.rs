use crate::core::{Ticks, WorkloadId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("memory capacity {0} must be a non-zero power of two")]
    InvalidCapacity(u64),
    #[error("round robin requires a quantum of at least one tick")]
    InvalidQuantum,
    #[error("workload {id} needs {size} units but memory capacity is {capacity}")]
    WorkloadTooLarge { id: WorkloadId, size: u64, capacity: u64 },
    #[error("workload {0} appears more than once in the schedule")]
    DuplicateWorkload(WorkloadId),
    #[error("failed to launch workload {id} at t={at}: {reason}")]
    Launch {
        id: WorkloadId,
        at: Ticks,
        reason: String,
    },
    #[error("unknown scheduling policy `{0}` (expected hpf, srtn or rr)")]
    UnknownPolicy(String),
    #[error("trace log i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
