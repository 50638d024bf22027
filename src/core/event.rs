use std::fmt;

use crate::{
    core::{Priority, Ticks, Workload, WorkloadId},
    exec::ExecutionHandle,
    memory::BlockId,
};

/// Admission -> scheduler: a workload now holds memory and may be scheduled.
#[derive(Debug, Clone)]
pub struct ArrivalEvent {
    pub workload_id: WorkloadId,
    pub arrival_time: Ticks,
    pub runtime: Ticks,
    pub priority: Priority,
    pub memory_size: u64,
    pub execution_handle: ExecutionHandle,
    pub memory_block_id: BlockId,
}

/// Scheduler -> admission: the workload's memory can be returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionEvent {
    pub workload_id: WorkloadId,
    pub finish_time: Ticks,
}

#[derive(Debug, Clone)]
pub enum ArrivalMsg {
    Arrival(ArrivalEvent),
    // Nothing more arrives this tick
    EndOfTick,
    // Schedule drained and nobody left waiting for memory
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Arrived,
    Started,
    Resumed,
    Stopped,
    Finished,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arrived => "arrived",
            Self::Started => "started",
            Self::Resumed => "resumed",
            Self::Stopped => "stopped",
            Self::Finished => "finished",
        }
    }
}

/// A lifecycle transition together with the descriptor fields the scheduling
/// trace reports for it.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedEvent {
    pub at: Ticks,
    pub workload: WorkloadId,
    pub transition: Transition,
    pub arrival_time: Ticks,
    pub runtime: Ticks,
    pub remaining_time: Ticks,
    pub wait_time: Ticks,
    pub turnaround: Option<Ticks>,
    pub weighted_turnaround: Option<f64>,
}

impl SchedEvent {
    pub fn capture(at: Ticks, workload: &Workload, transition: Transition) -> Self {
        Self {
            at,
            workload: workload.id,
            transition,
            arrival_time: workload.arrival_time,
            runtime: workload.runtime,
            remaining_time: workload.remaining_time,
            wait_time: workload.wait_time,
            turnaround: workload.turnaround,
            weighted_turnaround: workload.weighted_turnaround,
        }
    }
}

impl fmt::Display for SchedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "At time {} process {} {} arr {} total {} remain {} wait {}",
            self.at,
            self.workload,
            self.transition.as_str(),
            self.arrival_time,
            self.runtime,
            self.remaining_time,
            self.wait_time
        )?;
        if self.transition == Transition::Finished {
            write!(f, " TA {}", self.turnaround.unwrap_or_default())?;
            match self.weighted_turnaround {
                Some(wta) => write!(f, " WTA {wta:.2}")?,
                None => f.write_str(" WTA n/a")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOp {
    Allocated,
    Freed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryEvent {
    pub at: Ticks,
    pub op: MemoryOp,
    pub workload: WorkloadId,
    /// Block size, not the requested size.
    pub size: u64,
    pub start: u64,
    /// Exclusive.
    pub end: u64,
}

impl fmt::Display for MemoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (verb, preposition) = match self.op {
            MemoryOp::Allocated => ("allocated", "for"),
            MemoryOp::Freed => ("freed", "from"),
        };
        write!(
            f,
            "At time {} {} {} bytes {} process {} from {} to {}",
            self.at,
            verb,
            self.size,
            preposition,
            self.workload,
            self.start,
            self.end.saturating_sub(1)
        )
    }
}
