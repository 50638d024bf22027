use crate::core::{Priority, Ticks, Workload, WorkloadId};

/// One line of the input schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub id: WorkloadId,
    pub arrival_time: Ticks,
    pub runtime: Ticks,
    pub priority: Priority,
    pub memory_size: u64,
}

impl WorkloadSpec {
    pub fn new(
        id: WorkloadId,
        arrival_time: Ticks,
        runtime: Ticks,
        priority: Priority,
        memory_size: u64,
    ) -> Self {
        Self {
            id,
            arrival_time,
            runtime,
            priority,
            memory_size,
        }
    }
}

/// Final figures for a workload, kept after its descriptor is released.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadRecord {
    pub id: WorkloadId,
    pub arrival_time: Ticks,
    pub runtime: Ticks,
    pub priority: Priority,
    pub start_time: Option<Ticks>,
    pub finish_time: Ticks,
    pub wait_time: Ticks,
    pub turnaround: Ticks,
    pub weighted_turnaround: Option<f64>,
}

impl WorkloadRecord {
    pub fn from_workload(workload: &Workload) -> Self {
        Self {
            id: workload.id,
            arrival_time: workload.arrival_time,
            runtime: workload.runtime,
            priority: workload.priority,
            start_time: workload.start_time,
            finish_time: workload.finish_time.unwrap_or_default(),
            wait_time: workload.wait_time,
            turnaround: workload.turnaround.unwrap_or_default(),
            weighted_turnaround: workload.weighted_turnaround,
        }
    }
}
