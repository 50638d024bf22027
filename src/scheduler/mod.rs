pub mod fifo;
pub mod priq;

use crate::{
    config::{PolicyKind, SimConfig},
    core::state::{SchedCtx, WorkloadId},
};
pub use fifo::RoundRobin;
pub use priq::{Hpf, Srtn};

pub type EnqueueFlags = u64;

pub const ENQ_ARRIVAL: EnqueueFlags = 1 << 0;
pub const ENQ_PREEMPT: EnqueueFlags = 1 << 1;

/// Shared sanity checks for `Policy::enqueue`. An arrival has never run; a
/// preempted workload goes back only while it has ticks left.
pub fn check_enqueue(ctx: &SchedCtx, workload: WorkloadId, flags: EnqueueFlags) {
    let w = ctx.workload(workload);
    if flags & ENQ_ARRIVAL != 0 {
        debug_assert!(
            w.start_time.is_none(),
            "workload {workload} enqueued as an arrival after it started"
        );
    }
    if flags & ENQ_PREEMPT != 0 {
        debug_assert!(
            w.remaining_time > 0,
            "preempted workload {workload} re-queued with nothing left to run"
        );
    }
}

/// A ready-queue discipline. The core asks `should_preempt` about the running
/// workload each tick; when it says yes (or nothing runs) the core takes
/// whatever `select_next` hands back.
pub trait Policy {
    const KIND: PolicyKind;

    fn init(ctx: &mut SchedCtx, config: &SimConfig) -> Self;

    fn exit(&mut self, _ctx: &mut SchedCtx) {}

    fn enqueue(&mut self, ctx: &mut SchedCtx, workload: WorkloadId, flags: EnqueueFlags);

    fn should_preempt(&self, ctx: &SchedCtx, running: WorkloadId) -> bool;

    fn select_next(&mut self, ctx: &mut SchedCtx) -> Option<WorkloadId> {
        ctx.ready_pop()
    }

    // Workload was just handed the CPU from the ready queue
    fn running(&mut self, _ctx: &mut SchedCtx, _workload: WorkloadId) {}

    // Running workload consumed one tick
    fn tick(&mut self, _ctx: &mut SchedCtx, _workload: WorkloadId) {}
}
