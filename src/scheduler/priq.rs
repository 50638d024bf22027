use super::{EnqueueFlags, Policy, SchedCtx, WorkloadId, check_enqueue};
use crate::{
    config::{PolicyKind, SimConfig},
    core::ReadyQueue,
};

/// Highest priority first. Lower numbers win; once a workload holds the CPU it
/// keeps it until it finishes.
#[derive(Debug, Default)]
pub struct Hpf;

impl Policy for Hpf {
    const KIND: PolicyKind = PolicyKind::Hpf;

    fn init(ctx: &mut SchedCtx, _config: &SimConfig) -> Self {
        ctx.ready = ReadyQueue::new_priq();
        Self
    }

    fn enqueue(&mut self, ctx: &mut SchedCtx, workload: WorkloadId, flags: EnqueueFlags) {
        check_enqueue(ctx, workload, flags);
        let w = ctx.workload(workload);
        let key = w.ready_key(u64::from(w.priority));
        ctx.ready_push_keyed(workload, key);
    }

    fn should_preempt(&self, _ctx: &SchedCtx, _running: WorkloadId) -> bool {
        false
    }
}

/// Shortest remaining time next. A queued key never goes stale because only the
/// running workload's remaining time changes.
#[derive(Debug, Default)]
pub struct Srtn;

impl Policy for Srtn {
    const KIND: PolicyKind = PolicyKind::Srtn;

    fn init(ctx: &mut SchedCtx, _config: &SimConfig) -> Self {
        ctx.ready = ReadyQueue::new_priq();
        Self
    }

    fn enqueue(&mut self, ctx: &mut SchedCtx, workload: WorkloadId, flags: EnqueueFlags) {
        check_enqueue(ctx, workload, flags);
        let w = ctx.workload(workload);
        let key = w.ready_key(w.remaining_time);
        ctx.ready_push_keyed(workload, key);
    }

    // Strictly shorter only; ties stay with the incumbent
    fn should_preempt(&self, ctx: &SchedCtx, running: WorkloadId) -> bool {
        let remaining = ctx.workload(running).remaining_time;
        ctx.ready
            .peek_key()
            .is_some_and(|best| best.primary < remaining)
    }
}
