use super::{EnqueueFlags, Policy, SchedCtx, WorkloadId, check_enqueue};
use crate::{
    config::{PolicyKind, SimConfig},
    core::{ReadyQueue, Ticks},
};

/// Round robin over a FIFO ready queue with a fixed quantum.
#[derive(Debug)]
pub struct RoundRobin {
    quantum: Ticks,
    // Ticks used since the current workload was last handed the CPU
    consumed: Ticks,
}

impl Policy for RoundRobin {
    const KIND: PolicyKind = PolicyKind::RoundRobin;

    fn init(ctx: &mut SchedCtx, config: &SimConfig) -> Self {
        ctx.ready = ReadyQueue::new_fifo();
        Self {
            quantum: config.quantum.max(1),
            consumed: 0,
        }
    }

    fn enqueue(&mut self, ctx: &mut SchedCtx, workload: WorkloadId, flags: EnqueueFlags) {
        check_enqueue(ctx, workload, flags);
        ctx.ready_push_back(workload);
    }

    fn should_preempt(&self, _ctx: &SchedCtx, _running: WorkloadId) -> bool {
        self.consumed >= self.quantum
    }

    fn running(&mut self, _ctx: &mut SchedCtx, _workload: WorkloadId) {
        self.consumed = 0;
    }

    fn tick(&mut self, _ctx: &mut SchedCtx, _workload: WorkloadId) {
        self.consumed += 1;
    }
}
