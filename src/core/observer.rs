use super::state::{SchedCtx, WorkloadState};

/// Cross-checks the descriptor table against the running slot and the ready
/// queue after every step. Compiled down to nothing in release builds.
#[derive(Debug, Default)]
pub struct Observer;

impl Observer {
    pub fn new() -> Self {
        Self
    }

    pub fn observe(&mut self, ctx: &SchedCtx) {
        if let Some(id) = ctx.running {
            let workload = ctx.workload(id);
            debug_assert_eq!(
                workload.state,
                WorkloadState::Running,
                "running workload {id} must be Running"
            );
            debug_assert!(
                !ctx.ready.contains(id),
                "running workload {id} must not appear in the ready queue"
            );
        }

        for id in ctx.ready.ids() {
            let workload = ctx.workload(id);
            debug_assert_eq!(
                workload.state,
                WorkloadState::Ready,
                "queued workload {id} must be Ready"
            );
            debug_assert!(
                workload.remaining_time > 0 || workload.runtime == 0,
                "queued workload {id} has nothing left to run"
            );
        }

        for (id, workload) in &ctx.workloads {
            debug_assert!(
                workload.remaining_time <= workload.runtime,
                "workload {id} remaining time exceeds its runtime"
            );
            debug_assert!(
                workload.state != WorkloadState::Running || ctx.running == Some(*id),
                "workload {id} is Running but not in the running slot"
            );
            debug_assert_eq!(
                workload.state == WorkloadState::Finished,
                workload.turnaround.is_some(),
                "workload {id} turnaround set outside of Finished"
            );
        }
    }
}
