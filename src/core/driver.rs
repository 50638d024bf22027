use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::{
    event::{ArrivalMsg, CompletionEvent, SchedEvent, Transition},
    observer::Observer,
    state::{SchedCtx, Ticks, WorkloadId, WorkloadState},
};
use crate::{
    config::SimConfig,
    scheduler::{ENQ_ARRIVAL, ENQ_PREEMPT, Policy},
    sim::WorkloadRecord,
    stats::{PerfStats, PerfSummary},
};

/// What `decide` concluded about the CPU for this tick.
enum Decision {
    Keep(WorkloadId),
    Dispatch(Option<WorkloadId>),
}

pub struct SchedCore<P: Policy> {
    pub ctx: SchedCtx,
    pub policy: P,
    observer: Observer,
    arrivals: Receiver<ArrivalMsg>,
    completions: Option<Sender<CompletionEvent>>,
    acks: Receiver<WorkloadId>,
    stats: PerfStats,
    finished: Vec<WorkloadRecord>,
    arrivals_exhausted: bool,
    terminated: bool,
}

impl<P: Policy> SchedCore<P> {
    pub fn new(
        config: &SimConfig,
        arrivals: Receiver<ArrivalMsg>,
        completions: Sender<CompletionEvent>,
        acks: Receiver<WorkloadId>,
    ) -> Self {
        let mut ctx = SchedCtx::new();
        let policy = P::init(&mut ctx, config);
        Self {
            ctx,
            policy,
            observer: Observer::new(),
            arrivals,
            completions: Some(completions),
            acks,
            stats: PerfStats::new(),
            finished: Vec::new(),
            arrivals_exhausted: false,
            terminated: false,
        }
    }

    /// One scheduling decision for tick `now`, in this order: retire a
    /// finished workload, take in arrivals, choose who runs, switch, then charge
    /// the running workload exactly one tick.
    pub fn step(&mut self, now: Ticks) -> Vec<SchedEvent> {
        debug_assert!(!self.terminated, "step after termination");
        self.ctx.advance_to(now);
        let mut events = Vec::new();

        self.collect_acks();
        self.retire_finished(&mut events);
        self.drain_arrivals(&mut events);

        let previous = self.ctx.running;
        match self.decide() {
            Decision::Keep(id) => debug_assert_eq!(Some(id), previous),
            Decision::Dispatch(next) => self.switch(previous, next, &mut events),
        }
        self.charge_running();

        if self.arrivals_exhausted && self.ctx.is_idle() {
            log::info!("scheduler drained at t={now}");
            self.terminated = true;
        }

        self.observer.observe(&self.ctx);
        events
    }

    fn retire_finished(&mut self, events: &mut Vec<SchedEvent>) {
        let Some(id) = self.ctx.running else {
            return;
        };
        if self.ctx.workload(id).remaining_time > 0 {
            return;
        }

        let now = self.ctx.now;
        self.ctx.mark_finished(id, now);
        let workload = self.ctx.workload(id);
        workload.handle.finish();
        self.stats.record_finished(workload);
        self.finished.push(WorkloadRecord::from_workload(workload));
        events.push(SchedEvent::capture(now, workload, Transition::Finished));
        log::info!("workload {id} finished at t={now}");

        let completion = CompletionEvent {
            workload_id: id,
            finish_time: now,
        };
        if let Some(tx) = &self.completions {
            if tx.send(completion).is_err() {
                log::warn!("admission side gone; memory of workload {id} not returned");
            }
        }
    }

    fn drain_arrivals(&mut self, events: &mut Vec<SchedEvent>) {
        if self.arrivals_exhausted {
            return;
        }
        loop {
            match self.arrivals.try_recv() {
                Ok(ArrivalMsg::Arrival(arrival)) => {
                    let id = self.ctx.admit(arrival);
                    self.policy.enqueue(&mut self.ctx, id, ENQ_ARRIVAL);
                    let workload = self.ctx.workload(id);
                    events.push(SchedEvent::capture(self.ctx.now, workload, Transition::Arrived));
                }
                Ok(ArrivalMsg::EndOfTick) | Err(TryRecvError::Empty) => break,
                Ok(ArrivalMsg::Exhausted) => {
                    self.arrivals_exhausted = true;
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    log::warn!("arrival channel closed without an exhaustion notice");
                    self.arrivals_exhausted = true;
                    break;
                }
            }
        }
    }

    fn decide(&mut self) -> Decision {
        let Some(current) = self.ctx.running else {
            return Decision::Dispatch(self.policy.select_next(&mut self.ctx));
        };
        if !self.policy.should_preempt(&self.ctx, current) {
            return Decision::Keep(current);
        }

        self.ctx.mark_ready(current);
        if self.ctx.workload(current).remaining_time > 0 {
            self.policy.enqueue(&mut self.ctx, current, ENQ_PREEMPT);
        }
        Decision::Dispatch(self.policy.select_next(&mut self.ctx))
    }

    fn switch(
        &mut self,
        previous: Option<WorkloadId>,
        next: Option<WorkloadId>,
        events: &mut Vec<SchedEvent>,
    ) {
        let now = self.ctx.now;

        if let Some(prev) = previous.filter(|&p| Some(p) != next) {
            let workload = self.ctx.workload_mut(prev);
            if workload.state != WorkloadState::Finished {
                workload.handle.pause();
                workload.last_paused = Some(now);
                workload.state = WorkloadState::Ready;
                events.push(SchedEvent::capture(now, workload, Transition::Stopped));
                log::debug!("t={now}: paused workload {prev}");
            }
        }

        let Some(id) = next else {
            return;
        };
        self.ctx.set_running(id);
        // Re-picked straight off its own preemption: no pause, no resume.
        if previous != Some(id) {
            let workload = self.ctx.workload_mut(id);
            let transition = match workload.start_time {
                None => {
                    workload.start_time = Some(now);
                    workload.wait_time = now - workload.arrival_time;
                    workload.handle.start();
                    Transition::Started
                }
                Some(_) => {
                    let paused_at = workload.last_paused.take().unwrap_or(now);
                    workload.wait_time += now - paused_at;
                    workload.handle.resume();
                    Transition::Resumed
                }
            };
            events.push(SchedEvent::capture(now, workload, transition));
            log::debug!("t={now}: workload {id} {}", transition.as_str());
        }
        self.policy.running(&mut self.ctx, id);
    }

    fn charge_running(&mut self) {
        let Some(id) = self.ctx.running else {
            return;
        };
        let workload = self.ctx.workload_mut(id);
        if workload.remaining_time > 0 {
            workload.remaining_time -= 1;
            self.stats.record_busy_tick();
        }
        workload.handle.publish_progress(workload.remaining_time);
        self.policy.tick(&mut self.ctx, id);
    }

    /// Drops descriptors whose memory the admission side has confirmed freed.
    pub fn collect_acks(&mut self) {
        while let Ok(id) = self.acks.try_recv() {
            if self.ctx.release(id).is_none() {
                log::warn!("release acknowledged for unknown workload {id}");
            }
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn running(&self) -> Option<WorkloadId> {
        self.ctx.running
    }

    pub fn finished(&self) -> &[WorkloadRecord] {
        &self.finished
    }

    pub fn summary(&self, elapsed: Ticks) -> PerfSummary {
        self.stats.summarize(elapsed)
    }

    pub fn status(&self, id: WorkloadId) -> Option<WorkloadState> {
        if let Some(workload) = self.ctx.workloads.get(&id) {
            return Some(workload.state);
        }
        self.finished
            .iter()
            .any(|r| r.id == id)
            .then_some(WorkloadState::Finished)
    }

    /// Stops every live execution unit and closes the completion channel.
    pub fn teardown(&mut self) {
        for workload in self.ctx.workloads.values() {
            workload.handle.terminate();
        }
        self.policy.exit(&mut self.ctx);
        self.ctx.clear_running();
        self.completions = None;
    }
}
