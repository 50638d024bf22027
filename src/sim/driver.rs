use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use super::{
    admission::AdmissionController,
    job::{WorkloadRecord, WorkloadSpec},
};
use crate::{
    clock::{SimClock, TickSource},
    config::{PolicyKind, SimConfig},
    core::{MemoryEvent, SchedCore, SchedEvent, Ticks, WorkloadId, WorkloadState},
    error::Result,
    exec::{InlineLauncher, Launcher},
    memory::BuddyAllocator,
    scheduler::Policy,
    stats::PerfSummary,
    trace::Trace,
};

/// Everything that happened during one tick, memory operations first.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    pub at: Ticks,
    pub memory: Vec<MemoryEvent>,
    pub scheduling: Vec<SchedEvent>,
}

#[derive(Debug, Clone)]
pub struct SimReport {
    pub policy: PolicyKind,
    pub finished: Vec<WorkloadRecord>,
    pub summary: PerfSummary,
    pub interrupted: bool,
}

/// Wires the admission side and the scheduler together with three channels
/// and drives both from one tick source.
pub struct Sim<P: Policy, L: Launcher = InlineLauncher, C: TickSource = SimClock> {
    pub core: SchedCore<P>,
    pub admission: AdmissionController<L>,
    clock: C,
    trace: Trace,
    interrupt: Arc<AtomicBool>,
    summary: Option<PerfSummary>,
    interrupted: bool,
    torn_down: bool,
}

impl<P: Policy> Sim<P> {
    pub fn new(config: SimConfig, schedule: Vec<WorkloadSpec>) -> Result<Self> {
        Self::with_parts(config, schedule, InlineLauncher, SimClock::default())
    }
}

impl<P: Policy, L: Launcher, C: TickSource> Sim<P, L, C> {
    /// `config.policy` is overridden by `P`.
    pub fn with_parts(
        mut config: SimConfig,
        schedule: Vec<WorkloadSpec>,
        launcher: L,
        clock: C,
    ) -> Result<Self> {
        config.policy = P::KIND;
        config.validate()?;
        let trace = Trace::from_config(&config)?;

        let (arrivals_tx, arrivals_rx) = crossbeam_channel::unbounded();
        let (completions_tx, completions_rx) = crossbeam_channel::unbounded();
        let (acks_tx, acks_rx) = crossbeam_channel::unbounded();

        let admission = AdmissionController::new(
            schedule,
            config.memory_capacity,
            launcher,
            arrivals_tx,
            completions_rx,
            acks_tx,
        )?;
        let core = SchedCore::new(&config, arrivals_rx, completions_tx, acks_rx);
        log::info!(
            "simulation ready: policy={} capacity={}",
            config.policy,
            config.memory_capacity
        );

        Ok(Self {
            core,
            admission,
            clock,
            trace,
            interrupt: Arc::new(AtomicBool::new(false)),
            summary: None,
            interrupted: false,
            torn_down: false,
        })
    }

    pub fn now(&self) -> Ticks {
        self.clock.now()
    }

    pub fn is_done(&self) -> bool {
        self.summary.is_some() || self.torn_down
    }

    pub fn running(&self) -> Option<WorkloadId> {
        self.core.running()
    }

    pub fn memory(&self) -> &BuddyAllocator {
        self.admission.memory()
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn summary(&self) -> Option<&PerfSummary> {
        self.summary.as_ref()
    }

    /// Setting the flag makes `run` stop and tear down before the next tick.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Uses `flag` as the interrupt flag, typically one a signal handler was
    /// installed with before the simulation existed.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    /// True once the interrupt flag has been raised. The report then carries
    /// `interrupted`.
    pub fn check_interrupt(&mut self) -> bool {
        if self.interrupted {
            return true;
        }
        if !self.interrupt.load(Ordering::SeqCst) {
            return false;
        }
        log::warn!("interrupted at t={}", self.clock.now());
        self.interrupted = true;
        true
    }

    pub fn status(&self, id: WorkloadId) -> Option<WorkloadState> {
        if self.admission.is_waiting(id) {
            return Some(WorkloadState::PendingMemory);
        }
        self.core.status(id)
    }

    pub fn step(&mut self) -> Result<TickEvents> {
        let now = self.clock.now();
        if self.is_done() {
            return Ok(TickEvents {
                at: now,
                ..TickEvents::default()
            });
        }

        let mut memory = self.admission.tick(now)?;
        let scheduling = self.core.step(now);
        if self.core.is_terminated() {
            // The last finishers get their memory back this tick.
            memory.extend(self.admission.process_completions(now));
            self.core.collect_acks();
        }

        for event in &memory {
            self.trace.record_memory(event)?;
        }
        for event in &scheduling {
            self.trace.record_sched(event)?;
        }

        if self.core.is_terminated() {
            let summary = self.core.summary(now);
            self.trace.record_summary(&summary)?;
            self.trace.flush()?;
            self.summary = Some(summary);
        } else {
            self.clock.wait_next();
        }

        Ok(TickEvents {
            at: now,
            memory,
            scheduling,
        })
    }

    pub fn run(mut self) -> Result<SimReport> {
        while !self.is_done() && !self.check_interrupt() {
            self.step()?;
        }
        self.into_report()
    }

    /// Tears down and returns whatever has finished so far.
    pub fn into_report(mut self) -> Result<SimReport> {
        let summary = match &self.summary {
            Some(summary) => summary.clone(),
            None => self.core.summary(self.clock.now()),
        };
        self.teardown()?;
        Ok(SimReport {
            policy: P::KIND,
            finished: self.core.finished().to_vec(),
            summary,
            interrupted: self.interrupted,
        })
    }

    /// Terminates every execution unit, frees all memory, closes the logs and
    /// the channels. Only the first call does anything.
    pub fn teardown(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.torn_down, true) {
            return Ok(());
        }
        log::info!("tearing down at t={}", self.clock.now());
        self.core.teardown();
        self.admission.teardown();
        self.trace.close()
    }
}

impl<P: Policy, L: Launcher, C: TickSource> Drop for Sim<P, L, C> {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            log::error!("teardown failed: {err}");
        }
    }
}
