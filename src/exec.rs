//! Execution units driven by the scheduler.
//!
//! A unit only ever progresses while its handle is `Running`. The scheduler
//! publishes the remaining tick count after every decrement; a unit may read it
//! to notice on its own that it is done, but the scheduler's bookkeeping is
//! what decides completion.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::{Condvar, Mutex};

use crate::{
    core::{Ticks, WorkloadId},
    error::{Error, Result},
    sim::WorkloadSpec,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// Created but never started.
    Launched,
    Running,
    Paused,
    Finished,
    Terminated,
}

#[derive(Debug)]
struct Shared {
    id: WorkloadId,
    state: Mutex<ExecState>,
    wake: Condvar,
    progress: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    shared: Arc<Shared>,
}

impl ExecutionHandle {
    pub fn new(id: WorkloadId, runtime: Ticks) -> Self {
        Self {
            shared: Arc::new(Shared {
                id,
                state: Mutex::new(ExecState::Launched),
                wake: Condvar::new(),
                progress: AtomicU64::new(runtime),
            }),
        }
    }

    pub fn id(&self) -> WorkloadId {
        self.shared.id
    }

    pub fn state(&self) -> ExecState {
        *self.shared.state.lock()
    }

    pub fn is_live(&self) -> bool {
        !matches!(self.state(), ExecState::Finished | ExecState::Terminated)
    }

    pub fn start(&self) {
        self.transition(|s| matches!(s, ExecState::Launched), ExecState::Running);
    }

    pub fn resume(&self) {
        self.transition(|s| matches!(s, ExecState::Paused), ExecState::Running);
    }

    pub fn pause(&self) {
        self.transition(|s| matches!(s, ExecState::Running), ExecState::Paused);
    }

    pub fn finish(&self) {
        self.transition(
            |s| !matches!(s, ExecState::Terminated),
            ExecState::Finished,
        );
    }

    /// Stops the unit for good. Finished units stay finished.
    pub fn terminate(&self) {
        self.transition(
            |s| !matches!(s, ExecState::Finished),
            ExecState::Terminated,
        );
    }

    fn transition(&self, allowed: impl FnOnce(ExecState) -> bool, to: ExecState) {
        let mut state = self.shared.state.lock();
        if allowed(*state) {
            *state = to;
            self.shared.wake.notify_all();
        }
    }

    pub fn publish_progress(&self, remaining: Ticks) {
        self.shared.progress.store(remaining, Ordering::Release);
    }

    pub fn progress(&self) -> Ticks {
        self.shared.progress.load(Ordering::Acquire)
    }

    /// Parks the caller until the unit may run or has been stopped, and returns
    /// the state that released it.
    pub fn wait_runnable(&self) -> ExecState {
        let mut state = self.shared.state.lock();
        while matches!(*state, ExecState::Launched | ExecState::Paused) {
            self.shared.wake.wait(&mut state);
        }
        *state
    }
}

/// Creates the execution unit for a workload that was just granted memory.
pub trait Launcher {
    fn launch(&mut self, spec: &WorkloadSpec, now: Ticks) -> Result<ExecutionHandle>;

    /// Reclaims whatever the launcher created. Called once at teardown, after
    /// every live handle has been terminated.
    fn shutdown(&mut self) {}
}

/// Handles with no unit behind them; the scheduler's accounting is the whole
/// simulation.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineLauncher;

impl Launcher for InlineLauncher {
    fn launch(&mut self, spec: &WorkloadSpec, _now: Ticks) -> Result<ExecutionHandle> {
        Ok(ExecutionHandle::new(spec.id, spec.runtime))
    }
}

/// One worker thread per workload. The worker sleeps while paused and leaves
/// once its progress counter hits zero or it is stopped.
#[derive(Debug, Default)]
pub struct ThreadLauncher {
    workers: Vec<JoinHandle<()>>,
}

const WORKER_POLL: Duration = Duration::from_millis(1);

impl ThreadLauncher {
    pub fn active_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }
}

impl Launcher for ThreadLauncher {
    fn launch(&mut self, spec: &WorkloadSpec, now: Ticks) -> Result<ExecutionHandle> {
        let handle = ExecutionHandle::new(spec.id, spec.runtime);
        let unit = handle.clone();
        let worker = thread::Builder::new()
            .name(format!("workload-{}", spec.id))
            .spawn(move || run_unit(unit))
            .map_err(|err| Error::Launch {
                id: spec.id,
                at: now,
                reason: err.to_string(),
            })?;
        self.workers.push(worker);
        Ok(handle)
    }

    fn shutdown(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("workload worker panicked before teardown");
            }
        }
    }
}

fn run_unit(unit: ExecutionHandle) {
    loop {
        if matches!(
            unit.wait_runnable(),
            ExecState::Finished | ExecState::Terminated
        ) {
            break;
        }
        if unit.progress() == 0 {
            log::trace!("workload {} observed zero progress", unit.id());
            break;
        }
        thread::park_timeout(WORKER_POLL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: WorkloadId, runtime: Ticks) -> WorkloadSpec {
        WorkloadSpec::new(id, 0, runtime, 1, 16)
    }

    #[test]
    fn handle_state_machine() {
        let handle = ExecutionHandle::new(7, 3);
        assert_eq!(handle.state(), ExecState::Launched);
        assert_eq!(handle.progress(), 3);

        // Resume before start is ignored.
        handle.resume();
        assert_eq!(handle.state(), ExecState::Launched);

        handle.start();
        handle.pause();
        assert_eq!(handle.state(), ExecState::Paused);
        handle.resume();
        assert_eq!(handle.state(), ExecState::Running);

        handle.publish_progress(0);
        handle.finish();
        handle.terminate();
        assert_eq!(handle.state(), ExecState::Finished);
        assert!(!handle.is_live());
    }

    #[test]
    fn worker_exits_on_terminate() {
        let mut launcher = ThreadLauncher::default();
        let handle = launcher.launch(&spec(1, 5), 0).unwrap();
        handle.start();
        handle.pause();
        handle.terminate();
        launcher.shutdown();
        assert_eq!(launcher.active_workers(), 0);
    }

    #[test]
    fn worker_observes_zero_progress() {
        let mut launcher = ThreadLauncher::default();
        let handle = launcher.launch(&spec(2, 1), 0).unwrap();
        handle.start();
        handle.publish_progress(0);
        // Still `Running`; the worker leaves on its own.
        launcher.shutdown();
        assert_eq!(handle.state(), ExecState::Running);
    }
}
