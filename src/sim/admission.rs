//! Memory admission: nothing reaches the scheduler without a block.

use crossbeam_channel::{Receiver, Sender};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

use super::job::WorkloadSpec;
use crate::{
    core::{ArrivalEvent, ArrivalMsg, CompletionEvent, MemoryEvent, MemoryOp, Ticks, WorkloadId},
    error::{Error, Result},
    exec::{ExecutionHandle, Launcher},
    memory::{Block, BuddyAllocator, block_size_for},
};

pub struct AdmissionController<L: Launcher> {
    schedule: Vec<WorkloadSpec>,
    cursor: usize,
    // Strict arrival order; only the head is ever retried first
    waiting: VecDeque<WorkloadSpec>,
    memory: BuddyAllocator,
    launcher: L,
    live: FxHashMap<WorkloadId, ExecutionHandle>,
    arrivals: Option<Sender<ArrivalMsg>>,
    completions: Receiver<CompletionEvent>,
    acks: Option<Sender<WorkloadId>>,
    exhausted_sent: bool,
}

impl<L: Launcher> AdmissionController<L> {
    pub fn new(
        mut schedule: Vec<WorkloadSpec>,
        memory_capacity: u64,
        launcher: L,
        arrivals: Sender<ArrivalMsg>,
        completions: Receiver<CompletionEvent>,
        acks: Sender<WorkloadId>,
    ) -> Result<Self> {
        let memory = BuddyAllocator::new(memory_capacity)?;

        let mut seen = FxHashSet::default();
        for spec in &schedule {
            if !seen.insert(spec.id) {
                return Err(Error::DuplicateWorkload(spec.id));
            }
            // It would sit at the head of the waiting list forever.
            if block_size_for(spec.memory_size).is_none_or(|size| size > memory_capacity) {
                return Err(Error::WorkloadTooLarge {
                    id: spec.id,
                    size: spec.memory_size,
                    capacity: memory_capacity,
                });
            }
        }
        // Stable, so equal arrival times keep their schedule order
        schedule.sort_by_key(|spec| spec.arrival_time);

        Ok(Self {
            schedule,
            cursor: 0,
            waiting: VecDeque::new(),
            memory,
            launcher,
            live: FxHashMap::default(),
            arrivals: Some(arrivals),
            completions,
            acks: Some(acks),
            exhausted_sent: false,
        })
    }

    /// Admission work for tick `now`: retry the waiting list, admit what has
    /// arrived, then hand back memory for completions reported so far.
    pub fn tick(&mut self, now: Ticks) -> Result<Vec<MemoryEvent>> {
        let mut events = Vec::new();
        self.retry_waiting(now, &mut events)?;
        self.admit_arrivals(now, &mut events)?;
        events.extend(self.process_completions(now));
        self.signal_end_of_tick();
        Ok(events)
    }

    fn retry_waiting(&mut self, now: Ticks, events: &mut Vec<MemoryEvent>) -> Result<()> {
        while let Some(spec) = self.waiting.front().cloned() {
            match self.try_admit(&spec, now)? {
                Some(event) => {
                    self.waiting.pop_front();
                    events.push(event);
                }
                // Head-of-line blocking: later, smaller specs keep waiting too.
                None => break,
            }
        }
        Ok(())
    }

    fn admit_arrivals(&mut self, now: Ticks, events: &mut Vec<MemoryEvent>) -> Result<()> {
        while let Some(spec) = self
            .schedule
            .get(self.cursor)
            .filter(|spec| spec.arrival_time <= now)
            .cloned()
        {
            self.cursor += 1;
            // Nobody overtakes the waiting list, even if memory is free for them.
            if !self.waiting.is_empty() {
                self.waiting.push_back(spec);
                continue;
            }
            match self.try_admit(&spec, now)? {
                Some(event) => events.push(event),
                None => {
                    log::info!(
                        "t={now}: workload {} waits for {} units of memory",
                        spec.id,
                        spec.memory_size
                    );
                    self.waiting.push_back(spec);
                }
            }
        }
        Ok(())
    }

    fn try_admit(&mut self, spec: &WorkloadSpec, now: Ticks) -> Result<Option<MemoryEvent>> {
        let Some((block_id, block)) = self
            .memory
            .allocate(spec.memory_size, spec.id)
            .and_then(|id| self.memory.block(id).map(|b| (id, b.clone())))
        else {
            return Ok(None);
        };
        let handle = match self.launcher.launch(spec, now) {
            Ok(handle) => handle,
            Err(err) => {
                self.memory.deallocate(spec.id);
                return Err(err);
            }
        };
        self.live.insert(spec.id, handle.clone());

        let event = memory_event(now, MemoryOp::Allocated, spec.id, &block);

        let arrival = ArrivalEvent {
            workload_id: spec.id,
            arrival_time: spec.arrival_time,
            runtime: spec.runtime,
            priority: spec.priority,
            memory_size: spec.memory_size,
            execution_handle: handle,
            memory_block_id: block_id,
        };
        self.send(ArrivalMsg::Arrival(arrival));
        log::info!(
            "t={now}: admitted workload {} at [{}, {})",
            spec.id,
            event.start,
            event.end
        );
        Ok(Some(event))
    }

    /// Frees the blocks of every workload the scheduler reported finished and
    /// acknowledges each release.
    pub fn process_completions(&mut self, now: Ticks) -> Vec<MemoryEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.completions.try_recv() {
            let id = completion.workload_id;
            let Some(block) = self.memory.deallocate(id) else {
                log::warn!("t={now}: completion for unknown workload {id} ignored");
                continue;
            };
            self.live.remove(&id);
            events.push(memory_event(now, MemoryOp::Freed, id, &block));
            if let Some(acks) = &self.acks {
                if acks.send(id).is_err() {
                    log::warn!("scheduler gone; release of workload {id} not acknowledged");
                }
            }
        }
        events
    }

    fn signal_end_of_tick(&mut self) {
        if self.exhausted_sent {
            return;
        }
        if self.is_exhausted() {
            self.exhausted_sent = true;
            self.send(ArrivalMsg::Exhausted);
        } else {
            self.send(ArrivalMsg::EndOfTick);
        }
    }

    fn send(&self, msg: ArrivalMsg) {
        if let Some(tx) = &self.arrivals {
            if tx.send(msg).is_err() {
                log::warn!("scheduler side gone; dropping arrival message");
            }
        }
    }

    /// Schedule consumed and nobody left waiting for memory.
    pub fn is_exhausted(&self) -> bool {
        self.cursor == self.schedule.len() && self.waiting.is_empty()
    }

    pub fn is_waiting(&self, id: WorkloadId) -> bool {
        self.waiting.iter().any(|spec| spec.id == id)
    }

    pub fn memory(&self) -> &BuddyAllocator {
        &self.memory
    }

    pub fn live_handles(&self) -> usize {
        self.live.len()
    }

    /// Terminates every live unit, gives all memory back and closes both
    /// outgoing channels.
    pub fn teardown(&mut self) {
        for handle in self.live.values() {
            handle.terminate();
        }
        self.live.clear();
        self.launcher.shutdown();
        self.memory.reset();
        self.arrivals = None;
        self.acks = None;
    }
}

fn memory_event(at: Ticks, op: MemoryOp, workload: WorkloadId, block: &Block) -> MemoryEvent {
    MemoryEvent {
        at,
        op,
        workload,
        size: block.size,
        start: block.start,
        end: block.end(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::InlineLauncher;
    use crossbeam_channel::unbounded;

    struct Harness {
        admission: AdmissionController<InlineLauncher>,
        arrivals: Receiver<ArrivalMsg>,
        completions: Sender<CompletionEvent>,
        acks: Receiver<WorkloadId>,
    }

    fn harness(schedule: Vec<WorkloadSpec>, capacity: u64) -> Harness {
        let (arr_tx, arr_rx) = unbounded();
        let (comp_tx, comp_rx) = unbounded();
        let (ack_tx, ack_rx) = unbounded();
        let admission =
            AdmissionController::new(schedule, capacity, InlineLauncher, arr_tx, comp_rx, ack_tx)
                .unwrap();
        Harness {
            admission,
            arrivals: arr_rx,
            completions: comp_tx,
            acks: ack_rx,
        }
    }

    fn spec(id: WorkloadId, arrival: Ticks, memory: u64) -> WorkloadSpec {
        WorkloadSpec::new(id, arrival, 3, 1, memory)
    }

    fn arrived_ids(rx: &Receiver<ArrivalMsg>) -> Vec<WorkloadId> {
        rx.try_iter()
            .filter_map(|msg| match msg {
                ArrivalMsg::Arrival(a) => Some(a.workload_id),
                _ => None,
            })
            .collect()
    }

    fn finish(h: &Harness, id: WorkloadId, at: Ticks) {
        h.completions
            .send(CompletionEvent {
                workload_id: id,
                finish_time: at,
            })
            .unwrap();
    }

    #[test]
    fn admits_arrivals_in_schedule_order() {
        let mut h = harness(vec![spec(2, 1, 10), spec(1, 0, 10), spec(3, 1, 10)], 1024);
        let events = h.admission.tick(0).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(arrived_ids(&h.arrivals), vec![1]);

        h.admission.tick(1).unwrap();
        assert_eq!(arrived_ids(&h.arrivals), vec![2, 3]);
        assert!(h.admission.is_exhausted());
    }

    #[test]
    fn waiting_list_blocks_behind_its_head() {
        // 1 takes half, 2 needs everything, 3 would fit but arrived after 2.
        let mut h = harness(vec![spec(1, 0, 512), spec(2, 1, 1024), spec(3, 2, 256)], 1024);
        h.admission.tick(0).unwrap();
        h.admission.tick(1).unwrap();
        h.admission.tick(2).unwrap();
        assert_eq!(arrived_ids(&h.arrivals), vec![1]);
        assert!(h.admission.is_waiting(2));
        assert!(h.admission.is_waiting(3));

        // Workload 3 still fits, but the head cannot go yet.
        h.admission.tick(3).unwrap();
        assert!(arrived_ids(&h.arrivals).is_empty());

        finish(&h, 1, 3);
        let freed = h.admission.tick(4).unwrap();
        assert_eq!(freed.len(), 1);
        assert_eq!(freed[0].op, MemoryOp::Freed);
        assert_eq!(h.acks.try_recv().unwrap(), 1);

        // 2 takes all of memory, so 3 is stuck behind it again.
        h.admission.tick(5).unwrap();
        assert_eq!(arrived_ids(&h.arrivals), vec![2]);
        assert!(h.admission.is_waiting(3));
        assert!(!h.admission.is_exhausted());
    }

    #[test]
    fn unknown_completion_is_ignored() {
        let mut h = harness(vec![spec(1, 0, 8)], 64);
        h.admission.tick(0).unwrap();
        finish(&h, 99, 0);
        let events = h.admission.tick(1).unwrap();
        assert!(events.is_empty());
        assert!(h.acks.try_recv().is_err());
        assert_eq!(h.admission.memory().allocated_total(), 8);
    }

    #[test]
    fn signals_exhaustion_once() {
        let mut h = harness(vec![spec(1, 0, 8)], 64);
        h.admission.tick(0).unwrap();
        h.admission.tick(1).unwrap();
        let msgs: Vec<_> = h.arrivals.try_iter().collect();
        assert!(matches!(msgs[0], ArrivalMsg::Arrival(_)));
        assert!(matches!(msgs[1], ArrivalMsg::Exhausted));
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn rejects_unadmittable_schedules() {
        let (arr_tx, _arr_rx) = unbounded();
        let (_comp_tx, comp_rx) = unbounded();
        let (ack_tx, _ack_rx) = unbounded();
        let too_big = AdmissionController::new(
            vec![spec(1, 0, 2048)],
            1024,
            InlineLauncher,
            arr_tx.clone(),
            comp_rx.clone(),
            ack_tx.clone(),
        );
        assert!(matches!(too_big, Err(Error::WorkloadTooLarge { id: 1, .. })));

        let unrepresentable = AdmissionController::new(
            vec![spec(4, 0, u64::MAX)],
            1024,
            InlineLauncher,
            arr_tx.clone(),
            comp_rx.clone(),
            ack_tx.clone(),
        );
        assert!(matches!(
            unrepresentable,
            Err(Error::WorkloadTooLarge { id: 4, size: u64::MAX, capacity: 1024 })
        ));

        let duplicate = AdmissionController::new(
            vec![spec(1, 0, 8), spec(1, 3, 8)],
            1024,
            InlineLauncher,
            arr_tx,
            comp_rx,
            ack_tx,
        );
        assert!(matches!(duplicate, Err(Error::DuplicateWorkload(1))));
    }

    #[test]
    fn teardown_releases_memory_and_handles() {
        let mut h = harness(vec![spec(1, 0, 100), spec(2, 0, 100)], 1024);
        h.admission.tick(0).unwrap();
        assert_eq!(h.admission.live_handles(), 2);

        h.admission.teardown();
        assert_eq!(h.admission.live_handles(), 0);
        assert_eq!(h.admission.memory().free_total(), 1024);
        // Arrival sender dropped: the channel is closed once drained.
        let _ = h.arrivals.try_iter().count();
        assert!(h.arrivals.recv().is_err());
    }
}
