use keyed_priority_queue::KeyedPriorityQueue;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

use super::event::ArrivalEvent;
use crate::{exec::ExecutionHandle, memory::BlockId};

// Workload ids come straight from the schedule
pub type WorkloadId = u64;
pub type Ticks = u64;
pub type Priority = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadState {
    PendingMemory,
    Ready,
    Running,
    Finished,
}

/// Ordering key for the min-ordered ready queues: primary field first, then
/// arrival time, then admission order.
#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub struct ReadyKey {
    pub primary: u64,
    pub arrival: Ticks,
    pub seq: u64,
}

impl ReadyKey {
    fn as_tuple(&self) -> (u64, Ticks, u64) {
        (self.primary, self.arrival, self.seq)
    }
}

// KeyedPriorityQueue is a max-heap, so we need to flip-flop ReadyKey's Ord
impl PartialOrd for ReadyKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.as_tuple().cmp(&self.as_tuple())
    }
}

#[derive(Debug)]
pub enum ReadyQueue {
    Fifo {
        workloads: VecDeque<WorkloadId>,
    },
    Priq {
        workloads: KeyedPriorityQueue<WorkloadId, ReadyKey>,
    },
}

impl ReadyQueue {
    pub fn new_fifo() -> Self {
        Self::Fifo {
            workloads: VecDeque::new(),
        }
    }

    pub fn new_priq() -> Self {
        Self::Priq {
            workloads: KeyedPriorityQueue::new(),
        }
    }

    pub fn contains(&self, id: WorkloadId) -> bool {
        match self {
            Self::Fifo { workloads } => workloads.contains(&id),
            Self::Priq { workloads } => workloads.get_priority(&id).is_some(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Fifo { workloads } => workloads.len(),
            Self::Priq { workloads } => workloads.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Members in no particular order.
    pub fn ids(&self) -> Vec<WorkloadId> {
        match self {
            Self::Fifo { workloads } => workloads.iter().copied().collect(),
            Self::Priq { workloads } => workloads.iter().map(|(id, _)| *id).collect(),
        }
    }

    /// Key of the entry `pop` would return next; FIFO queues have none.
    pub fn peek_key(&self) -> Option<ReadyKey> {
        match self {
            Self::Fifo { .. } => None,
            Self::Priq { workloads } => workloads.peek().map(|(_, key)| *key),
        }
    }

    pub fn pop(&mut self) -> Option<WorkloadId> {
        match self {
            Self::Fifo { workloads } => workloads.pop_front(),
            Self::Priq { workloads } => workloads.pop().map(|(id, _)| id),
        }
    }
}

#[derive(Debug)]
pub struct Workload {
    pub id: WorkloadId,
    /// Admission order, the last tie-breaker in every ready queue.
    pub seq: u64,
    pub arrival_time: Ticks,
    pub runtime: Ticks,
    pub remaining_time: Ticks,
    pub priority: Priority,
    pub memory_size: u64,
    pub block: BlockId,
    pub handle: ExecutionHandle,
    pub state: WorkloadState,
    pub wait_time: Ticks,
    pub start_time: Option<Ticks>,
    pub last_paused: Option<Ticks>,
    pub finish_time: Option<Ticks>,
    pub turnaround: Option<Ticks>,
    /// `None` until finished, and stays `None` for zero-runtime workloads.
    pub weighted_turnaround: Option<f64>,
}

impl Workload {
    pub fn ready_key(&self, primary: u64) -> ReadyKey {
        ReadyKey {
            primary,
            arrival: self.arrival_time,
            seq: self.seq,
        }
    }
}

#[derive(Debug)]
pub struct SchedCtx {
    pub now: Ticks,
    pub workloads: FxHashMap<WorkloadId, Workload>,
    pub ready: ReadyQueue,
    pub running: Option<WorkloadId>,

    // Increment upon admission
    next_seq: u64,
}

impl Default for SchedCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedCtx {
    pub fn new() -> Self {
        Self {
            now: 0,
            workloads: FxHashMap::default(),
            ready: ReadyQueue::new_fifo(),
            running: None,
            next_seq: 0,
        }
    }

    pub fn advance_to(&mut self, now: Ticks) {
        debug_assert!(now >= self.now, "time went backwards: {} -> {now}", self.now);
        self.now = now;
    }

    /// Builds the descriptor for a freshly admitted workload. It starts out
    /// `Ready` but is not in the ready queue until the policy enqueues it.
    pub fn admit(&mut self, event: ArrivalEvent) -> WorkloadId {
        let id = event.workload_id;
        let seq = self.next_seq;
        self.next_seq += 1;

        let workload = Workload {
            id,
            seq,
            arrival_time: event.arrival_time,
            runtime: event.runtime,
            remaining_time: event.runtime,
            priority: event.priority,
            memory_size: event.memory_size,
            block: event.memory_block_id,
            handle: event.execution_handle,
            state: WorkloadState::Ready,
            wait_time: 0,
            start_time: None,
            last_paused: None,
            finish_time: None,
            turnaround: None,
            weighted_turnaround: None,
        };

        let previous = self.workloads.insert(id, workload);
        debug_assert!(previous.is_none(), "workload {id} admitted twice");
        id
    }

    pub fn workload(&self, id: WorkloadId) -> &Workload {
        &self.workloads[&id]
    }

    pub fn workload_mut(&mut self, id: WorkloadId) -> &mut Workload {
        self.workloads
            .get_mut(&id)
            .expect("workload missing from descriptor table")
    }

    fn check_enqueueable(&self, id: WorkloadId) {
        debug_assert!(
            !self.ready.contains(id),
            "workload {id} already present in the ready queue"
        );
        debug_assert_eq!(
            self.workload(id).state,
            WorkloadState::Ready,
            "workload {id} must be Ready when enqueued"
        );
    }

    pub fn ready_push_back(&mut self, id: WorkloadId) {
        self.check_enqueueable(id);
        match &mut self.ready {
            ReadyQueue::Fifo { workloads } => workloads.push_back(id),
            ReadyQueue::Priq { .. } => panic!("ready queue is keyed; use ready_push_keyed"),
        }
    }

    pub fn ready_push_keyed(&mut self, id: WorkloadId, key: ReadyKey) {
        self.check_enqueueable(id);
        match &mut self.ready {
            ReadyQueue::Priq { workloads } => {
                workloads.push(id, key);
            }
            ReadyQueue::Fifo { .. } => panic!("ready queue is FIFO; use ready_push_back"),
        }
    }

    pub fn ready_pop(&mut self) -> Option<WorkloadId> {
        self.ready.pop()
    }

    pub fn mark_ready(&mut self, id: WorkloadId) {
        let workload = self.workload_mut(id);
        debug_assert!(
            workload.state != WorkloadState::Finished,
            "finished workload {id} cannot become ready"
        );
        workload.state = WorkloadState::Ready;
        if self.running == Some(id) {
            self.running = None;
        }
    }

    pub fn set_running(&mut self, id: WorkloadId) {
        debug_assert!(
            !self.ready.contains(id),
            "running workload {id} must not be queued"
        );
        debug_assert!(
            self.running.is_none() || self.running == Some(id),
            "another workload is already running"
        );
        self.running = Some(id);
        self.workload_mut(id).state = WorkloadState::Running;
    }

    pub fn clear_running(&mut self) {
        self.running = None;
    }

    /// Settles the finish-time figures; only valid once per workload.
    pub fn mark_finished(&mut self, id: WorkloadId, now: Ticks) {
        let workload = self.workload_mut(id);
        debug_assert_eq!(workload.state, WorkloadState::Running);
        debug_assert_eq!(workload.remaining_time, 0);
        debug_assert!(workload.finish_time.is_none(), "workload {id} finished twice");

        let turnaround = now - workload.arrival_time;
        workload.state = WorkloadState::Finished;
        workload.finish_time = Some(now);
        workload.turnaround = Some(turnaround);
        workload.weighted_turnaround =
            (workload.runtime > 0).then(|| turnaround as f64 / workload.runtime as f64);

        if self.running == Some(id) {
            self.running = None;
        }
    }

    /// Drops a finished descriptor once its memory has been given back.
    pub fn release(&mut self, id: WorkloadId) -> Option<Workload> {
        let workload = self.workloads.remove(&id)?;
        debug_assert_eq!(
            workload.state,
            WorkloadState::Finished,
            "released workload {id} before it finished"
        );
        Some(workload)
    }

    /// Nothing running and nothing waiting to run.
    pub fn is_idle(&self) -> bool {
        self.running.is_none() && self.ready.is_empty()
    }
}
