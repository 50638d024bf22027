pub mod driver;
pub mod event;
pub mod observer;
pub mod state;

pub use driver::SchedCore;
pub use event::{
    ArrivalEvent, ArrivalMsg, CompletionEvent, MemoryEvent, MemoryOp, SchedEvent, Transition,
};
pub use state::{
    Priority, ReadyKey, ReadyQueue, SchedCtx, Ticks, Workload, WorkloadId, WorkloadState,
};
