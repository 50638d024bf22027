pub mod admission;
pub mod driver;
pub mod job;

pub use admission::AdmissionController;
pub use driver::{Sim, SimReport, TickEvents};
pub use job::{WorkloadRecord, WorkloadSpec};
