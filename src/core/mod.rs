pub mod archive;
pub mod layout;
pub mod locks;
pub mod models;
pub mod monthly;
pub mod orchestrator;
pub mod plugins;
pub mod queue;
pub mod retention;
pub mod schedule;
pub mod scheduler;
pub mod status;
pub mod worker;

pub use locks::{PathGuard, PathLocks};
pub use models::{CurrentJob, IntervalUnit, Job, JobDraft, QueueEntry, Status, TriggerReason};
pub use orchestrator::Orchestrator;
pub use queue::ExecutionQueue;
pub use status::{DaemonEvent, StatusPublisher};
