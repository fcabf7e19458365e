//! Background task plumbing shared by the job queue and the service.

pub mod scheduled;
pub mod supervisor;

pub use scheduled::ScheduledTask;
pub use supervisor::{SupervisorStats, TaskSupervisor};
