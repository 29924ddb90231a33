pub mod deploy;
pub mod events;
pub mod job;
pub mod policy;
pub mod registry;
pub mod runner;

pub use deploy::{DeployRequest, JobField};
pub use events::JobEvent;
pub use job::{ClockTime, JobSummary, TimeWindow, Weekdays};
pub use policy::Admission;
pub use registry::JobRegistry;
pub use runner::{Scheduler, TickReport};
