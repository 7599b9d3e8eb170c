//! Bulk placement job: build a batch, submit it as one job, poll, report.

pub mod error;
pub mod operations;
pub mod poll;
pub mod report;
pub mod runner;

pub use error::BulkJobError;
pub use operations::PlacementGenerator;
pub use poll::PollSchedule;
pub use runner::BulkJobRunner;
