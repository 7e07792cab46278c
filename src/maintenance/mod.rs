//! Background maintenance.
//!
//! - **CancellationToken**: checkpoint flag shared with long-running passes
//! - **OptimizationScheduler**: periodic, stoppable optimizer passes

pub mod cancellation;
pub mod scheduler;

pub use cancellation::CancellationToken;
pub use scheduler::{OptimizationScheduler, SchedulerConfig};
