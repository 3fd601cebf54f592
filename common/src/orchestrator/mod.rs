// Fan-out orchestration for script executions and file distributions

pub mod distribution;
pub mod execution;
pub mod store;

pub use distribution::{aggregate_status, progress_percent, DistributionOrchestrator};
pub use execution::{rollup_status, ExecutionOrchestrator, LaunchedRun};
pub use store::{DbDistributionStore, DbExecutionStore, DistributionStore, ExecutionStore};
