//! Scheduled retention for workflow engines.
//!
//! This module provides a worker that periodically applies the configured
//! policies:
//! 1. `stale_tasks`: delete instances behind old tasks of one definition
//! 2. `stale_tasks_by_key`: the same, for every definition under a key
//! 3. `all_instances`: delete every instance under a key
//!
//! Every run supports dry-run mode for testing retention policies.

mod worker;

pub use worker::{
    PolicyFailure, RetentionRunResult, log_run_result, run_retention, start_retention_worker,
};
