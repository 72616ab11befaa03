//! Retention worker for applying configured cleanup policies.
//!
//! Policies run one after another. A policy whose engine query fails is
//! logged and recorded, and the run moves on to the next policy.

use serde::Serialize;

use crate::{
    cleaner::{CleanupReport, RetentionCleaner},
    config::{RetentionConfig, RetentionPolicy},
    engine::EngineResult,
};

/// A policy that was cut short by an engine query failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyFailure {
    pub policy: String,
    pub error: String,
}

/// Results from a single retention run.
#[derive(Debug, Default, Serialize)]
pub struct RetentionRunResult {
    /// Delete attempts across all policies, in order.
    pub report: CleanupReport,
    /// Number of policies that ran to completion.
    pub policies_completed: usize,
    /// Policies aborted by a query failure.
    pub policy_failures: Vec<PolicyFailure>,
}

impl RetentionRunResult {
    /// Check if any instances were deleted (or would have been, in dry run).
    pub fn has_deletions(&self) -> bool {
        self.report.total_attempts() > self.report.failed().count()
    }

    /// Check if any delete or any policy failed.
    pub fn has_failures(&self) -> bool {
        self.report.has_failures() || !self.policy_failures.is_empty()
    }
}

/// Starts the retention worker.
///
/// The worker runs in a loop, applying every policy at the configured
/// interval. It returns immediately when retention is disabled or has no
/// policies; otherwise it runs until the task is cancelled.
pub async fn start_retention_worker(cleaner: RetentionCleaner, config: RetentionConfig) {
    if !config.enabled {
        tracing::info!("Retention worker disabled by configuration");
        return;
    }

    if !config.has_policies() {
        tracing::info!("Retention worker enabled but no policies configured");
        return;
    }

    let dry_run_msg = if cleaner.is_dry_run() {
        " (DRY RUN)"
    } else {
        ""
    };

    tracing::info!(
        interval_hours = config.interval_hours,
        policies = config.policies.len(),
        dry_run = cleaner.is_dry_run(),
        "Starting retention worker{}",
        dry_run_msg
    );

    let interval = config.interval();

    loop {
        let result = run_retention(&cleaner, &config).await;
        log_run_result(&result, cleaner.is_dry_run());
        tokio::time::sleep(interval).await;
    }
}

/// Log the summary of one retention run.
pub fn log_run_result(result: &RetentionRunResult, dry_run: bool) {
    let dry_run_msg = if dry_run { " (DRY RUN)" } else { "" };

    if result.has_failures() {
        tracing::warn!(
            attempts = result.report.total_attempts(),
            deleted = result.report.deleted(),
            failed_deletes = result.report.failed().count(),
            failed_policies = result.policy_failures.len(),
            "Retention run finished with failures{}",
            dry_run_msg
        );
    } else if result.has_deletions() {
        tracing::info!(
            attempts = result.report.total_attempts(),
            deleted = result.report.deleted(),
            policies = result.policies_completed,
            "Retention run complete{}",
            dry_run_msg
        );
    } else {
        tracing::debug!("Retention run complete, no instances to delete");
    }
}

/// Run a single retention pass over every configured policy.
pub async fn run_retention(
    cleaner: &RetentionCleaner,
    config: &RetentionConfig,
) -> RetentionRunResult {
    let mut result = RetentionRunResult::default();

    for policy in &config.policies {
        match apply_policy(cleaner, policy, &mut result.report).await {
            Ok(()) => result.policies_completed += 1,
            Err(e) => {
                tracing::error!(
                    policy = %policy.describe(),
                    error = %e,
                    "Error applying retention policy"
                );
                result.policy_failures.push(PolicyFailure {
                    policy: policy.describe(),
                    error: e.to_string(),
                });
            }
        }
    }

    result
}

/// Apply one policy, folding its outcomes into `report` as they complete.
async fn apply_policy(
    cleaner: &RetentionCleaner,
    policy: &RetentionPolicy,
    report: &mut CleanupReport,
) -> EngineResult<()> {
    match policy {
        RetentionPolicy::StaleTasks {
            process_definition_id,
            retention_days,
        } => {
            let stale = cleaner
                .delete_stale_instances(process_definition_id, *retention_days)
                .await?;
            report.merge(stale);
        }
        RetentionPolicy::StaleTasksByKey {
            process_key,
            retention_days,
        } => {
            for definition_id in cleaner.resolve_definition_ids(process_key).await? {
                let stale = cleaner
                    .delete_stale_instances(&definition_id, *retention_days)
                    .await?;
                report.merge(stale);
            }
        }
        RetentionPolicy::AllInstances { process_key } => {
            let purged = cleaner.delete_all_instances_for_key(process_key).await?;
            report.merge(purged);
        }
    }
    Ok(())
}
