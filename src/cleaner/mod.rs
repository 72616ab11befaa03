//! Process-instance cleanup on top of the workflow engine.
//!
//! Two policies are supported:
//! 1. Delete every live instance of every definition registered under a process key
//! 2. Delete the instances behind tasks created before a retention cutoff
//!
//! Reads (definition, instance, task and execution queries) propagate engine
//! errors and abort the call. Deletes never do: each one is attempted on its
//! own, failures are traced at warn level and recorded in the returned
//! [`CleanupReport`], and the batch carries on with the next item.

mod cutoff;
mod report;

use std::path::Path;

use chrono::{DateTime, Local, Utc};
pub use cutoff::{is_stale, retention_cutoff};
pub use report::{CleanupReport, DeletionOutcome, DeletionStatus};

use crate::engine::{Deployment, EngineResult, EngineServices, Task};

/// Deletes process instances through the engine's service facades.
pub struct RetentionCleaner {
    services: EngineServices,
    dry_run: bool,
}

impl RetentionCleaner {
    pub fn new(services: EngineServices) -> Self {
        Self {
            services,
            dry_run: false,
        }
    }

    /// Log deletes instead of sending them to the engine.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Ids of every definition registered under `process_key`, in engine order.
    pub async fn resolve_definition_ids(&self, process_key: &str) -> EngineResult<Vec<String>> {
        let definitions = self
            .services
            .repository
            .definitions_by_key(process_key)
            .await?;
        Ok(definitions.into_iter().map(|d| d.id).collect())
    }

    /// Delete every live instance of every definition under `process_key`.
    ///
    /// Instances are deleted definition by definition, in the order the engine
    /// lists them.
    pub async fn delete_all_instances_for_key(
        &self,
        process_key: &str,
    ) -> EngineResult<CleanupReport> {
        let mut report = CleanupReport::default();

        for definition_id in self.resolve_definition_ids(process_key).await? {
            let instances = self
                .services
                .execution
                .instances_by_definition(&definition_id)
                .await?;

            tracing::debug!(
                process_key = %process_key,
                process_definition_id = %definition_id,
                instances = instances.len(),
                "Deleting all instances of definition"
            );

            for instance in instances {
                report.record(self.delete_instance(&instance.id).await);
            }
        }

        Ok(report)
    }

    /// Delete the instances behind tasks of `process_definition_id` that are
    /// older than `retention_days`, counted back from the current local time.
    ///
    /// With no retention period every task qualifies.
    pub async fn delete_stale_instances(
        &self,
        process_definition_id: &str,
        retention_days: Option<u32>,
    ) -> EngineResult<CleanupReport> {
        let cutoff = retention_cutoff(Local::now(), retention_days);
        self.delete_stale_instances_before(process_definition_id, cutoff)
            .await
    }

    /// Delete the instances behind tasks of `process_definition_id` created
    /// strictly before `cutoff`. `None` selects every task.
    ///
    /// One delete is attempted per selected task, so an instance with several
    /// stale tasks may be deleted more than once; the repeats fail and are
    /// recorded like any other failed delete.
    pub async fn delete_stale_instances_before(
        &self,
        process_definition_id: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> EngineResult<CleanupReport> {
        let tasks = self
            .services
            .tasks
            .tasks_by_definition(process_definition_id)
            .await?;

        tracing::debug!(
            process_definition_id = %process_definition_id,
            cutoff = ?cutoff,
            tasks = tasks.len(),
            "Checking tasks against retention cutoff"
        );

        let mut report = CleanupReport {
            tasks_examined: tasks.len(),
            ..Default::default()
        };

        for task in tasks.iter().filter(|t| is_stale(t.created, cutoff)) {
            report.tasks_selected += 1;
            match self.resolve_process_instance_id(task).await? {
                Some(instance_id) => report.record(self.delete_instance(&instance_id).await),
                None => report.unresolved_tasks += 1,
            }
        }

        Ok(report)
    }

    /// Process instance owning `task`, if its execution still leads to one.
    ///
    /// An execution the engine no longer knows and an execution without an
    /// instance both come back as `None`; callers cannot tell them apart.
    async fn resolve_process_instance_id(&self, task: &Task) -> EngineResult<Option<String>> {
        let execution = self
            .services
            .execution
            .find_execution(&task.execution_id)
            .await?;
        Ok(execution.and_then(|e| e.process_instance_id))
    }

    /// Delete one process instance. Never fails: errors end up in the outcome.
    pub async fn delete_instance(&self, instance_id: &str) -> DeletionOutcome {
        if self.dry_run {
            tracing::info!(
                instance_id = %instance_id,
                "DRY RUN: Would delete process instance"
            );
            return DeletionOutcome {
                instance_id: instance_id.to_string(),
                status: DeletionStatus::DryRun,
            };
        }

        tracing::info!(instance_id = %instance_id, "Deleting process instance");

        let status = match self
            .services
            .execution
            .delete_process_instance(instance_id)
            .await
        {
            Ok(()) => DeletionStatus::Deleted,
            Err(e) => {
                tracing::warn!(
                    instance_id = %instance_id,
                    error = %e,
                    "Failed to delete process instance"
                );
                DeletionStatus::Failed {
                    error: e.to_string(),
                }
            }
        };

        DeletionOutcome {
            instance_id: instance_id.to_string(),
            status,
        }
    }

    /// Deploy a process resource (resolved against the engine's resource root).
    pub async fn deploy_workflow(&self, resource: impl AsRef<Path>) -> EngineResult<Deployment> {
        self.services
            .repository
            .deploy_resource(resource.as_ref())
            .await
    }

    /// Remove a deployment and ALL data derived from it: definitions,
    /// instances, tasks, variables and history. Irreversible.
    pub async fn drop_workflow(&self, deployment_id: &str) -> EngineResult<()> {
        self.services
            .repository
            .delete_deployment_cascade(deployment_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::engine::InMemoryEngine;

    fn cleaner_for(engine: &Arc<InMemoryEngine>) -> RetentionCleaner {
        RetentionCleaner::new(EngineServices::from_engine(engine.clone()))
    }

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn ids(report: &CleanupReport) -> Vec<&str> {
        report
            .outcomes
            .iter()
            .map(|o| o.instance_id.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_resolve_definition_ids_round_trips_engine_order() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.add_definition("k", "A", 1);
        engine.add_definition("k", "B", 2);
        engine.add_definition("k", "C", 3);

        let resolved = cleaner_for(&engine).resolve_definition_ids("k").await.unwrap();
        assert_eq!(resolved, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_unknown_key_deletes_nothing() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.add_definition("other", "other:1", 1);
        engine.add_instance("other:1", "i1");

        let report = cleaner_for(&engine)
            .delete_all_instances_for_key("missing")
            .await
            .unwrap();

        assert_eq!(report.total_attempts(), 0);
        assert!(engine.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_instances_in_discovery_order() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.add_definition("loan-approval", "loan-approval:3", 3);
        engine.add_definition("loan-approval", "loan-approval:4", 4);
        engine.add_instance("loan-approval:3", "i1");
        engine.add_instance("loan-approval:4", "i3");
        engine.add_instance("loan-approval:3", "i2");

        let report = cleaner_for(&engine)
            .delete_all_instances_for_key("loan-approval")
            .await
            .unwrap();

        assert_eq!(engine.delete_calls(), vec!["i1", "i2", "i3"]);
        assert_eq!(ids(&report), vec!["i1", "i2", "i3"]);
        assert_eq!(report.deleted(), 3);
        assert!(engine.live_instances().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_does_not_stop_batch() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.add_definition("loan-approval", "loan-approval:3", 3);
        engine.add_instance("loan-approval:3", "i1");
        engine.add_instance("loan-approval:3", "i2");
        engine.add_instance("loan-approval:3", "i3");
        engine.fail_delete_of("i2");

        let report = cleaner_for(&engine)
            .delete_all_instances_for_key("loan-approval")
            .await
            .unwrap();

        assert_eq!(engine.delete_calls(), vec!["i1", "i2", "i3"]);
        assert_eq!(report.deleted(), 2);
        let failed: Vec<&str> = report.failed().map(|o| o.instance_id.as_str()).collect();
        assert_eq!(failed, vec!["i2"]);
        assert_eq!(engine.live_instances(), vec!["i2"]);
    }

    #[tokio::test]
    async fn test_query_failure_aborts_bulk_delete() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.add_definition("loan-approval", "loan-approval:3", 3);
        engine.add_definition("loan-approval", "loan-approval:4", 4);
        engine.add_instance("loan-approval:3", "i1");
        engine.add_instance("loan-approval:4", "i2");
        engine.fail_queries_for("loan-approval:4");

        let result = cleaner_for(&engine)
            .delete_all_instances_for_key("loan-approval")
            .await;

        assert!(result.is_err());
        assert_eq!(engine.delete_calls(), vec!["i1"]);
    }

    #[tokio::test]
    async fn test_stale_selection_against_cutoff() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.add_definition("loan-approval", "loan-approval:3", 3);
        engine.add_instance("loan-approval:3", "old");
        engine.add_instance("loan-approval:3", "new");
        engine.add_task("old", "t-old", day(2023, 12, 1));
        engine.add_task("new", "t-new", day(2024, 1, 15));

        let cutoff = retention_cutoff(day(2024, 1, 31), Some(30));
        assert_eq!(cutoff, Some(day(2024, 1, 1)));

        let report = cleaner_for(&engine)
            .delete_stale_instances_before("loan-approval:3", cutoff)
            .await
            .unwrap();

        assert_eq!(engine.delete_calls(), vec!["old"]);
        assert_eq!(report.tasks_examined, 2);
        assert_eq!(report.tasks_selected, 1);
        assert_eq!(engine.live_instances(), vec!["new"]);
    }

    #[tokio::test]
    async fn test_task_exactly_at_cutoff_is_kept() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.add_definition("k", "k:1", 1);
        engine.add_instance("k:1", "edge");
        engine.add_instance("k:1", "just-before");
        engine.add_task("edge", "t1", day(2024, 1, 1));
        engine.add_task("just-before", "t2", day(2024, 1, 1) - Duration::milliseconds(1));

        cleaner_for(&engine)
            .delete_stale_instances_before("k:1", Some(day(2024, 1, 1)))
            .await
            .unwrap();

        assert_eq!(engine.delete_calls(), vec!["just-before"]);
    }

    #[tokio::test]
    async fn test_no_retention_selects_every_task() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.add_definition("k", "k:1", 1);
        engine.add_instance("k:1", "i1");
        engine.add_instance("k:1", "i2");
        engine.add_task("i1", "t1", Utc::now() + Duration::days(1));
        engine.add_task("i2", "t2", day(2001, 1, 1));

        let report = cleaner_for(&engine)
            .delete_stale_instances("k:1", None)
            .await
            .unwrap();

        assert_eq!(engine.delete_calls(), vec!["i1", "i2"]);
        assert_eq!(report.tasks_selected, 2);
    }

    #[tokio::test]
    async fn test_recent_tasks_survive_local_time_cutoff() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.add_definition("k", "k:1", 1);
        engine.add_instance("k:1", "fresh");
        engine.add_instance("k:1", "stale");
        engine.add_task("fresh", "t1", Utc::now() - Duration::days(1));
        engine.add_task("stale", "t2", Utc::now() - Duration::days(45));

        cleaner_for(&engine)
            .delete_stale_instances("k:1", Some(30))
            .await
            .unwrap();

        assert_eq!(engine.delete_calls(), vec!["stale"]);
    }

    #[tokio::test]
    async fn test_unresolvable_tasks_are_skipped_silently() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.add_definition("k", "k:1", 1);
        engine.add_orphan_task("k:1", "no-instance", day(2020, 1, 1), true);
        engine.add_orphan_task("k:1", "no-execution", day(2020, 1, 1), false);

        let report = cleaner_for(&engine)
            .delete_stale_instances("k:1", Some(1))
            .await
            .unwrap();

        assert!(engine.delete_calls().is_empty());
        assert_eq!(report.total_attempts(), 0);
        assert_eq!(report.tasks_selected, 2);
        assert_eq!(report.unresolved_tasks, 2);
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn test_instance_with_several_stale_tasks_is_deleted_per_task() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.add_definition("k", "k:1", 1);
        engine.add_instance("k:1", "i1");
        engine.add_instance("k:1", "i2");
        engine.add_task("i1", "t1", day(2020, 1, 1));
        engine.add_task("i1", "t2", day(2020, 1, 2));
        engine.add_task("i2", "t3", day(2020, 1, 3));

        let report = cleaner_for(&engine)
            .delete_stale_instances("k:1", Some(30))
            .await
            .unwrap();

        assert_eq!(engine.delete_calls(), vec!["i1", "i1", "i2"]);
        let statuses: Vec<bool> = report.outcomes.iter().map(|o| o.is_failure()).collect();
        assert_eq!(statuses, vec![false, true, false]);
        assert_eq!(report.deleted(), 2);
    }

    #[tokio::test]
    async fn test_task_query_failure_propagates() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.fail_queries_for("k:1");

        let result = cleaner_for(&engine)
            .delete_stale_instances("k:1", Some(30))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_instance_never_errors() {
        let engine = Arc::new(InMemoryEngine::new());
        let cleaner = cleaner_for(&engine);

        let outcome = cleaner.delete_instance("ghost").await;
        assert_eq!(outcome.instance_id, "ghost");
        assert!(outcome.is_failure());
        assert_eq!(engine.delete_calls(), vec!["ghost"]);
    }

    #[tokio::test]
    async fn test_dry_run_skips_engine_deletes() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.add_definition("k", "k:1", 1);
        engine.add_instance("k:1", "i1");

        let cleaner = cleaner_for(&engine).with_dry_run(true);
        let report = cleaner.delete_all_instances_for_key("k").await.unwrap();

        assert!(engine.delete_calls().is_empty());
        assert_eq!(report.outcomes[0].status, DeletionStatus::DryRun);
        assert_eq!(engine.live_instances(), vec!["i1"]);
    }

    #[tokio::test]
    async fn test_deploy_and_drop_pass_through() {
        let engine = Arc::new(InMemoryEngine::new());
        let cleaner = cleaner_for(&engine);

        let deployment = cleaner.deploy_workflow("processes/loan.bpmn").await.unwrap();
        assert_eq!(engine.deployments().len(), 1);
        assert_eq!(cleaner.resolve_definition_ids("loan").await.unwrap(), vec!["loan:1"]);
        engine.add_instance("loan:1", "i1");
        engine.add_task("i1", "t1", Utc::now());

        cleaner.drop_workflow(&deployment.id).await.unwrap();
        assert!(engine.deployments().is_empty());
        assert!(cleaner.resolve_definition_ids("loan").await.unwrap().is_empty());
        assert!(engine.live_instances().is_empty());
        let report = cleaner.delete_stale_instances("loan:1", None).await.unwrap();
        assert_eq!(report.tasks_examined, 0);
        assert!(cleaner.drop_workflow(&deployment.id).await.is_err());
    }
}
