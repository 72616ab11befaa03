//! In-process workflow engine.
//!
//! Holds definitions, instances, tasks and executions in memory. Deleting an
//! instance cascades to its tasks. Delete calls are recorded and individual
//! instance deletes can be made to fail. Tests use it to exercise cleanup
//! behavior without a running engine.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{
    error::{EngineError, EngineResult},
    traits::{
        Deployment, Execution, ExecutionService, ProcessDefinition, ProcessInstance,
        RepositoryService, Task, TaskService,
    },
};

#[derive(Default)]
struct EngineState {
    definitions: Vec<ProcessDefinition>,
    instances: Vec<ProcessInstance>,
    tasks: Vec<Task>,
    executions: HashMap<String, Execution>,
    deployments: Vec<Deployment>,
    failing_deletes: HashSet<String>,
    failing_queries: HashSet<String>,
    delete_calls: Vec<String>,
    next_id: u64,
}

impl EngineState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn check_query(&self, subject: &str) -> EngineResult<()> {
        if self.failing_queries.contains(subject) {
            return Err(EngineError::Internal(format!("query failed for {subject}")));
        }
        Ok(())
    }
}

/// Workflow engine kept entirely in memory.
#[derive(Default)]
pub struct InMemoryEngine {
    state: Mutex<EngineState>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition under `key`.
    pub fn add_definition(&self, key: &str, id: &str, version: u32) {
        self.state.lock().definitions.push(ProcessDefinition {
            id: id.to_string(),
            key: key.to_string(),
            version,
            name: None,
            deployment_id: None,
        });
    }

    /// Start an instance of `definition_id` with a root execution of the same id.
    pub fn add_instance(&self, definition_id: &str, instance_id: &str) {
        let mut state = self.state.lock();
        state.instances.push(ProcessInstance {
            id: instance_id.to_string(),
            definition_id: definition_id.to_string(),
        });
        state.executions.insert(
            instance_id.to_string(),
            Execution {
                id: instance_id.to_string(),
                process_instance_id: Some(instance_id.to_string()),
            },
        );
    }

    /// Add a task owned by `instance_id`, created at `created`.
    ///
    /// The task gets its own execution pointing at the instance.
    pub fn add_task(&self, instance_id: &str, task_id: &str, created: DateTime<Utc>) {
        let mut state = self.state.lock();
        let definition_id = state
            .instances
            .iter()
            .find(|i| i.id == instance_id)
            .map(|i| i.definition_id.clone())
            .unwrap_or_default();
        let execution_id = format!("{task_id}-exec");
        state.executions.insert(
            execution_id.clone(),
            Execution {
                id: execution_id.clone(),
                process_instance_id: Some(instance_id.to_string()),
            },
        );
        state.tasks.push(Task {
            id: task_id.to_string(),
            name: None,
            created,
            execution_id,
            process_definition_id: definition_id,
        });
    }

    /// Add a task whose execution does not lead to any instance.
    ///
    /// With `execution_known` the engine still returns the execution (without an
    /// instance); otherwise the execution lookup comes back empty.
    pub fn add_orphan_task(
        &self,
        definition_id: &str,
        task_id: &str,
        created: DateTime<Utc>,
        execution_known: bool,
    ) {
        let mut state = self.state.lock();
        let execution_id = format!("{task_id}-exec");
        if execution_known {
            state.executions.insert(
                execution_id.clone(),
                Execution {
                    id: execution_id.clone(),
                    process_instance_id: None,
                },
            );
        }
        state.tasks.push(Task {
            id: task_id.to_string(),
            name: None,
            created,
            execution_id,
            process_definition_id: definition_id.to_string(),
        });
    }

    /// Make every delete of `instance_id` fail.
    pub fn fail_delete_of(&self, instance_id: &str) {
        self.state
            .lock()
            .failing_deletes
            .insert(instance_id.to_string());
    }

    /// Make queries for `subject` (a process key or definition id) fail.
    pub fn fail_queries_for(&self, subject: &str) {
        self.state
            .lock()
            .failing_queries
            .insert(subject.to_string());
    }

    /// Instance ids passed to `delete_process_instance`, in call order.
    pub fn delete_calls(&self) -> Vec<String> {
        self.state.lock().delete_calls.clone()
    }

    /// Ids of the instances still alive.
    pub fn live_instances(&self) -> Vec<String> {
        self.state
            .lock()
            .instances
            .iter()
            .map(|i| i.id.clone())
            .collect()
    }

    pub fn deployments(&self) -> Vec<Deployment> {
        self.state.lock().deployments.clone()
    }
}

#[async_trait]
impl RepositoryService for InMemoryEngine {
    async fn definitions_by_key(&self, key: &str) -> EngineResult<Vec<ProcessDefinition>> {
        let state = self.state.lock();
        state.check_query(key)?;
        Ok(state
            .definitions
            .iter()
            .filter(|d| d.key == key)
            .cloned()
            .collect())
    }

    /// Registers the resource as a deployment holding one definition, keyed
    /// by the file stem and versioned after any existing definitions of that
    /// key.
    async fn deploy_resource(&self, resource: &Path) -> EngineResult<Deployment> {
        let not_found = || EngineError::NotFound(format!("resource {}", resource.display()));
        let name = resource
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(not_found)?
            .to_string();
        let key = resource
            .file_stem()
            .and_then(|n| n.to_str())
            .ok_or_else(not_found)?
            .to_string();

        let mut state = self.state.lock();
        let deployment = Deployment {
            id: state.next_id("deployment"),
            name: Some(name),
        };
        let version = state.definitions.iter().filter(|d| d.key == key).count() as u32 + 1;
        state.definitions.push(ProcessDefinition {
            id: format!("{key}:{version}"),
            key,
            version,
            name: None,
            deployment_id: Some(deployment.id.clone()),
        });
        state.deployments.push(deployment.clone());
        Ok(deployment)
    }

    async fn delete_deployment_cascade(&self, deployment_id: &str) -> EngineResult<()> {
        let mut state = self.state.lock();
        let before = state.deployments.len();
        state.deployments.retain(|d| d.id != deployment_id);
        if state.deployments.len() == before {
            return Err(EngineError::NotFound(format!("deployment {deployment_id}")));
        }

        let removed: HashSet<String> = state
            .definitions
            .iter()
            .filter(|d| d.deployment_id.as_deref() == Some(deployment_id))
            .map(|d| d.id.clone())
            .collect();
        let removed_instances: HashSet<String> = state
            .instances
            .iter()
            .filter(|i| removed.contains(&i.definition_id))
            .map(|i| i.id.clone())
            .collect();
        state.definitions.retain(|d| !removed.contains(&d.id));
        state.instances.retain(|i| !removed.contains(&i.definition_id));
        state
            .tasks
            .retain(|t| !removed.contains(&t.process_definition_id));
        state.executions.retain(|_, e| {
            e.process_instance_id
                .as_ref()
                .is_none_or(|id| !removed_instances.contains(id))
        });
        Ok(())
    }
}

#[async_trait]
impl ExecutionService for InMemoryEngine {
    async fn instances_by_definition(
        &self,
        definition_id: &str,
    ) -> EngineResult<Vec<ProcessInstance>> {
        let state = self.state.lock();
        state.check_query(definition_id)?;
        Ok(state
            .instances
            .iter()
            .filter(|i| i.definition_id == definition_id)
            .cloned()
            .collect())
    }

    async fn find_execution(&self, execution_id: &str) -> EngineResult<Option<Execution>> {
        let state = self.state.lock();
        state.check_query(execution_id)?;
        Ok(state.executions.get(execution_id).cloned())
    }

    async fn delete_process_instance(&self, instance_id: &str) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.delete_calls.push(instance_id.to_string());

        if state.failing_deletes.contains(instance_id) {
            return Err(EngineError::Internal(format!(
                "delete rejected for {instance_id}"
            )));
        }

        let before = state.instances.len();
        state.instances.retain(|i| i.id != instance_id);
        if state.instances.len() == before {
            return Err(EngineError::NotFound(format!(
                "process instance {instance_id}"
            )));
        }

        // Tasks go with the instance. Executions are left as recorded, so a
        // task listed before the delete still resolves to the deleted instance.
        let instance_tasks: HashSet<String> = state
            .executions
            .values()
            .filter(|e| e.process_instance_id.as_deref() == Some(instance_id))
            .map(|e| e.id.clone())
            .collect();
        state
            .tasks
            .retain(|t| !instance_tasks.contains(&t.execution_id));
        Ok(())
    }
}

#[async_trait]
impl TaskService for InMemoryEngine {
    async fn tasks_by_definition(&self, definition_id: &str) -> EngineResult<Vec<Task>> {
        let state = self.state.lock();
        state.check_query(definition_id)?;
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.process_definition_id == definition_id)
            .cloned()
            .collect())
    }
}
