use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::error::EngineResult;

/// A deployed, versioned process definition.
///
/// Several definitions share one `key`, one per deployed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDefinition {
    /// Unique identifier (e.g., "loan-approval:3:7f1c...").
    pub id: String,
    /// Human-assigned process key shared across versions.
    pub key: String,
    /// Version number within the key.
    #[serde(default)]
    pub version: u32,
    /// Display name, if the model declares one.
    #[serde(default)]
    pub name: Option<String>,
    /// Deployment the definition was created by.
    #[serde(default)]
    pub deployment_id: Option<String>,
}

/// A live process instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstance {
    pub id: String,
    /// Definition this instance was started from.
    pub definition_id: String,
}

/// An outstanding user task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// When the engine created the task.
    #[serde(deserialize_with = "deserialize_engine_timestamp")]
    pub created: DateTime<Utc>,
    /// Execution backing this task. May no longer resolve to an instance.
    pub execution_id: String,
    pub process_definition_id: String,
}

/// A runtime execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: String,
    /// Owning process instance, absent once the instance is gone.
    #[serde(default)]
    pub process_instance_id: Option<String>,
}

/// Result of deploying a process resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Timestamp layout used by Camunda-style engines: `2013-01-23T13:42:42.000+0200`.
const ENGINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// Parse an engine timestamp, accepting RFC 3339 and the engine's own layout.
pub fn parse_engine_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, ENGINE_TIMESTAMP_FORMAT))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn deserialize_engine_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_engine_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid engine timestamp: {raw}")))
}

/// Definition and deployment queries.
#[async_trait]
pub trait RepositoryService: Send + Sync {
    /// All definitions registered under `key`, in the order the engine returns them.
    async fn definitions_by_key(&self, key: &str) -> EngineResult<Vec<ProcessDefinition>>;

    /// Register and activate the resource at `resource` as a new deployment.
    async fn deploy_resource(&self, resource: &Path) -> EngineResult<Deployment>;

    /// Delete a deployment and everything derived from it: definitions,
    /// instances, tasks, variables and history.
    async fn delete_deployment_cascade(&self, deployment_id: &str) -> EngineResult<()>;
}

/// Runtime instance and execution operations.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Live instances started from `definition_id`.
    async fn instances_by_definition(
        &self,
        definition_id: &str,
    ) -> EngineResult<Vec<ProcessInstance>>;

    /// Look up an execution. Returns `None` if the engine no longer knows it.
    async fn find_execution(&self, execution_id: &str) -> EngineResult<Option<Execution>>;

    /// Cascade-delete an instance with its history, variables and tasks.
    async fn delete_process_instance(&self, instance_id: &str) -> EngineResult<()>;
}

/// Task queries.
#[async_trait]
pub trait TaskService: Send + Sync {
    /// Outstanding tasks belonging to `definition_id`.
    async fn tasks_by_definition(&self, definition_id: &str) -> EngineResult<Vec<Task>>;
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_parse_engine_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2013, 1, 23, 11, 42, 42).unwrap();
        assert_eq!(
            parse_engine_timestamp("2013-01-23T13:42:42.000+0200"),
            Some(expected)
        );
        assert_eq!(
            parse_engine_timestamp("2013-01-23T11:42:42Z"),
            Some(expected)
        );
        assert_eq!(parse_engine_timestamp("23/01/2013"), None);
    }

    #[test]
    fn test_task_deserializes_engine_payload() {
        let task: Task = serde_json::from_str(
            r#"{
                "id": "t1",
                "name": "Review",
                "created": "2024-01-15T09:30:00.000+0000",
                "executionId": "e1",
                "processDefinitionId": "loan-approval:3",
                "assignee": "demo"
            }"#,
        )
        .unwrap();

        assert_eq!(task.execution_id, "e1");
        assert_eq!(task.process_definition_id, "loan-approval:3");
        assert_eq!(
            task.created,
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_execution_without_instance() {
        let execution: Execution = serde_json::from_str(r#"{"id": "e9"}"#).unwrap();
        assert!(execution.process_instance_id.is_none());
    }
}
