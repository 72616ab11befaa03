//! REST client for Camunda-compatible workflow engines.
//!
//! Talks to the engine's REST API (`/engine-rest` on a default Camunda 7
//! install, or any engine exposing the same resources).
//!
//! # Example Configuration
//!
//! ```toml
//! [engine]
//! base_url = "http://localhost:8080/engine-rest"
//! username = "${ENGINE_USER}"
//! password = "${ENGINE_PASSWORD}"
//! timeout_secs = 30
//! resource_root = "./processes"
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, multipart};
use serde::{Deserialize, de::DeserializeOwned};
use url::Url;

use super::{
    error::{EngineError, EngineResult},
    traits::{
        Deployment, Execution, ExecutionService, ProcessDefinition, ProcessInstance,
        RepositoryService, Task, TaskService,
    },
};
use crate::config::EngineConfig;

/// Error body returned by the engine on failed requests.
#[derive(Debug, Deserialize)]
struct EngineErrorBody {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    message: String,
}

/// Workflow engine reached over its REST API.
pub struct RestEngine {
    client: Client,
    base_url: Url,
    credentials: Option<(String, String)>,
    resource_root: PathBuf,
}

impl RestEngine {
    /// Creates a client for the engine at `base_url`.
    pub fn new(client: Client, base_url: &str) -> EngineResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| EngineError::Internal(format!("invalid engine URL {base_url}: {e}")))?;
        Ok(Self {
            client,
            base_url,
            credentials: None,
            resource_root: PathBuf::from("."),
        })
    }

    /// Builds a client from the `[engine]` configuration section.
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        let mut engine =
            Self::new(client, &config.base_url)?.with_resource_root(&config.resource_root);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            engine = engine.with_basic_auth(username, password);
        }
        Ok(engine)
    }

    /// Authenticate every request with HTTP basic auth.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Directory that relative deployment resources are resolved against.
    pub fn with_resource_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.resource_root = root.into();
        self
    }

    /// Build an endpoint URL from path segments, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> EngineResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                EngineError::Internal(format!("engine URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((username, password)) => builder.basic_auth(username, Some(password)),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> EngineResult<T> {
        let url = self.endpoint(segments)?;
        let response = self
            .authorize(self.client.get(url))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(status, response).await);
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::Deserialization(format!("Failed to parse response: {}", e)))
    }

    async fn delete(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        what: String,
    ) -> EngineResult<()> {
        let url = self.endpoint(segments)?;
        let response = self
            .authorize(self.client.delete(url))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(EngineError::NotFound(what));
        }
        if !status.is_success() {
            return Err(error_from_response(status, response).await);
        }
        Ok(())
    }
}

async fn error_from_response(status: StatusCode, response: reqwest::Response) -> EngineError {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let message = match serde_json::from_str::<EngineErrorBody>(&body) {
        Ok(EngineErrorBody {
            kind: Some(kind),
            message,
        }) => format!("{kind}: {message}"),
        Ok(EngineErrorBody { kind: None, message }) => message,
        Err(_) => body,
    };
    EngineError::api(status, message)
}

#[async_trait]
impl RepositoryService for RestEngine {
    async fn definitions_by_key(&self, key: &str) -> EngineResult<Vec<ProcessDefinition>> {
        self.get_json(&["process-definition"], &[("key", key)]).await
    }

    async fn deploy_resource(&self, resource: &Path) -> EngineResult<Deployment> {
        let path = self.resource_root.join(resource);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| EngineError::NotFound(format!("resource {}", resource.display())))?
            .to_string();
        let contents = tokio::fs::read(&path).await?;

        tracing::debug!(
            resource = %path.display(),
            bytes = contents.len(),
            "Uploading deployment resource"
        );

        let form = multipart::Form::new()
            .text("deployment-name", file_name.clone())
            .text("deployment-source", env!("CARGO_PKG_NAME"))
            .part(
                file_name.clone(),
                multipart::Part::bytes(contents).file_name(file_name),
            );

        let url = self.endpoint(&["deployment", "create"])?;
        let response = self
            .authorize(self.client.post(url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(status, response).await);
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::Deserialization(format!("Failed to parse deployment: {}", e)))
    }

    async fn delete_deployment_cascade(&self, deployment_id: &str) -> EngineResult<()> {
        self.delete(
            &["deployment", deployment_id],
            &[("cascade", "true")],
            format!("deployment {deployment_id}"),
        )
        .await
    }
}

#[async_trait]
impl ExecutionService for RestEngine {
    async fn instances_by_definition(
        &self,
        definition_id: &str,
    ) -> EngineResult<Vec<ProcessInstance>> {
        self.get_json(
            &["process-instance"],
            &[("processDefinitionId", definition_id)],
        )
        .await
    }

    async fn find_execution(&self, execution_id: &str) -> EngineResult<Option<Execution>> {
        match self.get_json(&["execution", execution_id], &[]).await {
            Ok(execution) => Ok(Some(execution)),
            Err(EngineError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_process_instance(&self, instance_id: &str) -> EngineResult<()> {
        self.delete(
            &["process-instance", instance_id],
            &[],
            format!("process instance {instance_id}"),
        )
        .await
    }
}

#[async_trait]
impl TaskService for RestEngine {
    async fn tasks_by_definition(&self, definition_id: &str) -> EngineResult<Vec<Task>> {
        self.get_json(&["task"], &[("processDefinitionId", definition_id)])
            .await
    }
}
