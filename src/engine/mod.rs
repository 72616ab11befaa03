//! Boundary to the external workflow engine.
//!
//! The engine owns process definitions, instances, tasks and executions. This
//! crate only queries them and asks for deletions through three service
//! facades:
//! - [`RepositoryService`]: definitions and deployments
//! - [`ExecutionService`]: instances and executions
//! - [`TaskService`]: outstanding tasks
//!
//! Backends:
//! - [`RestEngine`]: Camunda-compatible REST API (production)
//! - [`InMemoryEngine`]: in-process engine for tests

mod error;
mod memory;
mod rest;
pub mod traits;

use std::sync::Arc;

pub use error::{EngineError, EngineResult};
pub use memory::InMemoryEngine;
pub use rest::RestEngine;
pub use traits::{
    Deployment, Execution, ExecutionService, ProcessDefinition, ProcessInstance,
    RepositoryService, Task, TaskService,
};

use crate::config::EngineConfig;

/// Handles to the engine's three service facades.
///
/// Built once at startup and shared by reference afterwards; the handles are
/// long-lived and thread-safe.
#[derive(Clone)]
pub struct EngineServices {
    pub repository: Arc<dyn RepositoryService>,
    pub execution: Arc<dyn ExecutionService>,
    pub tasks: Arc<dyn TaskService>,
}

impl EngineServices {
    /// Use one backend for all three facades.
    pub fn from_engine<E>(engine: Arc<E>) -> Self
    where
        E: RepositoryService + ExecutionService + TaskService + 'static,
    {
        Self {
            repository: engine.clone(),
            execution: engine.clone(),
            tasks: engine,
        }
    }

    /// Connect to the engine described by the `[engine]` configuration section.
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let engine = RestEngine::from_config(config)?;
        tracing::debug!(base_url = %config.base_url, "Configured REST workflow engine");
        Ok(Self::from_engine(Arc::new(engine)))
    }
}
