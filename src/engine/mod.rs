use bollard::container::{Config, CreateContainerOptions};
use bollard::models::ContainerCreateResponse;

pub mod docker;
#[cfg(test)]
pub(crate) mod testing;

/// Any failure reported by the container engine, carried untouched.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct EngineError(#[from] bollard::errors::Error);

impl EngineError {
    /// HTTP status of the engine's answer, when the engine answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match &self.0 {
            bollard::errors::Error::DockerResponseServerError { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// Reference to a container the engine has created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub warnings: Vec<String>,
}

impl From<ContainerCreateResponse> for ContainerHandle {
    fn from(response: ContainerCreateResponse) -> Self {
        ContainerHandle {
            id: response.id,
            warnings: response.warnings,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub options: CreateContainerOptions<String>,
    pub config: Config<String>,
}

#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    async fn create_container(&self, request: CreateRequest) -> Result<ContainerHandle, EngineError>;
    async fn start_container(&self, handle: &ContainerHandle) -> Result<(), EngineError>;
    async fn stop_container(&self, handle: &ContainerHandle) -> Result<(), EngineError>;
    async fn remove_container(&self, handle: &ContainerHandle) -> Result<(), EngineError>;
}
