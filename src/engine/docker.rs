use bollard::container::StartContainerOptions;
use bollard::Docker;

use super::{ContainerHandle, CreateRequest, Engine, EngineError};

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects using the platform defaults, honouring `DOCKER_HOST`.
    pub fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()?;

        Ok(DockerEngine { docker })
    }
}

#[async_trait::async_trait]
impl Engine for DockerEngine {
    async fn create_container(&self, request: CreateRequest) -> Result<ContainerHandle, EngineError> {
        let CreateRequest { options, config } = request;
        tracing::info!(container = %options.name, image = ?config.image, "creating docker container");

        let response = self.docker.create_container(Some(options), config).await?;

        for warning in &response.warnings {
            tracing::warn!(warning = %warning, "docker reported a warning on create");
        }

        Ok(ContainerHandle::from(response))
    }

    async fn start_container(&self, handle: &ContainerHandle) -> Result<(), EngineError> {
        tracing::info!(id = %handle.id, "starting docker container");
        self.docker
            .start_container(&handle.id, None::<StartContainerOptions<String>>)
            .await?;

        Ok(())
    }

    async fn stop_container(&self, handle: &ContainerHandle) -> Result<(), EngineError> {
        tracing::info!(id = %handle.id, "stopping docker container");
        self.docker.stop_container(&handle.id, None).await?;

        Ok(())
    }

    async fn remove_container(&self, handle: &ContainerHandle) -> Result<(), EngineError> {
        tracing::info!(id = %handle.id, "removing docker container");
        self.docker.remove_container(&handle.id, None).await?;

        Ok(())
    }
}
