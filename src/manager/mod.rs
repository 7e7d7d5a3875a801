use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use crate::container::ContainerSpec;
use crate::engine::{ContainerHandle, Engine, EngineError};
use crate::probe::{self, ProbeError, RetryPolicy};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContainerState {
    #[default]
    NotCreated,
    Created(ContainerHandle),
}

/// Drives the lifecycle of the single container described by a [`ContainerSpec`].
///
/// The manager does not check transitions itself. Whatever is asked for is
/// forwarded and the engine decides whether it is legal. Start, stop and
/// remove do nothing while no container has been created.
pub struct ContainerManager<E: Engine> {
    engine: Arc<E>,
    spec: ContainerSpec,
    state: ContainerState,
}

impl<E: Engine> ContainerManager<E> {
    pub fn new(engine: Arc<E>, host_working_directory: impl Into<PathBuf>) -> Self {
        let spec = ContainerSpec::new(host_working_directory);
        tracing::debug!(
            spec = %serde_json::to_string(&spec).unwrap_or_default(),
            "new container manager"
        );

        Self {
            engine,
            spec,
            state: ContainerState::NotCreated,
        }
    }

    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    pub fn state(&self) -> &ContainerState {
        &self.state
    }

    pub fn handle(&self) -> Option<&ContainerHandle> {
        match &self.state {
            ContainerState::Created(handle) => Some(handle),
            ContainerState::NotCreated => None,
        }
    }

    #[tracing::instrument(skip(self), fields(container = %self.spec.name()))]
    pub async fn create_container(&mut self) -> Result<(), EngineError> {
        let request = self.spec.create_request();
        tracing::debug!(
            body = %serde_json::to_string(&request.config).unwrap_or_default(),
            "sending create request"
        );

        let handle = self.engine.create_container(request).await?;

        tracing::info!(id = %handle.id, warnings = handle.warnings.len(), "container created");
        self.state = ContainerState::Created(handle);

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(container = %self.spec.name()))]
    pub async fn start_container(&mut self) -> Result<(), EngineError> {
        let Some(handle) = self.handle() else {
            tracing::debug!("no container created, skipping start");
            return Ok(());
        };

        self.engine.start_container(handle).await?;
        tracing::info!(id = %handle.id, "container started");

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(container = %self.spec.name()))]
    pub async fn stop_container(&mut self) -> Result<(), EngineError> {
        let Some(handle) = self.handle() else {
            tracing::debug!("no container created, skipping stop");
            return Ok(());
        };

        self.engine.stop_container(handle).await?;
        tracing::info!(id = %handle.id, "container stopped");

        Ok(())
    }

    /// Removes the container and forgets its handle. A failed removal keeps the handle.
    #[tracing::instrument(skip(self), fields(container = %self.spec.name()))]
    pub async fn remove_container(&mut self) -> Result<(), EngineError> {
        let Some(handle) = self.handle() else {
            tracing::debug!("no container created, skipping remove");
            return Ok(());
        };

        self.engine.remove_container(handle).await?;
        tracing::info!(id = %handle.id, "container removed");

        self.state = ContainerState::NotCreated;

        Ok(())
    }
}

/// Creates, starts, stops and removes the container, back to back.
///
/// The first failing step ends the sequence and its error is returned.
pub async fn run<E: Engine>(
    engine: Arc<E>,
    host_working_directory: impl Into<PathBuf>,
) -> Result<(), EngineError> {
    let mut manager = ContainerManager::new(engine, host_working_directory);

    manager.create_container().await?;
    manager.start_container().await?;
    manager.stop_container().await?;
    manager.remove_container().await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("failed waiting for the shutdown signal")]
    Shutdown(#[source] std::io::Error),
}

/// Runs the debugger container until `shutdown` resolves.
///
/// `shutdown` is watched from the start. If it resolves before the server is
/// ready, the remaining steps are skipped. Once created, the container is
/// always stopped and removed on the way out, including when starting it or
/// waiting for the server fails.
pub async fn serve<E, F>(
    engine: Arc<E>,
    host_working_directory: impl Into<PathBuf>,
    probe_addr: SocketAddr,
    policy: &RetryPolicy,
    shutdown: F,
) -> Result<(), ServeError>
where
    E: Engine,
    F: Future<Output = std::io::Result<()>>,
{
    let mut manager = ContainerManager::new(engine, host_working_directory);
    tokio::pin!(shutdown);

    // A create already in flight is allowed to finish so its handle can be torn down.
    let early = {
        let create = manager.create_container();
        tokio::pin!(create);

        let early = tokio::select! {
            created = create.as_mut() => {
                created?;
                None
            }
            signal = shutdown.as_mut() => Some(signal),
        };

        if early.is_some() {
            create.await?;
        }

        early
    };

    let outcome = match early {
        Some(signal) => {
            tracing::info!("shutdown requested while creating the container");
            signal.map_err(ServeError::Shutdown)
        }
        None => hold_open(&mut manager, probe_addr, policy, shutdown).await,
    };
    let cleanup = teardown(&mut manager).await;

    match (outcome, cleanup) {
        (Err(error), Err(teardown_error)) => {
            tracing::error!(error = %teardown_error, "teardown failed after an earlier error");
            Err(error)
        }
        (Err(error), Ok(())) => Err(error),
        (Ok(()), cleanup) => cleanup.map_err(ServeError::from),
    }
}

async fn start_and_wait<E: Engine>(
    manager: &mut ContainerManager<E>,
    probe_addr: SocketAddr,
    policy: &RetryPolicy,
) -> Result<(), ServeError> {
    manager.start_container().await?;
    probe::wait_until_listening(probe_addr, policy).await?;

    Ok(())
}

async fn hold_open<E, F>(
    manager: &mut ContainerManager<E>,
    probe_addr: SocketAddr,
    policy: &RetryPolicy,
    mut shutdown: Pin<&mut F>,
) -> Result<(), ServeError>
where
    E: Engine,
    F: Future<Output = std::io::Result<()>>,
{
    let dir = manager.spec().host_working_directory().display().to_string();

    tokio::select! {
        ready = start_and_wait(manager, probe_addr, policy) => ready?,
        signal = shutdown.as_mut() => {
            tracing::info!("shutdown requested before the debugger server was ready");
            return signal.map_err(ServeError::Shutdown);
        }
    }

    tracing::info!(addr = %probe_addr, dir = %dir, "debugger server ready, waiting for shutdown");
    shutdown.await.map_err(ServeError::Shutdown)
}

async fn teardown<E: Engine>(manager: &mut ContainerManager<E>) -> Result<(), EngineError> {
    match manager.stop_container().await {
        Ok(()) => {}
        Err(error) if error.status_code() == Some(304) => {
            tracing::debug!("container was not running");
        }
        Err(error) => tracing::warn!(%error, "stop failed, removing anyway"),
    }

    manager.remove_container().await
}
