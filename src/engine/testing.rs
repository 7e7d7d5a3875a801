use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{ContainerHandle, CreateRequest, Engine, EngineError};

pub const FAKE_ID: &str = "c0ffee";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Start,
    Stop,
    Remove,
}

/// Engine double that records every request and fails the operations it is told to.
#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<(Op, String)>>,
    requests: Mutex<Vec<CreateRequest>>,
    failures: Mutex<HashMap<Op, (u16, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingEngine {
    pub fn fail_on(&self, op: Op, status_code: u16, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(op, (status_code, message.to_string()));
    }

    pub fn succeed_on(&self, op: Op) {
        self.failures.lock().unwrap().remove(&op);
    }

    pub fn calls(&self) -> Vec<(Op, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls().into_iter().map(|(op, _)| op).collect()
    }

    pub fn requests(&self) -> Vec<CreateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn record(&self, op: Op, target: &str) -> Result<(), EngineError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push((op, target.to_string()));

        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failure = self.failures.lock().unwrap().get(&op).cloned();
        match failure {
            Some((status_code, message)) => Err(EngineError::from(
                bollard::errors::Error::DockerResponseServerError { status_code, message },
            )),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl Engine for RecordingEngine {
    async fn create_container(&self, request: CreateRequest) -> Result<ContainerHandle, EngineError> {
        let name = request.options.name.clone();
        self.requests.lock().unwrap().push(request);
        self.record(Op::Create, &name).await?;

        Ok(ContainerHandle {
            id: FAKE_ID.to_string(),
            warnings: Vec::new(),
        })
    }

    async fn start_container(&self, handle: &ContainerHandle) -> Result<(), EngineError> {
        self.record(Op::Start, &handle.id).await
    }

    async fn stop_container(&self, handle: &ContainerHandle) -> Result<(), EngineError> {
        self.record(Op::Stop, &handle.id).await
    }

    async fn remove_container(&self, handle: &ContainerHandle) -> Result<(), EngineError> {
        self.record(Op::Remove, &handle.id).await
    }
}
