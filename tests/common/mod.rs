//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::response::Response;
use harbor_gateway::services::SharedDefinition;
use harbor_gateway::{ApiServerBuilder, Definition, Error, ProxyTable, Result, Service, ServiceManager, ServiceType, Status};

/// Outcome a fake service reports for restart
#[derive(Clone, Copy)]
pub enum RestartOutcome {
    Ok,
    TransportError,
    ProcessError,
}

/// In-memory service recording how it was driven
pub struct FakeService {
    definition: SharedDefinition,
    alive: bool,
    restart: RestartOutcome,
    pub restarts: AtomicUsize,
    pub reloads: AtomicUsize,
}

impl FakeService {
    pub fn new(definition: Definition) -> Self {
        Self {
            definition: definition.into_shared(),
            alive: true,
            restart: RestartOutcome::Ok,
            restarts: AtomicUsize::new(0),
            reloads: AtomicUsize::new(0),
        }
    }

    pub fn named(name: &str, service_type: ServiceType) -> Self {
        Self::new(Definition::new(name, service_type))
    }

    pub fn dead(mut self) -> Self {
        self.alive = false;
        self
    }

    pub fn failing_restart(mut self, outcome: RestartOutcome) -> Self {
        self.restart = outcome;
        self
    }
}

#[async_trait]
impl Service for FakeService {
    async fn status(&self) -> Status {
        if self.alive { Status::alive() } else { Status::down() }
    }

    async fn reload(&self, component: &str) -> Result<()> {
        self.definition.read().await.check_component(component)?;
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn definition(&self) -> SharedDefinition {
        Arc::clone(&self.definition)
    }

    async fn restart(&self) -> Result<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        match self.restart {
            RestartOutcome::Ok => Ok(()),
            RestartOutcome::TransportError => Err(Error::Transport("peer refused restart".to_string())),
            RestartOutcome::ProcessError => Err(Error::Process("plugin failed to start".to_string())),
        }
    }
}

/// Build the full gateway router around `manager`
pub fn build_test_router(manager: Arc<ServiceManager>, table: ProxyTable) -> axum::Router {
    ApiServerBuilder::new(manager)
        .proxy_table(table)
        .build()
        .router()
}

/// Read a response body as JSON
pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
