// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Dependency-ordered lifecycle of the whole stack.
//!
//! Services start in registration order (data store, proxy, automation worker)
//! and stop in reverse. Starting is fail-fast and does not roll back services
//! that already came up; stopping attempts every service and reports all
//! failures together.

use crate::clock::{Clock, sleep_or_cancel};
use crate::config::ServiceConfig;
use crate::constants::lifecycle;
use crate::error::{OrchestratorError, ServiceError, ServiceFailure};
use crate::logs;
use crate::probe::{HostContext, cancellable};
use crate::service::Service;
use crate::services::{AutomationService, DataStoreService, ProxyService};
use crate::status::ServiceStatus;
use log::{error, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tokio_util::sync::CancellationToken;

pub struct Orchestrator {
    /// In start order.
    services: Vec<Arc<dyn Service>>,
    /// One lifecycle lock per service; mutating calls on a service hold it.
    locks: HashMap<String, Arc<Mutex<()>>>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(config: Arc<ServiceConfig>, ctx: HostContext) -> Self {
        let services: Vec<Arc<dyn Service>> = vec![
            Arc::new(DataStoreService::new(Arc::clone(&config), &ctx)),
            Arc::new(ProxyService::new(Arc::clone(&config), &ctx)),
            Arc::new(AutomationService::new(config, &ctx)),
        ];
        Self::with_services(ctx.clock, services)
    }

    /// Orchestrate an arbitrary ordered set of services.
    pub fn with_services(clock: Arc<dyn Clock>, services: Vec<Arc<dyn Service>>) -> Self {
        let locks = services
            .iter()
            .map(|s| (s.name().to_string(), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            services,
            locks,
            clock,
        }
    }

    /// Registered service names, in start order.
    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    pub fn service(&self, name: &str) -> Result<Arc<dyn Service>, OrchestratorError> {
        self.services
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(name.to_string()))
    }

    /// Take `name`'s lifecycle lock, giving up when `cancel` fires first.
    async fn lock(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<OwnedMutexGuard<()>>, ServiceError> {
        let Some(lock) = self.locks.get(name) else {
            return Ok(None);
        };
        let guard = cancellable(name, cancel, Arc::clone(lock).lock_owned()).await?;
        Ok(Some(guard))
    }

    async fn start_locked(
        &self,
        service: &dyn Service,
        cancel: &CancellationToken,
    ) -> Result<(), ServiceError> {
        let _guard = self.lock(service.name(), cancel).await?;
        service.start(cancel).await
    }

    async fn stop_locked(
        &self,
        service: &dyn Service,
        cancel: &CancellationToken,
    ) -> Result<(), ServiceError> {
        let _guard = self.lock(service.name(), cancel).await?;
        service.stop(cancel).await
    }

    async fn settle(&self, cancel: &CancellationToken) -> Result<(), OrchestratorError> {
        if sleep_or_cancel(self.clock.as_ref(), cancel, lifecycle::ORCHESTRATOR_SETTLE).await {
            Ok(())
        } else {
            Err(OrchestratorError::Cancelled)
        }
    }

    /// Start every service in order, then verify the whole stack.
    pub async fn start_all(&self, cancel: &CancellationToken) -> Result<(), OrchestratorError> {
        for service in &self.services {
            let name = service.name();
            info!("[{name}] starting");
            if let Err(e) = self.start_locked(service.as_ref(), cancel).await {
                error!("[{name}] start failed: {e}");
                return Err(OrchestratorError::Start {
                    service: name.to_string(),
                    source: e,
                });
            }
            self.settle(cancel).await?;
        }
        self.verify_all(cancel).await?;
        info!("all services started");
        Ok(())
    }

    /// Stop every service in reverse order, collecting every failure.
    pub async fn stop_all(&self, cancel: &CancellationToken) -> Result<(), OrchestratorError> {
        let mut failures = Vec::new();
        for service in self.services.iter().rev() {
            let name = service.name();
            info!("[{name}] stopping");
            if let Err(e) = self.stop_locked(service.as_ref(), cancel).await {
                warn!("[{name}] stop failed: {e}");
                failures.push(ServiceFailure {
                    service: name.to_string(),
                    error: e,
                });
            }
        }
        if failures.is_empty() {
            info!("all services stopped");
            Ok(())
        } else {
            Err(OrchestratorError::Stop(failures))
        }
    }

    pub async fn restart_all(&self, cancel: &CancellationToken) -> Result<(), OrchestratorError> {
        self.stop_all(cancel).await?;
        self.settle(cancel).await?;
        self.start_all(cancel).await
    }

    /// First failing health check, attributed to its service.
    pub async fn verify_all(&self, cancel: &CancellationToken) -> Result<(), OrchestratorError> {
        for service in &self.services {
            service
                .health_check(cancel)
                .await
                .map_err(|source| OrchestratorError::Verify {
                    service: service.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    pub async fn status(&self, cancel: &CancellationToken) -> BTreeMap<String, ServiceStatus> {
        let mut statuses = BTreeMap::new();
        for service in &self.services {
            statuses.insert(service.name().to_string(), service.status(cancel).await);
        }
        statuses
    }

    /// Status of one service, without probing the others.
    pub async fn service_status(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ServiceStatus, OrchestratorError> {
        Ok(self.service(name)?.status(cancel).await)
    }

    pub async fn start_service(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), OrchestratorError> {
        let service = self.service(name)?;
        let _guard = self.lock(name, cancel).await?;
        service.start(cancel).await?;
        Ok(())
    }

    pub async fn stop_service(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), OrchestratorError> {
        let service = self.service(name)?;
        let _guard = self.lock(name, cancel).await?;
        service.stop(cancel).await?;
        Ok(())
    }

    pub async fn restart_service(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), OrchestratorError> {
        let service = self.service(name)?;
        let _guard = self.lock(name, cancel).await?;
        service.restart(cancel).await?;
        Ok(())
    }

    pub async fn health_check(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), OrchestratorError> {
        self.service(name)?
            .health_check(cancel)
            .await
            .map_err(|source| OrchestratorError::Verify {
                service: name.to_string(),
                source,
            })
    }

    /// Last `lines` lines of a service's log.
    pub async fn logs(&self, name: &str, lines: usize) -> Result<Vec<String>, OrchestratorError> {
        let service = self.service(name)?;
        logs::tail(&service.log_path(), lines)
            .await
            .map_err(|cause| OrchestratorError::Logs {
                service: name.to_string(),
                cause,
            })
    }

    /// Stream new lines of a service's log into `sink` until cancelled.
    pub async fn follow_logs(
        &self,
        name: &str,
        cancel: &CancellationToken,
        sink: mpsc::Sender<String>,
    ) -> Result<(), OrchestratorError> {
        let service = self.service(name)?;
        logs::follow(&service.log_path(), self.clock.as_ref(), cancel, sink)
            .await
            .map_err(|cause| OrchestratorError::Logs {
                service: name.to_string(),
                cause,
            })
    }
}
