// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Key-value data store managed through the host service manager.

use super::{process_pattern, require_files, settle, stop_unit, unit_active};
use crate::clock::Clock;
use crate::config::{DataStoreConfig, ServiceConfig};
use crate::constants::{lifecycle, names, probe};
use crate::error::ServiceError;
use crate::probe::{CommandRunner, HostContext, cancellable, find_pid};
use crate::service::Service;
use crate::supervisor::{LaunchSpec, ProcessSupervisor, UnitState};
use async_trait::async_trait;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct DataStoreService {
    config: Arc<ServiceConfig>,
    supervisor: Arc<dyn ProcessSupervisor>,
    commands: Arc<dyn CommandRunner>,
    clock: Arc<dyn Clock>,
}

impl DataStoreService {
    pub fn new(config: Arc<ServiceConfig>, ctx: &HostContext) -> Self {
        let supervisor =
            ctx.supervisor_for(config.data_store.backend, config.data_store.sudo);
        Self {
            config,
            supervisor,
            commands: Arc::clone(&ctx.commands),
            clock: Arc::clone(&ctx.clock),
        }
    }

    fn settings(&self) -> &DataStoreConfig {
        &self.config.data_store
    }

    fn unit(&self) -> &str {
        &self.settings().unit
    }

    /// `<cli> -h <host> -p <port> [-a <password>] ping`
    fn ping_args(&self) -> Result<Vec<String>, ServiceError> {
        let (host, port) = self
            .settings()
            .host_port()
            .map_err(|e| ServiceError::PingFailed {
                service: names::DATA_STORE.to_string(),
                detail: format!("{e:#}"),
            })?;
        let mut args = vec!["-h".to_string(), host, "-p".to_string(), port.to_string()];
        if let Some(ref password) = self.settings().password {
            args.push("-a".to_string());
            args.push(password.clone());
        }
        args.push("ping".to_string());
        Ok(args)
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        let args = self.ping_args()?;
        let failed = |detail: String| ServiceError::PingFailed {
            service: names::DATA_STORE.to_string(),
            detail,
        };
        let output = self
            .commands
            .run(&self.settings().cli, &args)
            .await
            .map_err(|e| failed(format!("running {}: {e}", self.settings().cli)))?;
        if !output.is_success() {
            return Err(failed(format!(
                "{} exited with {:?}: {}",
                self.settings().cli,
                output.code,
                output.stderr.trim()
            )));
        }
        let reply = output.stdout.trim();
        if reply != probe::PING_REPLY {
            return Err(failed(format!("unexpected reply {reply:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Service for DataStoreService {
    fn name(&self) -> &str {
        names::DATA_STORE
    }

    fn ports(&self) -> Vec<u16> {
        self.settings()
            .host_port()
            .map(|(_, port)| vec![port])
            .unwrap_or_default()
    }

    fn log_path(&self) -> PathBuf {
        self.settings().log_file.clone()
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn restart_delay(&self) -> Duration {
        lifecycle::DATA_STORE_RESTART_DELAY
    }

    async fn start(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        let name = self.name();
        if self.is_running(cancel).await {
            return Err(ServiceError::AlreadyRunning {
                service: name.to_string(),
            });
        }
        require_files(name, &self.settings().binary, &self.settings().config).await?;

        info!("[{name}] starting {} via {}", self.unit(), self.supervisor.kind());
        let spec = LaunchSpec {
            unit: self.unit().to_string(),
            working_dir: PathBuf::from("/"),
            command: vec![
                self.settings().binary.to_string_lossy().into_owned(),
                self.settings().config.to_string_lossy().into_owned(),
            ],
            log_path: Some(self.settings().log_file.clone()),
        };
        cancellable(name, cancel, self.supervisor.launch(&spec))
            .await?
            .map_err(|e| ServiceError::StartFailed {
                service: name.to_string(),
                cause: e.to_string(),
            })?;

        if let Err(e) = self.supervisor.enable(self.unit()).await {
            warn!("[{name}] could not enable {} at boot: {e}", self.unit());
        }

        settle(name, self.clock(), cancel, lifecycle::DATA_STORE_SETTLE).await?;

        match self.health_check(cancel).await {
            Ok(()) => {
                info!("[{name}] started");
                Ok(())
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => Err(ServiceError::StartFailed {
                service: name.to_string(),
                cause: e.to_string(),
            }),
        }
    }

    async fn stop(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        stop_unit(self.name(), self.supervisor.as_ref(), self.unit(), self.clock(), cancel).await
    }

    async fn health_check(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        let name = self.name();
        let state = cancellable(name, cancel, self.supervisor.state(self.unit()))
            .await?
            .map_err(|e| ServiceError::Inactive {
                service: name.to_string(),
                state: e.to_string(),
            })?;
        if let UnitState::Inactive(state) = state {
            return Err(ServiceError::Inactive {
                service: name.to_string(),
                state,
            });
        }
        cancellable(name, cancel, self.ping()).await?
    }

    async fn is_running(&self, cancel: &CancellationToken) -> bool {
        let name = self.name();
        cancellable(name, cancel, unit_active(name, self.supervisor.as_ref(), self.unit()))
            .await
            .unwrap_or(false)
    }

    async fn pid(&self) -> Option<u32> {
        find_pid(self.commands.as_ref(), &process_pattern(&self.settings().binary)).await
    }
}
