// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Browser-automation worker running in a detached session and exposing an
//! HTTP health endpoint.

use super::{
    launch_session, prepare_log_dir, process_pattern, require_files, require_ports,
    require_session, stop_unit, unit_active,
};
use crate::clock::Clock;
use crate::config::{AutomationConfig, ServiceConfig};
use crate::constants::{lifecycle, names, probe};
use crate::error::ServiceError;
use crate::probe::{CommandRunner, HostContext, HostProbe, cancellable, find_pid, wait_until_ready};
use crate::service::Service;
use crate::supervisor::{LaunchSpec, ProcessSupervisor};
use async_trait::async_trait;
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct AutomationService {
    config: Arc<ServiceConfig>,
    supervisor: Arc<dyn ProcessSupervisor>,
    commands: Arc<dyn CommandRunner>,
    probe: Arc<dyn HostProbe>,
    clock: Arc<dyn Clock>,
}

impl AutomationService {
    pub fn new(config: Arc<ServiceConfig>, ctx: &HostContext) -> Self {
        let supervisor = ctx.supervisor_for(config.automation.backend, false);
        Self {
            config,
            supervisor,
            commands: Arc::clone(&ctx.commands),
            probe: Arc::clone(&ctx.probe),
            clock: Arc::clone(&ctx.clock),
        }
    }

    fn settings(&self) -> &AutomationConfig {
        &self.config.automation
    }

    fn launch_spec(&self) -> LaunchSpec {
        let settings = self.settings();
        LaunchSpec {
            unit: settings.session.clone(),
            working_dir: settings.working_dir.clone(),
            command: settings.command.clone(),
            log_path: Some(settings.log_path()),
        }
    }

    async fn api_ready(&self, timeout: Duration) -> Result<(), ServiceError> {
        let url = self.settings().health_url();
        match self.probe.http_status(&url, timeout).await {
            Ok(200) => Ok(()),
            Ok(status) => Err(ServiceError::HttpUnhealthy {
                service: self.name().to_string(),
                status: Some(status),
                detail: format!("GET {url} returned {status}"),
            }),
            Err(e) => Err(ServiceError::HttpUnhealthy {
                service: self.name().to_string(),
                status: None,
                detail: format!("{e:#}"),
            }),
        }
    }
}

#[async_trait]
impl Service for AutomationService {
    fn name(&self) -> &str {
        names::AUTOMATION
    }

    fn ports(&self) -> Vec<u16> {
        vec![self.settings().api_port]
    }

    fn log_path(&self) -> PathBuf {
        self.settings().log_path()
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn restart_delay(&self) -> Duration {
        lifecycle::SESSION_RESTART_DELAY
    }

    async fn start(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        let name = self.name();
        if self.is_running(cancel).await {
            return Err(ServiceError::AlreadyRunning {
                service: name.to_string(),
            });
        }
        let settings = self.settings();
        require_files(name, &settings.binary_path(), &settings.config_path()).await?;
        prepare_log_dir(name, &settings.log_path()).await?;

        launch_session(
            name,
            self.supervisor.as_ref(),
            &self.launch_spec(),
            self.clock(),
            cancel,
        )
        .await?;

        info!("[{name}] waiting for {}", settings.health_url());
        wait_until_ready(
            name,
            self.clock(),
            cancel,
            probe::READINESS_TIMEOUT,
            probe::READINESS_INTERVAL,
            move |remaining| async move {
                match self.api_ready(remaining.min(probe::HTTP_TIMEOUT)).await {
                    Ok(()) => true,
                    Err(e) => {
                        debug!("[{name}] not ready yet: {e}");
                        false
                    }
                }
            },
        )
        .await?;
        info!("[{name}] started in session {}", settings.session);
        Ok(())
    }

    async fn stop(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        stop_unit(
            self.name(),
            self.supervisor.as_ref(),
            &self.settings().session,
            self.clock(),
            cancel,
        )
        .await
    }

    async fn health_check(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        let name = self.name();
        require_session(name, self.supervisor.as_ref(), &self.settings().session, cancel).await?;
        require_ports(
            name,
            self.probe.as_ref(),
            &[self.settings().api_port],
            probe::PORT_TIMEOUT,
            cancel,
        )
        .await?;
        cancellable(name, cancel, self.api_ready(probe::HTTP_TIMEOUT)).await?
    }

    async fn is_running(&self, cancel: &CancellationToken) -> bool {
        let name = self.name();
        let session = &self.settings().session;
        cancellable(name, cancel, unit_active(name, self.supervisor.as_ref(), session))
            .await
            .unwrap_or(false)
    }

    async fn pid(&self) -> Option<u32> {
        find_pid(
            self.commands.as_ref(),
            &process_pattern(&self.settings().binary),
        )
        .await
    }
}
