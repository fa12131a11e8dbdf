// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Reverse proxy running in a detached session.
//!
//! Healthy means: the session exists, every configured port accepts TCP
//! connections and the log file, when present, was written recently.

use super::{
    launch_session, prepare_log_dir, process_pattern, require_files, require_ports,
    require_session, stop_unit, unit_active,
};
use crate::clock::Clock;
use crate::config::{ProxyConfig, ServiceConfig};
use crate::constants::{lifecycle, names, probe};
use crate::error::ServiceError;
use crate::probe::{CommandRunner, HostContext, HostProbe, cancellable, find_pid};
use crate::service::Service;
use crate::supervisor::{LaunchSpec, ProcessSupervisor};
use async_trait::async_trait;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct ProxyService {
    config: Arc<ServiceConfig>,
    supervisor: Arc<dyn ProcessSupervisor>,
    commands: Arc<dyn CommandRunner>,
    probe: Arc<dyn HostProbe>,
    clock: Arc<dyn Clock>,
}

impl ProxyService {
    pub fn new(config: Arc<ServiceConfig>, ctx: &HostContext) -> Self {
        let supervisor = ctx.supervisor_for(config.proxy.backend, false);
        Self {
            config,
            supervisor,
            commands: Arc::clone(&ctx.commands),
            probe: Arc::clone(&ctx.probe),
            clock: Arc::clone(&ctx.clock),
        }
    }

    fn settings(&self) -> &ProxyConfig {
        &self.config.proxy
    }

    fn launch_spec(&self) -> LaunchSpec {
        let settings = self.settings();
        LaunchSpec {
            unit: settings.session.clone(),
            working_dir: settings.working_dir.clone(),
            command: vec![
                settings.binary_path().to_string_lossy().into_owned(),
                "-config".to_string(),
                settings.config_path().to_string_lossy().into_owned(),
            ],
            log_path: Some(settings.log_path()),
        }
    }

    async fn require_fresh_log(&self) -> Result<(), ServiceError> {
        let path = self.settings().log_path();
        let Some(modified) = self.probe.modified(&path).await else {
            return Ok(());
        };
        // A modification time in the future counts as fresh.
        let age = self
            .clock
            .wall()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age > probe::LOG_MAX_AGE {
            return Err(ServiceError::StaleLog {
                service: self.name().to_string(),
                path,
                age,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Service for ProxyService {
    fn name(&self) -> &str {
        names::PROXY
    }

    fn ports(&self) -> Vec<u16> {
        self.settings().ports.clone()
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
            &self.settings().ports,
            probe::PORT_TIMEOUT,
            cancel,
        )
        .await?;
        cancellable(name, cancel, self.require_fresh_log()).await?
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_spec_uses_resolved_paths() {
        let config = Arc::new(ServiceConfig::default());
        let svc = ProxyService::new(config, &HostContext::system());
        let spec = svc.launch_spec();
        assert_eq!(spec.unit, "proxy");
        assert_eq!(
            spec.command,
            vec![
                "/opt/stack/proxy/proxy",
                "-config",
                "/opt/stack/proxy/config.toml"
            ]
        );
        assert_eq!(spec.log_path, Some(PathBuf::from("/opt/stack/proxy/proxy.log")));
    }
}
