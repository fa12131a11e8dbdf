// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::clock::{Clock, sleep_or_cancel};
use crate::error::ServiceError;
use crate::status::ServiceStatus;
use async_trait::async_trait;
use log::{debug, info};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A managed long-running process.
///
/// Implementations hold no state about the remote process: every call probes
/// the host again. All waits honor `cancel`.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    /// Ports the service is expected to listen on.
    fn ports(&self) -> Vec<u16>;

    fn log_path(&self) -> PathBuf;

    fn clock(&self) -> &dyn Clock;

    /// Pause between the stop and start halves of [`Service::restart`].
    fn restart_delay(&self) -> Duration;

    async fn start(&self, cancel: &CancellationToken) -> Result<(), ServiceError>;

    /// Succeeds without side effects when the service is already stopped.
    async fn stop(&self, cancel: &CancellationToken) -> Result<(), ServiceError>;

    /// First unmet health condition, or `Ok` when all hold.
    async fn health_check(&self, cancel: &CancellationToken) -> Result<(), ServiceError>;

    /// Liveness alone, without the other health conditions.
    async fn is_running(&self, cancel: &CancellationToken) -> bool;

    /// Best-effort process id.
    async fn pid(&self) -> Option<u32>;

    async fn restart(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        info!("[{}] restarting", self.name());
        self.stop(cancel).await?;
        if !sleep_or_cancel(self.clock(), cancel, self.restart_delay()).await {
            return Err(ServiceError::Cancelled {
                service: self.name().to_string(),
            });
        }
        self.start(cancel).await
    }

    /// Never fails; health problems are reported inside the status.
    async fn status(&self, cancel: &CancellationToken) -> ServiceStatus {
        match self.health_check(cancel).await {
            Ok(()) => ServiceStatus::healthy(
                self.name(),
                self.ports(),
                self.pid().await,
                self.clock().wall(),
            ),
            Err(e) => {
                debug!("[{}] unhealthy: {e}", self.name());
                let running = self.is_running(cancel).await;
                ServiceStatus::unhealthy(self.name(), self.ports(), running, e.to_string())
            }
        }
    }
}
