// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The three managed services and the steps they share.

pub mod automation;
pub mod datastore;
pub mod proxy;

pub use automation::AutomationService;
pub use datastore::DataStoreService;
pub use proxy::ProxyService;

use crate::clock::{Clock, sleep_or_cancel};
use crate::constants::lifecycle;
use crate::error::ServiceError;
use crate::probe::{HostProbe, cancellable};
use crate::supervisor::{LaunchSpec, ProcessSupervisor};
use log::{debug, info, warn};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fail with `MissingBinary` / `MissingConfig` unless both files exist.
pub(crate) async fn require_files(
    service: &str,
    binary: &Path,
    config: &Path,
) -> Result<(), ServiceError> {
    if !exists(binary).await {
        return Err(ServiceError::MissingBinary {
            service: service.to_string(),
            path: binary.to_path_buf(),
        });
    }
    if !exists(config).await {
        return Err(ServiceError::MissingConfig {
            service: service.to_string(),
            path: config.to_path_buf(),
        });
    }
    Ok(())
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

pub(crate) async fn prepare_log_dir(service: &str, log: &Path) -> Result<(), ServiceError> {
    let Some(dir) = log.parent() else {
        return Ok(());
    };
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| ServiceError::Io {
            service: service.to_string(),
            context: format!("creating log directory {}", dir.display()),
            source,
        })
}

/// Wait `duration`, or fail with `Cancelled`.
pub(crate) async fn settle(
    service: &str,
    clock: &dyn Clock,
    cancel: &CancellationToken,
    duration: Duration,
) -> Result<(), ServiceError> {
    if sleep_or_cancel(clock, cancel, duration).await {
        Ok(())
    } else {
        Err(ServiceError::Cancelled {
            service: service.to_string(),
        })
    }
}

/// Liveness according to the supervisor. Supervisor errors count as not running.
pub(crate) async fn unit_active(
    service: &str,
    supervisor: &dyn ProcessSupervisor,
    unit: &str,
) -> bool {
    match supervisor.is_active(unit).await {
        Ok(active) => active,
        Err(e) => {
            warn!("[{service}] cannot query {unit}: {e}");
            false
        }
    }
}

pub(crate) async fn require_session(
    service: &str,
    supervisor: &dyn ProcessSupervisor,
    unit: &str,
    cancel: &CancellationToken,
) -> Result<(), ServiceError> {
    if cancellable(service, cancel, unit_active(service, supervisor, unit)).await? {
        Ok(())
    } else {
        Err(ServiceError::SessionMissing {
            service: service.to_string(),
        })
    }
}

pub(crate) async fn require_ports(
    service: &str,
    probe: &dyn HostProbe,
    ports: &[u16],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), ServiceError> {
    for &port in ports {
        if !cancellable(service, cancel, probe.port_open(port, timeout)).await? {
            return Err(ServiceError::PortClosed {
                service: service.to_string(),
                port,
            });
        }
    }
    Ok(())
}

/// Launch a detached session, wait for it to settle and make sure it survived.
pub(crate) async fn launch_session(
    service: &str,
    supervisor: &dyn ProcessSupervisor,
    spec: &LaunchSpec,
    clock: &dyn Clock,
    cancel: &CancellationToken,
) -> Result<(), ServiceError> {
    info!("[{service}] launching {:?} in {}", spec.command, spec.working_dir.display());
    cancellable(service, cancel, supervisor.launch(spec))
        .await?
        .map_err(|e| ServiceError::StartFailed {
            service: service.to_string(),
            cause: e.to_string(),
        })?;

    settle(service, clock, cancel, lifecycle::SESSION_SETTLE).await?;

    if !unit_active(service, supervisor, &spec.unit).await {
        return Err(ServiceError::StartFailed {
            service: service.to_string(),
            cause: format!("session {} not found after launch", spec.unit),
        });
    }
    Ok(())
}

/// Terminate `unit` unless it is already gone, then wait the stop grace period.
pub(crate) async fn stop_unit(
    service: &str,
    supervisor: &dyn ProcessSupervisor,
    unit: &str,
    clock: &dyn Clock,
    cancel: &CancellationToken,
) -> Result<(), ServiceError> {
    if !cancellable(service, cancel, unit_active(service, supervisor, unit)).await? {
        debug!("[{service}] not running, nothing to stop");
        return Ok(());
    }
    info!("[{service}] stopping {unit}");
    supervisor
        .terminate(unit)
        .await
        .map_err(|e| ServiceError::StopFailed {
            service: service.to_string(),
            cause: e.to_string(),
        })?;
    settle(service, clock, cancel, lifecycle::STOP_GRACE).await
}

/// Final path component, used as the process-lookup pattern.
pub(crate) fn process_pattern(binary: &Path) -> String {
    binary
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| binary.to_string_lossy().into_owned())
}
