// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Host-facing probes: external commands, TCP ports, HTTP status and file
//! modification times, plus the readiness polling loop built on them.

use crate::clock::{Clock, TokioClock, sleep_or_cancel};
use crate::error::ServiceError;
use crate::supervisor::{ProcessSupervisor, SupervisorKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// `CommandRunner` on top of `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        debug!("running {program} {args:?}");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Read-only observations of the host.
#[async_trait]
pub trait HostProbe: Send + Sync {
    /// Whether something accepts TCP connections on `127.0.0.1:<port>`.
    async fn port_open(&self, port: u16, timeout: Duration) -> bool;

    /// Status code of a GET on `url`; errors when no response arrives.
    async fn http_status(&self, url: &str, timeout: Duration) -> Result<u16>;

    /// Modification time of `path`, `None` when the file does not exist.
    async fn modified(&self, path: &Path) -> Option<SystemTime>;
}

/// Probes the real host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

#[async_trait]
impl HostProbe for SystemProbe {
    async fn port_open(&self, port: u16, timeout: Duration) -> bool {
        let addr = format!("127.0.0.1:{port}");
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!("port check {addr} failed: {e}");
                false
            }
            Err(_) => {
                debug!("port check {addr} timed out");
                false
            }
        }
    }

    async fn http_status(&self, url: &str, timeout: Duration) -> Result<u16> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        let response = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        Ok(response.status().as_u16())
    }

    async fn modified(&self, path: &Path) -> Option<SystemTime> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.modified().ok(),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("cannot stat {}: {e}", path.display());
                }
                None
            }
        }
    }
}

/// Everything an adapter needs to reach the host.
#[derive(Clone)]
pub struct HostContext {
    pub commands: Arc<dyn CommandRunner>,
    pub probe: Arc<dyn HostProbe>,
    pub clock: Arc<dyn Clock>,
    supervisor: Option<Arc<dyn ProcessSupervisor>>,
}

impl HostContext {
    pub fn new(
        commands: Arc<dyn CommandRunner>,
        probe: Arc<dyn HostProbe>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            commands,
            probe,
            clock,
            supervisor: None,
        }
    }

    /// Real commands, real probes, real time.
    pub fn system() -> Self {
        Self::new(
            Arc::new(TokioCommandRunner),
            Arc::new(SystemProbe),
            Arc::new(TokioClock),
        )
    }

    /// Use `supervisor` for every service regardless of configured backend.
    pub fn with_supervisor(mut self, supervisor: Arc<dyn ProcessSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn supervisor_for(&self, kind: SupervisorKind, sudo: bool) -> Arc<dyn ProcessSupervisor> {
        match self.supervisor {
            Some(ref supervisor) => Arc::clone(supervisor),
            None => kind.build(Arc::clone(&self.commands), sudo),
        }
    }
}

/// First PID reported by `pgrep -f <pattern>`.
pub async fn find_pid(commands: &dyn CommandRunner, pattern: &str) -> Option<u32> {
    let output = commands
        .run("pgrep", &["-f".to_string(), pattern.to_string()])
        .await
        .ok()?;
    if !output.is_success() {
        return None;
    }
    output
        .stdout
        .lines()
        .find_map(|line| line.trim().parse::<u32>().ok())
}

/// Run `probe` unless `cancel` fires first, attributing cancellation to `service`.
pub async fn cancellable<T>(
    service: &str,
    cancel: &CancellationToken,
    probe: impl Future<Output = T>,
) -> Result<T, ServiceError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ServiceError::Cancelled {
            service: service.to_string(),
        }),
        value = probe => Ok(value),
    }
}

/// Poll `check` every `interval` until it passes or `timeout` elapses.
///
/// `check` receives the time left before the deadline and must not take longer.
pub async fn wait_until_ready<F, Fut>(
    service: &str,
    clock: &dyn Clock,
    cancel: &CancellationToken,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<(), ServiceError>
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = clock.now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(clock.now());
        if remaining.is_zero() {
            return Err(ServiceError::ReadinessTimeout {
                service: service.to_string(),
                timeout,
            });
        }
        if cancellable(service, cancel, check(remaining)).await? {
            return Ok(());
        }
        let pause = interval.min(deadline.saturating_duration_since(clock.now()));
        if !sleep_or_cancel(clock, cancel, pause).await {
            return Err(ServiceError::Cancelled {
                service: service.to_string(),
            });
        }
    }
}
