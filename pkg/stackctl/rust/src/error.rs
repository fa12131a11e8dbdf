// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Error types for adapters, supervisors and the orchestrator.
//! Every service-level failure carries the name of the offending service.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single lifecycle operation or health probe.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service} is already running")]
    AlreadyRunning { service: String },

    #[error("{service} binary not found: {}", path.display())]
    MissingBinary { service: String, path: PathBuf },

    #[error("{service} config not found: {}", path.display())]
    MissingConfig { service: String, path: PathBuf },

    #[error("failed to start {service}: {cause}")]
    StartFailed { service: String, cause: String },

    #[error("failed to stop {service}: {cause}")]
    StopFailed { service: String, cause: String },

    #[error("{service} session not found")]
    SessionMissing { service: String },

    #[error("{service} is not active ({state})")]
    Inactive { service: String, state: String },

    #[error("{service} ping failed: {detail}")]
    PingFailed { service: String, detail: String },

    #[error("{service}: port {port} not listening")]
    PortClosed { service: String, port: u16 },

    #[error(
        "{service} log file {} not being updated (last modified {}s ago)",
        path.display(),
        age.as_secs()
    )]
    StaleLog {
        service: String,
        path: PathBuf,
        age: Duration,
    },

    #[error("{service} API health check failed: {}", describe_http(*status, detail))]
    HttpUnhealthy {
        service: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("{service} API not ready after {}s", timeout.as_secs())]
    ReadinessTimeout { service: String, timeout: Duration },

    #[error("{service}: operation cancelled")]
    Cancelled { service: String },

    #[error("{service}: {context}: {source}")]
    Io {
        service: String,
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn describe_http(status: Option<u16>, detail: &str) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => detail.to_string(),
    }
}

impl ServiceError {
    /// Name of the service this error is attributed to.
    pub fn service(&self) -> &str {
        match self {
            ServiceError::AlreadyRunning { service }
            | ServiceError::MissingBinary { service, .. }
            | ServiceError::MissingConfig { service, .. }
            | ServiceError::StartFailed { service, .. }
            | ServiceError::StopFailed { service, .. }
            | ServiceError::SessionMissing { service }
            | ServiceError::Inactive { service, .. }
            | ServiceError::PingFailed { service, .. }
            | ServiceError::PortClosed { service, .. }
            | ServiceError::StaleLog { service, .. }
            | ServiceError::HttpUnhealthy { service, .. }
            | ServiceError::ReadinessTimeout { service, .. }
            | ServiceError::Cancelled { service }
            | ServiceError::Io { service, .. } => service,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServiceError::Cancelled { .. })
    }
}

/// Failure reported by a process supervisor backend.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}: {}", code.map_or("signal".to_string(), |c| format!("code {c}")), stderr.trim())]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// A single service's failure inside an aggregated stop.
#[derive(Debug)]
pub struct ServiceFailure {
    pub service: String,
    pub error: ServiceError,
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.service, self.error)
    }
}

fn join_failures(failures: &[ServiceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of an orchestrator-level operation.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to start {service}: {source}")]
    Start {
        service: String,
        #[source]
        source: ServiceError,
    },

    #[error("errors stopping services: {}", join_failures(.0))]
    Stop(Vec<ServiceFailure>),

    #[error("{service} health check failed: {source}")]
    Verify {
        service: String,
        #[source]
        source: ServiceError,
    },

    #[error("service not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("{service} logs: {cause:#}")]
    Logs { service: String, cause: anyhow::Error },

    #[error("operation cancelled")]
    Cancelled,
}

impl OrchestratorError {
    /// Services named by this error, in the order they were reported.
    pub fn services(&self) -> Vec<&str> {
        match self {
            OrchestratorError::Start { service, .. }
            | OrchestratorError::Verify { service, .. }
            | OrchestratorError::Logs { service, .. } => vec![service.as_str()],
            OrchestratorError::Stop(failures) => {
                failures.iter().map(|f| f.service.as_str()).collect()
            }
            OrchestratorError::NotFound(name) => vec![name.as_str()],
            OrchestratorError::Service(err) => vec![err.service()],
            OrchestratorError::Cancelled => Vec::new(),
        }
    }
}
