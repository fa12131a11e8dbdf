// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Lifecycle orchestration for a small fixed stack of host services: a
//! key-value data store, a reverse proxy and a browser-automation worker.
//!
//! The orchestrator never owns the processes it manages. Liveness and health
//! are inferred on every call from the service manager, session listings,
//! bound ports, log freshness and HTTP readiness.

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod logs;
pub mod orchestrator;
pub mod probe;
pub mod service;
pub mod services;
pub mod status;
pub mod supervisor;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use clock::{Clock, ManualClock, TokioClock};
pub use config::ServiceConfig;
pub use error::{OrchestratorError, ServiceError, ServiceFailure, SupervisorError};
pub use orchestrator::Orchestrator;
pub use probe::{CommandOutput, CommandRunner, HostContext, HostProbe};
pub use service::Service;
pub use status::ServiceStatus;
pub use supervisor::{LaunchSpec, ProcessSupervisor, SupervisorKind};
