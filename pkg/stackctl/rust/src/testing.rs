// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! In-memory host for tests: one object plays the supervisor, the probes and
//! the command runner, so launching a unit makes its ports, HTTP endpoint and
//! ping reply appear consistently.

use crate::clock::Clock;
use crate::error::SupervisorError;
use crate::probe::{CommandOutput, CommandRunner, HostContext, HostProbe};
use crate::supervisor::{LaunchSpec, ProcessSupervisor, SupervisorKind, UnitState};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

pub const FAKE_PID: u32 = 4242;

#[derive(Default)]
struct State {
    active: HashSet<String>,
    unit_ports: HashMap<String, Vec<u16>>,
    closed_ports: HashSet<u16>,
    http_status: Option<u16>,
    http_timeouts: Vec<Duration>,
    ping_unit: Option<String>,
    ping_reply: Option<String>,
    log_modified: HashMap<PathBuf, SystemTime>,
    fail_launch: HashSet<String>,
    fail_terminate: HashSet<String>,
    dies_on_launch: HashSet<String>,
    events: Vec<String>,
}

#[derive(Default)]
pub struct FakeHost {
    state: Mutex<State>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Host context where every service is supervised by this fake.
    pub fn context(self: &Arc<Self>, clock: Arc<dyn Clock>) -> HostContext {
        HostContext::new(self.clone(), self.clone(), clock).with_supervisor(self.clone())
    }

    /// Ports that accept connections while `unit` is active.
    pub fn bind_ports(&self, unit: &str, ports: &[u16]) {
        self.lock()
            .unit_ports
            .insert(unit.to_string(), ports.to_vec());
    }

    /// The unit whose activity makes the ping utility answer.
    pub fn answer_ping_for(&self, unit: &str) {
        self.lock().ping_unit = Some(unit.to_string());
    }

    pub fn set_ping_reply(&self, reply: &str) {
        self.lock().ping_reply = Some(reply.to_string());
    }

    pub fn set_active(&self, unit: &str) {
        self.lock().active.insert(unit.to_string());
    }

    pub fn set_inactive(&self, unit: &str) {
        self.lock().active.remove(unit);
    }

    pub fn is_active_unit(&self, unit: &str) -> bool {
        self.lock().active.contains(unit)
    }

    pub fn close_port(&self, port: u16) {
        self.lock().closed_ports.insert(port);
    }

    /// Status returned by HTTP probes on open ports (200 by default).
    pub fn set_http_status(&self, status: u16) {
        self.lock().http_status = Some(status);
    }

    /// Timeouts passed to HTTP probes, in call order.
    pub fn http_timeouts(&self) -> Vec<Duration> {
        self.lock().http_timeouts.clone()
    }

    pub fn set_log_modified(&self, path: &Path, modified: SystemTime) {
        self.lock()
            .log_modified
            .insert(path.to_path_buf(), modified);
    }

    pub fn fail_launch(&self, unit: &str) {
        self.lock().fail_launch.insert(unit.to_string());
    }

    pub fn fail_terminate(&self, unit: &str) {
        self.lock().fail_terminate.insert(unit.to_string());
    }

    /// Launching `unit` succeeds but the process exits immediately.
    pub fn dies_on_launch(&self, unit: &str) {
        self.lock().dies_on_launch.insert(unit.to_string());
    }

    /// Every supervisor call, e.g. `launch proxy`, `terminate proxy`.
    pub fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }

    /// Units passed to `launch`, in call order.
    pub fn launches(&self) -> Vec<String> {
        self.events_with("launch ")
    }

    /// Units passed to `terminate`, in call order.
    pub fn terminations(&self) -> Vec<String> {
        self.events_with("terminate ")
    }

    fn events_with(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    fn port_is_open(state: &State, port: u16) -> bool {
        !state.closed_ports.contains(&port)
            && state.active.iter().any(|unit| {
                state
                    .unit_ports
                    .get(unit)
                    .is_some_and(|ports| ports.contains(&port))
            })
    }
}

fn url_port(url: &str) -> Option<u16> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split('/').next()?;
    authority.rsplit_once(':')?.1.parse().ok()
}

#[async_trait]
impl ProcessSupervisor for FakeHost {
    fn kind(&self) -> SupervisorKind {
        SupervisorKind::Session
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<(), SupervisorError> {
        let mut state = self.lock();
        state.events.push(format!("launch {}", spec.unit));
        if state.fail_launch.contains(&spec.unit) {
            return Err(SupervisorError::Failed {
                program: "screen".to_string(),
                code: Some(1),
                stderr: format!("cannot launch {}", spec.unit),
            });
        }
        if !state.dies_on_launch.contains(&spec.unit) {
            state.active.insert(spec.unit.clone());
        }
        Ok(())
    }

    async fn enable(&self, unit: &str) -> Result<(), SupervisorError> {
        self.lock().events.push(format!("enable {unit}"));
        Ok(())
    }

    async fn terminate(&self, unit: &str) -> Result<(), SupervisorError> {
        let mut state = self.lock();
        state.events.push(format!("terminate {unit}"));
        if state.fail_terminate.contains(unit) {
            return Err(SupervisorError::Failed {
                program: "screen".to_string(),
                code: Some(1),
                stderr: "No screen session found.".to_string(),
            });
        }
        state.active.remove(unit);
        Ok(())
    }

    async fn state(&self, unit: &str) -> Result<UnitState, SupervisorError> {
        if self.lock().active.contains(unit) {
            Ok(UnitState::Active)
        } else {
            Ok(UnitState::Inactive("inactive".to_string()))
        }
    }
}

#[async_trait]
impl HostProbe for FakeHost {
    async fn port_open(&self, port: u16, _timeout: Duration) -> bool {
        Self::port_is_open(&self.lock(), port)
    }

    async fn http_status(&self, url: &str, timeout: Duration) -> Result<u16> {
        let mut state = self.lock();
        state.http_timeouts.push(timeout);
        let port = url_port(url).ok_or_else(|| anyhow!("invalid url {url}"))?;
        if Self::port_is_open(&state, port) {
            Ok(state.http_status.unwrap_or(200))
        } else {
            Err(anyhow!("GET {url}: connection refused"))
        }
    }

    async fn modified(&self, path: &Path) -> Option<SystemTime> {
        self.lock().log_modified.get(path).copied()
    }
}

#[async_trait]
impl CommandRunner for FakeHost {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        if program == "pgrep" {
            return Ok(CommandOutput::success(format!("{FAKE_PID}\n")));
        }
        if args.last().is_some_and(|a| a == "ping") {
            let state = self.lock();
            let up = state
                .ping_unit
                .as_ref()
                .is_some_and(|unit| state.active.contains(unit));
            if !up {
                return Ok(CommandOutput::failure(
                    1,
                    "Could not connect to server: Connection refused",
                ));
            }
            let reply = state.ping_reply.clone().unwrap_or_else(|| "PONG".to_string());
            return Ok(CommandOutput::success(format!("{reply}\n")));
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{program}: command not found"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_port() {
        assert_eq!(url_port("http://127.0.0.1:3000/health"), Some(3000));
        assert_eq!(url_port("http://localhost/health"), None);
    }

    #[tokio::test]
    async fn test_launch_opens_bound_ports() {
        let host = FakeHost::new();
        host.bind_ports("proxy", &[8080]);
        assert!(!host.port_open(8080, Duration::from_secs(1)).await);

        host.launch(&LaunchSpec {
            unit: "proxy".to_string(),
            working_dir: PathBuf::from("/tmp"),
            command: vec!["proxy".to_string()],
            log_path: None,
        })
        .await
        .unwrap();

        assert!(host.port_open(8080, Duration::from_secs(1)).await);
        assert_eq!(host.launches(), vec!["proxy"]);
    }
}
