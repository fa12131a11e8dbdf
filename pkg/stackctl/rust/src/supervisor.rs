// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Process supervisor backends.
//!
//! Adapters never spawn the managed processes themselves. They hand a
//! [`LaunchSpec`] to a [`ProcessSupervisor`] which delegates to the host's
//! service manager, a detached terminal session or a container runtime.

use crate::error::SupervisorError;
use crate::probe::{CommandOutput, CommandRunner};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// What a supervisor needs to bring a unit up.
///
/// `unit` is the systemd unit, screen session or container name. `working_dir`,
/// `command` and `log_path` are only used by backends that spawn the command
/// themselves (detached sessions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub unit: String,
    pub working_dir: PathBuf,
    pub command: Vec<String>,
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorKind {
    Systemd,
    Session,
    Container,
}

impl SupervisorKind {
    pub fn build(self, commands: Arc<dyn CommandRunner>, sudo: bool) -> Arc<dyn ProcessSupervisor> {
        match self {
            SupervisorKind::Systemd => Arc::new(SystemdSupervisor::new(commands, sudo)),
            SupervisorKind::Session => Arc::new(SessionSupervisor::new(commands)),
            SupervisorKind::Container => Arc::new(ContainerSupervisor::new(commands)),
        }
    }
}

impl fmt::Display for SupervisorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorKind::Systemd => "systemd",
            SupervisorKind::Session => "session",
            SupervisorKind::Container => "container",
        };
        f.write_str(s)
    }
}

/// State of a unit as reported by its supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitState {
    Active,
    /// Anything else, with the backend's own wording (`inactive`, `failed`, ...).
    Inactive(String),
}

impl UnitState {
    pub fn is_active(&self) -> bool {
        matches!(self, UnitState::Active)
    }
}

#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    fn kind(&self) -> SupervisorKind;

    async fn launch(&self, spec: &LaunchSpec) -> Result<(), SupervisorError>;

    /// Make the unit start at boot. Backends without such a notion succeed.
    async fn enable(&self, _unit: &str) -> Result<(), SupervisorError> {
        Ok(())
    }

    async fn terminate(&self, unit: &str) -> Result<(), SupervisorError>;

    async fn state(&self, unit: &str) -> Result<UnitState, SupervisorError>;

    async fn is_active(&self, unit: &str) -> Result<bool, SupervisorError> {
        Ok(self.state(unit).await?.is_active())
    }
}

async fn run(
    commands: &dyn CommandRunner,
    program: &str,
    args: Vec<String>,
) -> Result<CommandOutput, SupervisorError> {
    commands
        .run(program, &args)
        .await
        .map_err(|source| SupervisorError::Spawn {
            program: program.to_string(),
            source,
        })
}

async fn run_checked(
    commands: &dyn CommandRunner,
    program: &str,
    args: Vec<String>,
) -> Result<CommandOutput, SupervisorError> {
    let output = run(commands, program, args).await?;
    if output.is_success() {
        Ok(output)
    } else {
        Err(SupervisorError::Failed {
            program: program.to_string(),
            code: output.code,
            stderr: output.stderr,
        })
    }
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Host service manager (`systemctl`).
pub struct SystemdSupervisor {
    commands: Arc<dyn CommandRunner>,
    sudo: bool,
}

impl SystemdSupervisor {
    pub fn new(commands: Arc<dyn CommandRunner>, sudo: bool) -> Self {
        Self { commands, sudo }
    }

    async fn systemctl(&self, verb: &str, unit: &str) -> Result<(), SupervisorError> {
        let (program, argv) = if self.sudo {
            ("sudo", args(&["systemctl", verb, unit]))
        } else {
            ("systemctl", args(&[verb, unit]))
        };
        run_checked(self.commands.as_ref(), program, argv).await?;
        Ok(())
    }
}

#[async_trait]
impl ProcessSupervisor for SystemdSupervisor {
    fn kind(&self) -> SupervisorKind {
        SupervisorKind::Systemd
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<(), SupervisorError> {
        self.systemctl("start", &spec.unit).await
    }

    async fn enable(&self, unit: &str) -> Result<(), SupervisorError> {
        self.systemctl("enable", unit).await
    }

    async fn terminate(&self, unit: &str) -> Result<(), SupervisorError> {
        self.systemctl("stop", unit).await
    }

    async fn state(&self, unit: &str) -> Result<UnitState, SupervisorError> {
        // is-active exits non-zero for every state but "active"; the state is on stdout.
        let output = run(self.commands.as_ref(), "systemctl", args(&["is-active", unit])).await?;
        let state = output.stdout.trim();
        Ok(match state {
            "active" => UnitState::Active,
            "" => UnitState::Inactive("unknown".to_string()),
            other => UnitState::Inactive(other.to_string()),
        })
    }
}

/// Detached `screen` sessions.
pub struct SessionSupervisor {
    commands: Arc<dyn CommandRunner>,
}

impl SessionSupervisor {
    pub fn new(commands: Arc<dyn CommandRunner>) -> Self {
        Self { commands }
    }
}

fn quote(s: &str) -> Cow<'_, str> {
    shell_escape::escape(Cow::Borrowed(s))
}

/// Shell line run inside the session: change directory, run the command and
/// append its combined output to the log.
pub fn session_script(spec: &LaunchSpec) -> String {
    let command = spec
        .command
        .iter()
        .map(|part| quote(part))
        .collect::<Vec<_>>()
        .join(" ");
    let dir = spec.working_dir.to_string_lossy();
    let mut script = format!("cd {} && {command}", quote(&dir));
    if let Some(ref log) = spec.log_path {
        let log = log.to_string_lossy();
        script.push_str(&format!(" 2>&1 | tee -a {}", quote(&log)));
    }
    script
}

/// Whether a `screen -list` listing contains exactly `session`.
///
/// Entries look like `\t12345.proxy\t(Detached)`; `proxy-old` or `myproxy`
/// must not match `proxy`.
pub fn listing_has_session(listing: &str, session: &str) -> bool {
    listing.lines().any(|line| {
        line.split_whitespace()
            .next()
            .and_then(|entry| entry.split_once('.'))
            .is_some_and(|(pid, name)| {
                !pid.is_empty() && pid.chars().all(|c| c.is_ascii_digit()) && name == session
            })
    })
}

#[async_trait]
impl ProcessSupervisor for SessionSupervisor {
    fn kind(&self) -> SupervisorKind {
        SupervisorKind::Session
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<(), SupervisorError> {
        let script = session_script(spec);
        debug!("[{}] session script: {script}", spec.unit);
        run_checked(
            self.commands.as_ref(),
            "screen",
            vec![
                "-dmS".to_string(),
                spec.unit.clone(),
                "bash".to_string(),
                "-c".to_string(),
                script,
            ],
        )
        .await?;
        Ok(())
    }

    async fn terminate(&self, unit: &str) -> Result<(), SupervisorError> {
        run_checked(self.commands.as_ref(), "screen", args(&["-S", unit, "-X", "quit"])).await?;
        Ok(())
    }

    async fn state(&self, unit: &str) -> Result<UnitState, SupervisorError> {
        // screen -list exits 1 when there are no sessions at all.
        let output = run(self.commands.as_ref(), "screen", args(&["-list"])).await?;
        if listing_has_session(&output.stdout, unit) {
            Ok(UnitState::Active)
        } else {
            Ok(UnitState::Inactive("no session".to_string()))
        }
    }
}

/// Container runtime (`docker`). The container must already exist.
pub struct ContainerSupervisor {
    commands: Arc<dyn CommandRunner>,
}

impl ContainerSupervisor {
    pub fn new(commands: Arc<dyn CommandRunner>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl ProcessSupervisor for ContainerSupervisor {
    fn kind(&self) -> SupervisorKind {
        SupervisorKind::Container
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<(), SupervisorError> {
        run_checked(self.commands.as_ref(), "docker", args(&["start", &spec.unit])).await?;
        Ok(())
    }

    async fn terminate(&self, unit: &str) -> Result<(), SupervisorError> {
        run_checked(self.commands.as_ref(), "docker", args(&["stop", unit])).await?;
        Ok(())
    }

    async fn state(&self, unit: &str) -> Result<UnitState, SupervisorError> {
        let filter = format!("name=^{unit}$");
        let output = run_checked(
            self.commands.as_ref(),
            "docker",
            args(&["ps", "--filter", &filter, "--format", "{{.Names}}"]),
        )
        .await?;
        if output.stdout.lines().any(|line| line.trim() == unit) {
            Ok(UnitState::Active)
        } else {
            Ok(UnitState::Inactive("not running".to_string()))
        }
    }
}
