// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use stackctl::constants::logs::DEFAULT_TAIL_LINES;
use stackctl::{HostContext, Orchestrator, ServiceStatus, config};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Start, stop and inspect the data store, proxy and automation worker.
#[derive(Parser, Debug)]
#[command(name = "stackctl", version)]
struct Args {
    /// Configuration file (defaults to $STACKCTL_CONFIG, then /etc/stackctl/services.yaml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start all services in dependency order, or a single one
    Start { service: Option<String> },
    /// Stop all services in reverse order, or a single one
    Stop { service: Option<String> },
    /// Restart all services, or a single one
    Restart { service: Option<String> },
    /// Show the status of every service
    Status {
        service: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run health checks; exits non-zero on the first failure
    Health { service: Option<String> },
    /// Print the last lines of a service log
    Logs {
        service: String,
        #[arg(long, short = 'n', default_value_t = DEFAULT_TAIL_LINES)]
        lines: usize,
        /// Keep printing new lines until interrupted
        #[arg(long, short)]
        follow: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    simple_logger::init_with_level(level)?;

    let config = config::load(args.config.as_deref()).context("loading configuration")?;
    let orchestrator = Orchestrator::new(Arc::new(config), HostContext::system());

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone())?;

    run(&orchestrator, args.command, &cancel).await
}

fn spawn_signal_handler(cancel: CancellationToken) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
        cancel.cancel();
    });
    Ok(())
}

async fn run(orchestrator: &Orchestrator, command: Command, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::Start { service: None } => orchestrator.start_all(cancel).await?,
        Command::Start { service: Some(name) } => orchestrator.start_service(&name, cancel).await?,
        Command::Stop { service: None } => orchestrator.stop_all(cancel).await?,
        Command::Stop { service: Some(name) } => orchestrator.stop_service(&name, cancel).await?,
        Command::Restart { service: None } => orchestrator.restart_all(cancel).await?,
        Command::Restart { service: Some(name) } => {
            orchestrator.restart_service(&name, cancel).await?
        }
        Command::Status { service, json } => {
            let statuses = match service {
                Some(name) => {
                    let status = orchestrator.service_status(&name, cancel).await?;
                    BTreeMap::from([(name, status)])
                }
                None => orchestrator.status(cancel).await,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                print_table(&statuses);
            }
        }
        Command::Health { service: None } => {
            orchestrator.verify_all(cancel).await?;
            println!("all services healthy");
        }
        Command::Health { service: Some(name) } => {
            orchestrator.health_check(&name, cancel).await?;
            println!("{name} healthy");
        }
        Command::Logs {
            service,
            lines,
            follow,
        } => {
            for line in orchestrator.logs(&service, lines).await? {
                println!("{line}");
            }
            if follow {
                let (tx, mut rx) = mpsc::channel(256);
                let printer = tokio::spawn(async move {
                    while let Some(line) = rx.recv().await {
                        println!("{line}");
                    }
                });
                orchestrator.follow_logs(&service, cancel, tx).await?;
                printer.await?;
            }
        }
    }
    Ok(())
}

fn print_table(statuses: &BTreeMap<String, ServiceStatus>) {
    println!(
        "{:<12} {:<8} {:<8} {:<8} {:<14} ERRORS",
        "SERVICE", "RUNNING", "HEALTHY", "PID", "PORTS"
    );
    for (name, status) in statuses {
        let pid = status
            .pid()
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        let ports = status
            .ports()
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:<12} {:<8} {:<8} {:<8} {:<14} {}",
            name,
            yes_no(status.running()),
            yes_no(status.is_healthy()),
            pid,
            ports,
            status.errors().join("; ")
        );
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
