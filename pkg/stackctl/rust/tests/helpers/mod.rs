// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use async_trait::async_trait;
use stackctl::config::ServiceConfig;
use stackctl::testing::FakeHost;
use stackctl::{Clock, HostContext, ManualClock, Orchestrator};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant, SystemTime};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const DATA_STORE_UNIT: &str = "redis-server";
pub const PROXY_SESSION: &str = "proxy";
pub const AUTOMATION_SESSION: &str = "automation";
pub const DATA_STORE_PORT: u16 = 6379;
pub const PROXY_PORTS: [u16; 2] = [8080, 8443];
pub const API_PORT: u16 = 3000;

/// A complete stack on a fake host: binaries and configs exist in a temp
/// directory, every unit is stopped and time only moves when slept on.
pub struct Stack {
    pub dir: TempDir,
    pub config: Arc<ServiceConfig>,
    pub host: Arc<FakeHost>,
    pub clock: Arc<ManualClock>,
}

impl Stack {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let mut config = ServiceConfig::default();
        config.data_store.address = format!("127.0.0.1:{DATA_STORE_PORT}");
        config.data_store.unit = DATA_STORE_UNIT.to_string();
        config.data_store.binary = touch(root, "bin/redis-server");
        config.data_store.config = touch(root, "etc/redis.conf");
        config.data_store.log_file = root.join("log/redis.log");

        config.proxy.working_dir = root.join("proxy");
        touch(root, "proxy/proxy");
        touch(root, "proxy/config.toml");
        config.proxy.ports = PROXY_PORTS.to_vec();
        config.proxy.session = PROXY_SESSION.to_string();

        config.automation.working_dir = root.join("automation");
        touch(root, "automation/worker.js");
        touch(root, "automation/config.toml");
        config.automation.api_port = API_PORT;
        config.automation.session = AUTOMATION_SESSION.to_string();

        let host = FakeHost::new();
        host.bind_ports(DATA_STORE_UNIT, &[DATA_STORE_PORT]);
        host.bind_ports(PROXY_SESSION, &PROXY_PORTS);
        host.bind_ports(AUTOMATION_SESSION, &[API_PORT]);
        host.answer_ping_for(DATA_STORE_UNIT);

        Self {
            dir,
            config: Arc::new(config),
            host,
            clock: Arc::new(ManualClock::new()),
        }
    }

    pub fn context(&self) -> HostContext {
        self.host.context(self.clock.clone())
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(Arc::clone(&self.config), self.context())
    }

    /// Orchestrator whose `nth` sleep (counting from 1) cancels the returned token.
    pub fn orchestrator_cancelling_on_sleep(&self, nth: usize) -> (Orchestrator, CancellationToken) {
        let cancel = CancellationToken::new();
        let clock = Arc::new(CancelOnSleep::new(Arc::clone(&self.clock), nth, cancel.clone()));
        let orchestrator = Orchestrator::new(Arc::clone(&self.config), self.host.context(clock));
        (orchestrator, cancel)
    }

    /// Mark every unit as already running.
    pub fn run_everything(&self) {
        for unit in [DATA_STORE_UNIT, PROXY_SESSION, AUTOMATION_SESSION] {
            self.host.set_active(unit);
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }
}

fn touch(root: &Path, relative: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "").unwrap();
    path
}

/// Manual time that fires a cancellation token when the `nth` sleep begins.
pub struct CancelOnSleep {
    inner: Arc<ManualClock>,
    nth: usize,
    sleeps: AtomicUsize,
    cancel: CancellationToken,
}

impl CancelOnSleep {
    pub fn new(inner: Arc<ManualClock>, nth: usize, cancel: CancellationToken) -> Self {
        Self {
            inner,
            nth,
            sleeps: AtomicUsize::new(0),
            cancel,
        }
    }
}

#[async_trait]
impl Clock for CancelOnSleep {
    fn now(&self) -> Instant {
        self.inner.now()
    }

    fn wall(&self) -> SystemTime {
        self.inner.wall()
    }

    async fn sleep(&self, duration: Duration) {
        if self.sleeps.fetch_add(1, Ordering::SeqCst) + 1 == self.nth {
            self.cancel.cancel();
        }
        self.inner.sleep(duration).await;
    }
}
