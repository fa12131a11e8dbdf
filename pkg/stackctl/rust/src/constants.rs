// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Fixed timings and labels shared by the adapters and the orchestrator.

use std::time::Duration;

/// Service labels, also used as orchestrator keys.
pub mod names {
    pub const DATA_STORE: &str = "datastore";
    pub const PROXY: &str = "proxy";
    pub const AUTOMATION: &str = "automation";
}

/// Lifecycle delays
pub mod lifecycle {
    use super::Duration;

    /// Pause between two consecutive starts in `start_all`, and between the
    /// stop and start phases of `restart_all`.
    pub const ORCHESTRATOR_SETTLE: Duration = Duration::from_secs(2);

    /// Wait after asking the service manager to start the data store.
    pub const DATA_STORE_SETTLE: Duration = Duration::from_secs(2);

    /// Wait after launching a detached session.
    pub const SESSION_SETTLE: Duration = Duration::from_secs(3);

    /// Wait after terminating a service or session.
    pub const STOP_GRACE: Duration = Duration::from_secs(2);

    /// Delay between stop and start in a single-service restart.
    pub const DATA_STORE_RESTART_DELAY: Duration = Duration::from_secs(1);
    pub const SESSION_RESTART_DELAY: Duration = Duration::from_secs(2);
}

/// Probe timeouts and thresholds
pub mod probe {
    use super::Duration;

    pub const PORT_TIMEOUT: Duration = Duration::from_secs(2);
    pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

    /// A proxy log untouched for longer than this is considered stale.
    pub const LOG_MAX_AGE: Duration = Duration::from_secs(5 * 60);

    pub const READINESS_TIMEOUT: Duration = Duration::from_secs(30);
    pub const READINESS_INTERVAL: Duration = Duration::from_secs(1);

    /// Expected reply of the data store's ping utility.
    pub const PING_REPLY: &str = "PONG";
}

/// Log viewing
pub mod logs {
    use super::Duration;

    pub const DEFAULT_TAIL_LINES: usize = 50;
    pub const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(250);
}
