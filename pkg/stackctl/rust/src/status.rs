// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use serde::Serialize;
use std::time::SystemTime;

/// Point-in-time snapshot of one managed service.
///
/// A service is never reported healthy without also being running: the only
/// way to set `healthy` is [`ServiceStatus::healthy`], which sets both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    name: String,
    running: bool,
    healthy: bool,
    pid: Option<u32>,
    ports: Vec<u16>,
    errors: Vec<String>,
    #[serde(serialize_with = "serialize_unix_secs")]
    last_seen: Option<SystemTime>,
}

impl ServiceStatus {
    pub fn healthy(
        name: impl Into<String>,
        ports: Vec<u16>,
        pid: Option<u32>,
        last_seen: SystemTime,
    ) -> Self {
        Self {
            name: name.into(),
            running: true,
            healthy: true,
            pid,
            ports,
            errors: Vec::new(),
            last_seen: Some(last_seen),
        }
    }

    pub fn unhealthy(
        name: impl Into<String>,
        ports: Vec<u16>,
        running: bool,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            running,
            healthy: false,
            pid: None,
            ports,
            errors: vec![error.into()],
            last_seen: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn last_seen(&self) -> Option<SystemTime> {
        self.last_seen
    }
}

fn serialize_unix_secs<S>(value: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let secs = value
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs());
    match secs {
        Some(secs) => serializer.serialize_some(&secs),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_healthy_implies_running() {
        let status = ServiceStatus::healthy("proxy", vec![80, 443], Some(4242), SystemTime::now());
        assert!(status.is_healthy());
        assert!(status.running());
        assert!(status.errors().is_empty());
        assert!(status.last_seen().is_some());
    }

    #[test]
    fn test_unhealthy_keeps_liveness() {
        let status = ServiceStatus::unhealthy("proxy", vec![80, 443], true, "port 443 not listening");
        assert!(!status.is_healthy());
        assert!(status.running());
        assert_eq!(status.errors(), ["port 443 not listening"]);
        assert_eq!(status.pid(), None);
        assert_eq!(status.ports(), [80, 443]);
    }

    #[test]
    fn test_json_shape() {
        let seen = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let status = ServiceStatus::healthy("datastore", vec![6379], None, seen);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["name"], "datastore");
        assert_eq!(json["running"], true);
        assert_eq!(json["healthy"], true);
        assert_eq!(json["pid"], serde_json::Value::Null);
        assert_eq!(json["ports"], serde_json::json!([6379]));
        assert_eq!(json["last_seen"], 1_700_000_000u64);
    }

    #[test]
    fn test_json_without_last_seen() {
        let status = ServiceStatus::unhealthy("automation", vec![3000], false, "session not found");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["last_seen"], serde_json::Value::Null);
        assert_eq!(json["errors"], serde_json::json!(["session not found"]));
    }
}
