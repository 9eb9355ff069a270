//! Shared fixtures: a throwaway XRay config plus an in-memory registry.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use xray_keeper::clock::ManualClock;
use xray_keeper::config::{Config, NetworkSettings};
use xray_keeper::store::memory::MemoryStore;
use xray_keeper::xray::{RecordingRunner, XrayConfigFile};
use xray_keeper::AppState;

pub const ADMIN_KEY: &str = "test-admin-key-0123456789";

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub state: Arc<AppState>,
    pub registry: Arc<MemoryStore>,
    pub runner: Arc<RecordingRunner>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let doc = json!({
            "log": { "loglevel": "warning" },
            "inbounds": [
                { "protocol": "dokodemo-door", "tag": "api" },
                { "protocol": "vless", "port": 443, "settings": { "clients": [], "decryption": "none" } }
            ],
            "outbounds": [{ "protocol": "freedom" }]
        });
        std::fs::write(&config_path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();

        let config = Config {
            port: 0,
            database_url: String::new(),
            admin_key: Some(ADMIN_KEY.into()),
            operator_id: "cli".into(),
            xray_config_path: config_path,
            network: NetworkSettings {
                host: "vpn.example.com".into(),
                port: 443,
                flow: "xtls-rprx-vision".into(),
                security: "reality".into(),
                network: "tcp".into(),
                service_name: String::new(),
            },
            reload_command: Some("xray-reload --graceful".into()),
            access_log_path: dir.path().join("access.log"),
            default_device_limit: 3,
            throttle_bandwidth: "1mbit".into(),
            throttle_device: "eth0".into(),
            reconcile_interval: Duration::from_secs(3600),
            enforce_interval: Duration::ZERO,
        };

        let registry = Arc::new(MemoryStore::new());
        let runner = Arc::new(RecordingRunner::new());
        let clock = Arc::new(ManualClock::new(start()));
        let state = Arc::new(AppState::build(
            config,
            registry.clone(),
            runner.clone(),
            clock.clone(),
        ));

        Self {
            dir,
            state,
            registry,
            runner,
            clock,
        }
    }

    pub fn config_file(&self) -> XrayConfigFile {
        XrayConfigFile::new(self.state.config.xray_config_path.clone())
    }

    pub fn access_log(&self) -> PathBuf {
        self.state.config.access_log_path.clone()
    }

    pub fn write_access_log(&self, lines: &[String]) {
        std::fs::write(self.access_log(), lines.join("\n")).unwrap();
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()
}

pub fn log_line(id: &str, ip: &str) -> String {
    format!("2025/06/01 09:31:00 accepted tcp:example.org:443 uuid={} ip={}", id, ip)
}
