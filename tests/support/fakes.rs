// ABOUTME: In-memory fakes for the service, relational and KV collaborators.
// ABOUTME: Record every call so tests can assert on ordering and side effects.

use async_trait::async_trait;
use bulwark::runtime::{ComponentHealth, KvStore, RelationalStore, ServiceError, ServiceOps, StoreError};
use bulwark::types::{ComponentName, ImageId};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

pub fn name(value: &str) -> ComponentName {
    ComponentName::new(value).unwrap()
}

/// Container lifecycle fake.
///
/// Health is looked up by scripted sequence first, then by the version the
/// component currently runs, then defaults to healthy.
#[derive(Default)]
pub struct FakeServices {
    current: Mutex<HashMap<ComponentName, ImageId>>,
    latest: Mutex<HashMap<ComponentName, ImageId>>,
    health_by_version: Mutex<HashMap<String, ComponentHealth>>,
    scripts: Mutex<HashMap<ComponentName, VecDeque<ComponentHealth>>>,
    fail_recreate_to: Mutex<Option<String>>,
    fail_stop: AtomicBool,
    calls: Mutex<Vec<String>>,
    health_polls: AtomicUsize,
    first_unhealthy: Mutex<Option<DateTime<Utc>>>,
}

impl FakeServices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A component running `current` with `latest` available.
    pub fn with_component(self: &Arc<Self>, component: &str, current: &str, latest: &str) -> Arc<Self> {
        self.current.lock().insert(name(component), ImageId::new(current));
        self.latest.lock().insert(name(component), ImageId::new(latest));
        self.clone()
    }

    /// Any component running `version` reports `health`.
    pub fn health_for_version(&self, version: &str, health: ComponentHealth) {
        self.health_by_version.lock().insert(version.to_string(), health);
    }

    /// Answer health queries for `component` from `sequence`; the last entry repeats.
    pub fn script_health(&self, component: &str, sequence: &[ComponentHealth]) {
        self.scripts
            .lock()
            .insert(name(component), sequence.iter().copied().collect());
    }

    pub fn fail_recreate_to(&self, version: &str) {
        *self.fail_recreate_to.lock() = Some(version.to_string());
    }

    pub fn fail_stop(&self) {
        self.fail_stop.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn version(&self, component: &str) -> Option<String> {
        self.current
            .lock()
            .get(&name(component))
            .map(|v| v.as_str().to_string())
    }

    pub fn health_polls(&self) -> usize {
        self.health_polls.load(Ordering::SeqCst)
    }

    /// When a health query first answered Unhealthy.
    pub fn first_unhealthy_at(&self) -> Option<DateTime<Utc>> {
        *self.first_unhealthy.lock()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn lookup_health(&self, service: &ComponentName) -> ComponentHealth {
        if let Some(script) = self.scripts.lock().get_mut(service) {
            if script.len() > 1 {
                return script.pop_front().unwrap_or(ComponentHealth::Unknown);
            }
            if let Some(last) = script.front() {
                return *last;
            }
        }

        let version = self.current.lock().get(service).cloned();
        version
            .and_then(|v| self.health_by_version.lock().get(v.as_str()).copied())
            .unwrap_or(ComponentHealth::Healthy)
    }
}

fn joined(services: &[ComponentName]) -> String {
    services.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(",")
}

#[async_trait]
impl ServiceOps for FakeServices {
    async fn stop(&self, services: &[ComponentName], _timeout: Duration) -> Result<(), ServiceError> {
        self.record(format!("stop:{}", joined(services)));
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(ServiceError::Runtime("stop refused".to_string()));
        }
        Ok(())
    }

    async fn start(&self, services: &[ComponentName]) -> Result<(), ServiceError> {
        self.record(format!("start:{}", joined(services)));
        Ok(())
    }

    async fn current_version(&self, service: &ComponentName) -> Result<ImageId, ServiceError> {
        self.current
            .lock()
            .get(service)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(service.to_string()))
    }

    async fn pull_latest(&self, service: &ComponentName) -> Result<ImageId, ServiceError> {
        self.record(format!("pull:{}", service));
        match self.latest.lock().get(service) {
            Some(latest) => Ok(latest.clone()),
            None => Err(ServiceError::NotFound(service.to_string())),
        }
    }

    async fn recreate(&self, service: &ComponentName, version: &ImageId) -> Result<(), ServiceError> {
        self.record(format!("recreate:{}@{}", service, version));
        if self.fail_recreate_to.lock().as_deref() == Some(version.as_str()) {
            return Err(ServiceError::InvalidConfig {
                service: service.to_string(),
                message: "image refused to start".to_string(),
            });
        }
        self.current.lock().insert(service.clone(), version.clone());
        Ok(())
    }

    async fn health(&self, service: &ComponentName) -> Result<ComponentHealth, ServiceError> {
        self.health_polls.fetch_add(1, Ordering::SeqCst);
        let health = self.lookup_health(service);
        if health == ComponentHealth::Unhealthy {
            self.first_unhealthy.lock().get_or_insert_with(Utc::now);
        }
        Ok(health)
    }
}

const DUMP_HEADER: &str = "-- fake dump";

/// A relational store holding rows of text.
#[derive(Default)]
pub struct FakeDatabase {
    rows: Mutex<Vec<String>>,
    down: AtomicBool,
    empty_dumps: AtomicBool,
    loads: AtomicUsize,
}

impl FakeDatabase {
    pub fn with_rows(rows: &[&str]) -> Arc<Self> {
        let db = Self::default();
        *db.rows.lock() = rows.iter().map(|r| r.to_string()).collect();
        Arc::new(db)
    }

    pub fn rows(&self) -> Vec<String> {
        self.rows.lock().clone()
    }

    pub fn set_rows(&self, rows: &[&str]) {
        *self.rows.lock() = rows.iter().map(|r| r.to_string()).collect();
    }

    pub fn go_down(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    pub fn produce_empty_dumps(&self) {
        self.empty_dumps.store(true, Ordering::SeqCst);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn check_up(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unreachable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RelationalStore for FakeDatabase {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_up()
    }

    async fn dump(&self) -> Result<Bytes, StoreError> {
        self.check_up()?;
        if self.empty_dumps.load(Ordering::SeqCst) {
            return Ok(Bytes::new());
        }
        let mut text = String::from(DUMP_HEADER);
        for row in self.rows.lock().iter() {
            text.push('\n');
            text.push_str(row);
        }
        Ok(Bytes::from(text))
    }

    async fn load(&self, dump: Bytes) -> Result<(), StoreError> {
        self.check_up()?;
        let text = String::from_utf8(dump.to_vec()).map_err(|e| StoreError::Protocol(e.to_string()))?;
        let mut lines = text.lines();
        if lines.next() != Some(DUMP_HEADER) {
            return Err(StoreError::CommandFailed {
                command: "load".to_string(),
                code: 3,
                stderr: "not a dump".to_string(),
            });
        }
        *self.rows.lock() = lines.map(str::to_string).collect();
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A KV store whose save marker advances when a save is triggered.
#[derive(Default)]
pub struct FakeKv {
    marker: AtomicI64,
    stuck: AtomicBool,
    saves: AtomicUsize,
}

impl FakeKv {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            marker: AtomicI64::new(1_700_000_000),
            ..Default::default()
        })
    }

    /// Saves are accepted but never finish.
    pub fn stuck() -> Arc<Self> {
        let kv = Self::new();
        kv.stuck.store(true, Ordering::SeqCst);
        kv
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvStore for FakeKv {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn trigger_async_save(&self) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if !self.stuck.load(Ordering::SeqCst) {
            self.marker.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn last_save_marker(&self) -> Result<i64, StoreError> {
        Ok(self.marker.load(Ordering::SeqCst))
    }
}
