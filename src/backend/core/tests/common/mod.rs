//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use skyreel_core::clock::TimeRange;
use skyreel_core::command::Command;
use skyreel_core::error::{ErrorCode, Result, SkyreelError};
use skyreel_core::jobs::{ClipSettings, JobContext};
use skyreel_core::resource::{CaptureFormat, CollectionSpan, Resource, ResourceId, ResourceKind};
use skyreel_core::services::{
    ClipRequest, CommandSink, Database, Encoder, HourlyClips, ImageProbe, Instance, InstanceKind,
    Mailer, MediaFormat, ProcessControl, RemoteDatabase, ServiceName, Storage,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// A full-time, active camera in UTC.
pub fn camera(id: i32) -> Resource {
    Resource {
        id: ResourceId(id),
        name: format!("Camera {}", id),
        active: true,
        kind: ResourceKind::WeatherCamera,
        format: CaptureFormat::Jpeg,
        frequency_secs: 60,
        collection_span: CollectionSpan::FullTime,
        time_zone: chrono_tz::UTC,
        storage_folder: format!("cam{}", id),
        update_hour: 3,
        url: format!("http://cameras.invalid/{}.jpg", id),
        image_width: 640,
        image_height: 480,
    }
}

pub fn image(resource: &Resource, taken: DateTime<Utc>) -> Instance {
    Instance {
        resource: resource.id,
        kind: InstanceKind::Capture,
        format: MediaFormat::Jpeg,
        range: TimeRange::new(taken, taken),
        path: PathBuf::from(format!("/images/{}-{}.jpg", resource.storage_folder, taken.timestamp())),
        low_quality: false,
    }
}

// ============================================================================
// Database
// ============================================================================

#[derive(Default)]
pub struct MockDatabase {
    pub resources: Mutex<Vec<Resource>>,
    pub updates: Mutex<Vec<Resource>>,
    pub fail: AtomicBool,
}

impl MockDatabase {
    pub fn with(resources: Vec<Resource>) -> Arc<Self> {
        Arc::new(Self {
            resources: Mutex::new(resources),
            ..Self::default()
        })
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn list_resources(&self) -> Result<Vec<Resource>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SkyreelError::new(ErrorCode::DatabaseError, "database down"));
        }
        Ok(self.resources.lock().clone())
    }

    async fn update_resource_dimensions(&self, resource: &Resource) -> Result<Resource> {
        self.updates.lock().push(resource.clone());
        Ok(resource.clone())
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Default)]
pub struct MockStorage {
    pub instances: Mutex<Vec<Instance>>,
    pub fetches: Mutex<Vec<TimeRange>>,
    /// `limit` of each fetch, in call order
    pub fetch_limits: Mutex<Vec<usize>>,
    pub stored: Mutex<Vec<Instance>>,
    /// Formats whose `store` fails
    pub store_fails: Mutex<Vec<MediaFormat>>,
    pub ping_fails: AtomicBool,
    pub day_long: Mutex<Option<[Instance; 2]>>,
}

impl MockStorage {
    pub fn with_images(instances: Vec<Instance>) -> Arc<Self> {
        Arc::new(Self {
            instances: Mutex::new(instances),
            ..Self::default()
        })
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn fetch_instances(
        &self,
        resource: &Resource,
        range: TimeRange,
        _format: CaptureFormat,
        limit: usize,
    ) -> Result<Vec<Instance>> {
        self.fetches.lock().push(range);
        self.fetch_limits.lock().push(limit);
        Ok(self
            .instances
            .lock()
            .iter()
            .filter(|i| i.resource == resource.id && range.contains(i.range.start))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn store(&self, _resource: &Resource, instance: &Instance) -> Result<Instance> {
        if self.store_fails.lock().contains(&instance.format) {
            return Err(SkyreelError::new(ErrorCode::StorageUnavailable, "disk full"));
        }
        self.stored.lock().push(instance.clone());
        Ok(instance.clone())
    }

    async fn ping(&self) -> Result<()> {
        if self.ping_fails.load(Ordering::SeqCst) {
            return Err(SkyreelError::new(ErrorCode::StorageUnavailable, "storage offline"));
        }
        Ok(())
    }

    async fn fetch_day_long_instances(
        &self,
        _resource: &Resource,
        _day: TimeRange,
    ) -> Result<Option<[Instance; 2]>> {
        Ok(self.day_long.lock().clone())
    }
}

// ============================================================================
// Encoder
// ============================================================================

#[derive(Debug, Clone)]
pub struct DayLongCall {
    pub resource: ResourceId,
    pub end: DateTime<Utc>,
    pub include_low_quality: bool,
    pub reason: String,
}

pub struct MockEncoder {
    pub hourly_calls: AtomicUsize,
    pub day_long_calls: Mutex<Vec<DayLongCall>>,
    pub day_long_result: AtomicBool,
}

impl Default for MockEncoder {
    fn default() -> Self {
        Self {
            hourly_calls: AtomicUsize::new(0),
            day_long_calls: Mutex::new(Vec::new()),
            day_long_result: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Encoder for MockEncoder {
    async fn make_hourly_clip(
        &self,
        _instances: &[Instance],
        resource: &Resource,
        request: &ClipRequest,
    ) -> Result<HourlyClips> {
        self.hourly_calls.fetch_add(1, Ordering::SeqCst);
        let clip = |format: MediaFormat| Instance {
            resource: resource.id,
            kind: InstanceKind::HourlyClip,
            format,
            range: TimeRange::hour_starting(request.start),
            path: PathBuf::from(format!("/work/{}.{}", resource.storage_folder, format.extension())),
            low_quality: false,
        };
        Ok(HourlyClips {
            primary: Some(clip(MediaFormat::Avi)),
            compat: Some(clip(MediaFormat::Mp4)),
        })
    }

    async fn make_day_long_clip(
        &self,
        resource: &Resource,
        end: DateTime<Utc>,
        include_low_quality: bool,
        reason: &str,
    ) -> Result<bool> {
        self.day_long_calls.lock().push(DayLongCall {
            resource: resource.id,
            end,
            include_low_quality,
            reason: reason.to_string(),
        });
        Ok(self.day_long_result.load(Ordering::SeqCst))
    }
}

// ============================================================================
// Probe / Mail / Remote DB
// ============================================================================

pub struct MockProbe {
    pub dimensions: Mutex<Option<(u32, u32)>>,
}

impl MockProbe {
    pub fn returning(dims: Option<(u32, u32)>) -> Arc<Self> {
        Arc::new(Self {
            dimensions: Mutex::new(dims),
        })
    }
}

#[async_trait]
impl ImageProbe for MockProbe {
    async fn dimensions(&self, url: &str) -> Result<(u32, u32)> {
        let dims = *self.dimensions.lock();
        dims.ok_or_else(|| {
            SkyreelError::with_internal(ErrorCode::NetworkError, "probe failed", url.to_string())
        })
    }
}

#[derive(Default)]
pub struct MockMailer {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl MockMailer {
    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(s, _)| s.clone()).collect()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_to_admins(&self, subject: &str, body: &str) -> Result<()> {
        self.sent.lock().push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

pub struct MockRemote {
    pub running: AtomicBool,
    pub query_ok: AtomicBool,
}

impl MockRemote {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(true),
            query_ok: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl RemoteDatabase for MockRemote {
    async fn server_is_running(&self) -> Result<bool> {
        Ok(self.running.load(Ordering::SeqCst))
    }

    async fn round_trip(&self) -> Result<()> {
        if self.query_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SkyreelError::new(ErrorCode::RemoteDatabaseError, "bad query"))
        }
    }
}

// ============================================================================
// Process Control / Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCall {
    Restart(ServiceName),
    Start(ServiceName),
}

#[derive(Default)]
pub struct MockControl {
    pub stopped: Mutex<HashMap<ServiceName, bool>>,
    pub calls: Mutex<Vec<ControlCall>>,
    pub restart_fails: AtomicBool,
}

impl MockControl {
    pub fn stop(&self, service: ServiceName) {
        self.stopped.lock().insert(service, true);
    }

    pub fn calls(&self) -> Vec<ControlCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ProcessControl for MockControl {
    async fn is_running(&self, service: ServiceName) -> bool {
        !self.stopped.lock().get(&service).copied().unwrap_or(false)
    }

    async fn restart(&self, service: ServiceName) -> Result<()> {
        self.calls.lock().push(ControlCall::Restart(service));
        if self.restart_fails.load(Ordering::SeqCst) {
            return Err(SkyreelError::process("restart refused"));
        }
        self.stopped.lock().insert(service, false);
        Ok(())
    }

    async fn start(&self, service: ServiceName) -> Result<()> {
        self.calls.lock().push(ControlCall::Start(service));
        self.stopped.lock().insert(service, false);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockSink {
    pub sent: Mutex<Vec<(ServiceName, Command)>>,
}

impl MockSink {
    pub fn sent(&self) -> Vec<(ServiceName, Command)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl CommandSink for MockSink {
    async fn dispatch(&self, service: ServiceName, command: Command) -> Result<()> {
        self.sent.lock().push((service, command));
        Ok(())
    }
}

// ============================================================================
// Job Context
// ============================================================================

pub struct Harness {
    pub database: Arc<MockDatabase>,
    pub storage: Arc<MockStorage>,
    pub encoder: Arc<MockEncoder>,
    pub probe: Arc<MockProbe>,
    pub mailer: Arc<MockMailer>,
}

impl Harness {
    pub fn new(resources: Vec<Resource>, images: Vec<Instance>) -> Self {
        Self {
            database: MockDatabase::with(resources),
            storage: MockStorage::with_images(images),
            encoder: Arc::new(MockEncoder::default()),
            probe: MockProbe::returning(Some((640, 480))),
            mailer: Arc::new(MockMailer::default()),
        }
    }

    pub fn context(&self, settings: ClipSettings) -> JobContext {
        JobContext {
            settings,
            database: self.database.clone(),
            storage: self.storage.clone(),
            encoder: self.encoder.clone(),
            probe: self.probe.clone(),
            mailer: self.mailer.clone(),
        }
    }
}
