//! Owner of the four watchdog loops.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{
    CheckContext, MovieCheck, Notifier, RemoteDatabaseCheck, RetrievalCheck, StorageCheck,
    SystemCheck, WatchdogErrorEvent, WatchdogLoop,
};
use crate::clock::Clock;
use crate::config::{Config, TickConfig};
use crate::services::fs_storage::StorageLayout;
use crate::services::{
    CommandSink, Database, ImageProbe, Mailer, ProcessControl, RemoteDatabase, ServiceName, Storage,
};

/// Everything the watchdogs talk to.
#[derive(Clone)]
pub struct WatchdogCollaborators {
    pub database: Arc<dyn Database>,
    pub storage: Arc<dyn Storage>,
    pub probe: Arc<dyn ImageProbe>,
    pub control: Arc<dyn ProcessControl>,
    pub remote: Arc<dyn RemoteDatabase>,
    pub commands: Arc<dyn CommandSink>,
    pub mailer: Arc<dyn Mailer>,
}

pub struct WatchdogService {
    loops: Vec<Arc<WatchdogLoop>>,
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WatchdogService {
    /// Build a loop for every enabled watchdog.
    pub fn build(config: &Config, deps: WatchdogCollaborators, clock: Clock) -> Self {
        let notifier = Arc::new(Notifier::new(deps.mailer.clone(), config.email.timeout()));
        let ctx = CheckContext {
            notifier: notifier.clone(),
            control: deps.control.clone(),
            commands: deps.commands.clone(),
            control_timeout: config.services.timeout(),
        };
        let layout = StorageLayout::new(&config.storage.root_folder);
        let wd = &config.watchdog;

        let checks: Vec<(TickConfig, Arc<dyn SystemCheck>)> = vec![
            (
                wd.movie,
                Arc::new(MovieCheck::new(
                    ctx.clone(),
                    deps.storage.clone(),
                    deps.probe.clone(),
                    layout.clone(),
                    wd.probe_timeout(),
                    config.storage.timeout(),
                )),
            ),
            (
                wd.retrieval,
                Arc::new(RetrievalCheck::new(ctx.clone(), layout, wd.tolerance_factor)),
            ),
            (
                wd.storage,
                Arc::new(StorageCheck::new(
                    ctx.clone(),
                    deps.storage.clone(),
                    wd.storage.interval_minutes,
                    config.storage.timeout(),
                )),
            ),
            (
                wd.remote_database,
                Arc::new(RemoteDatabaseCheck::new(ctx, deps.remote.clone(), wd.probe_timeout())),
            ),
        ];

        let loops = checks
            .into_iter()
            .filter(|(tick, check)| {
                if !tick.enabled {
                    tracing::info!(service = %check.service(), "Watchdog disabled");
                }
                tick.enabled
            })
            .map(|(tick, check)| {
                Arc::new(WatchdogLoop::new(
                    check,
                    deps.database.clone(),
                    notifier.clone(),
                    tick,
                    config.storage.timeout(),
                    clock.clone(),
                ))
            })
            .collect();

        Self {
            loops,
            token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn every loop.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        for watchdog in &self.loops {
            handles.push(watchdog.clone().spawn(self.token.child_token()));
        }
        tracing::info!(watchdogs = self.loops.len(), "Watchdogs started");
    }

    pub fn loops(&self) -> &[Arc<WatchdogLoop>] {
        &self.loops
    }

    pub fn get(&self, service: ServiceName) -> Option<&Arc<WatchdogLoop>> {
        self.loops.iter().find(|l| l.service() == service)
    }

    /// Events recorded by one watchdog, oldest first.
    pub fn events(&self, service: ServiceName) -> Vec<WatchdogErrorEvent> {
        self.get(service).map(|l| l.events().snapshot()).unwrap_or_default()
    }

    /// Cancel all loops and wait for them to finish.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Watchdog task ended abnormally");
            }
        }
        tracing::info!("Watchdogs shut down");
    }
}
