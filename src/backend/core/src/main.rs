//! Skyreel Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;

use skyreel_core::{
    clock::system_clock,
    command::{
        api::{self, AppState},
        CommandHandler,
    },
    config::Config,
    jobs::{ClipSettings, DayLongClipFactory, HourlyClipFactory, JobContext, JobFamily, JobRegistry, SerialJobRunner},
    services::{
        fs_storage::StorageLayout, CommandRouter, FfmpegEncoder, FsStorage, HttpImageProbe,
        HttpRemoteDatabase, LogMailer, Mailer, PgDatabase, SmtpMailer, SystemctlControl,
    },
    telemetry,
    watchdog::{WatchdogCollaborators, WatchdogService},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match std::env::var("SKYREEL_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::load()?,
    };

    telemetry::init_logging(&config.observability)?;
    let metrics = telemetry::init_metrics(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Skyreel Server");

    // Collaborators
    let database = Arc::new(PgDatabase::connect(&config.database).await?);
    database.migrate().await?;
    tracing::info!("Connected to database");

    let storage = Arc::new(FsStorage::new(&config.storage.root_folder)?);
    let encoder = Arc::new(FfmpegEncoder::new(
        config.encoder.clone(),
        StorageLayout::new(&config.storage.root_folder),
        storage.clone(),
    ));
    let probe = Arc::new(HttpImageProbe::new(config.jobs.probe_timeout())?);
    let mailer: Arc<dyn Mailer> = if config.email.smtp_host.is_some() {
        Arc::new(SmtpMailer::new(config.email.clone())?)
    } else {
        tracing::warn!("No SMTP host configured, admin email will only be logged");
        Arc::new(LogMailer)
    };

    // Jobs
    let clock = system_clock();
    let ctx = JobContext {
        settings: ClipSettings::from_config(&config),
        database: database.clone(),
        storage: storage.clone(),
        encoder,
        probe: probe.clone(),
        mailer: mailer.clone(),
    };
    let hourly = Arc::new(JobRegistry::new(
        Arc::new(HourlyClipFactory::new(ctx.clone())),
        SerialJobRunner::start(JobFamily::Hourly, clock.clone()),
        clock.clone(),
    ));
    let day_long = Arc::new(JobRegistry::new(
        Arc::new(DayLongClipFactory::new(ctx.clone())),
        SerialJobRunner::start(JobFamily::DayLong, clock.clone()),
        clock.clone(),
    ));
    let handler = Arc::new(CommandHandler::new(hourly.clone(), day_long.clone(), ctx, clock.clone()));
    handler.schedule_all().await?;

    // Watchdogs
    let commands = Arc::new(CommandRouter::new(
        handler.clone(),
        config.services.retrieval_command_url.clone(),
        config.services.timeout(),
    )?);
    let watchdogs = Arc::new(WatchdogService::build(
        &config,
        WatchdogCollaborators {
            database,
            storage,
            probe,
            control: Arc::new(SystemctlControl::new(config.services.clone())),
            remote: Arc::new(HttpRemoteDatabase::new(
                config.services.remote_database_url.clone(),
                config.watchdog.probe_timeout(),
            )?),
            commands,
            mailer,
        },
        clock,
    ));
    watchdogs.start();

    // Command API
    let app = api::router(AppState {
        handler,
        watchdogs: Some(watchdogs.clone()),
        metrics,
    });
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    watchdogs.shutdown().await;
    hourly.shutdown();
    day_long.shutdown();
    hourly.runner().shutdown();
    day_long.runner().shutdown();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
