//! Daemon orchestration -- store, processors, scheduler, and lifecycle.
//!
//! The [`Orchestrator`] loads configuration, opens the store, imports the
//! optional CVE feed, builds the processors from the registry, and runs
//! the poll loop until SIGINT or SIGTERM.
//!
//! # Processor Order
//!
//! 1. raw-to-parsed (Stage0 -> Stage1)
//! 2. parsed-to-catalog (Stage1 -> Stage2)
//! 3. catalog-enrichment (Stage2 -> CVE links)

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::broadcast;

use libtrail_core::config::LibtrailConfig;
use libtrail_pipeline::{LibraryTemporalTracker, ProcessorRegistry, feed};
use libtrail_store::Store;

use crate::metrics_server;
use crate::scheduler::{self, CycleReport, PipelineWorker, SharedWorker};

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: LibtrailConfig,
    /// Store and processors, shared with the scheduler task.
    worker: SharedWorker,
    /// Per-application library observations fed by the catalog processor.
    tracker: Arc<LibraryTemporalTracker>,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load `libtrail.toml` (with environment overrides) and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read, parsed, or validated
    /// - The store cannot be opened or migrated
    /// - The configured CVE feed cannot be imported
    /// - Any processor fails to initialize
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LibtrailConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: LibtrailConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let mut store = Store::from_config(&config.store)
            .map_err(|e| anyhow::anyhow!("failed to open store: {}", e))?;

        if !config.enrichment.cve_feed_path.is_empty() {
            let path = Path::new(&config.enrichment.cve_feed_path);
            let imported = feed::import_file(&mut store, path).map_err(|e| {
                anyhow::anyhow!("failed to import CVE feed {}: {}", path.display(), e)
            })?;
            tracing::info!(path = %path.display(), imported, "CVE feed imported at startup");
        }

        let tracker = Arc::new(LibraryTemporalTracker::new());
        let registry = ProcessorRegistry::with_builtin(Some(Arc::clone(&tracker)));
        let processors = registry
            .build_all(&config)
            .map_err(|e| anyhow::anyhow!("failed to initialize processors: {}", e))?;

        for processor in &processors {
            tracing::info!(
                processor = processor.name(),
                enabled = processor.is_enabled(),
                batch_size = processor.batch_size(),
                "processor ready"
            );
        }

        if config.metrics.enabled {
            record_daemon_metrics(processors.len());
        }

        let worker = PipelineWorker::new(store, processors, config.scheduler.max_drain_rounds);
        let (shutdown_tx, _) = broadcast::channel(16);

        tracing::info!(
            processors = registry.count(),
            poll_interval_secs = config.scheduler.poll_interval_secs,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            worker: Arc::new(Mutex::new(worker)),
            tracker,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Run the poll loop until a shutdown signal is received.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<()> {
        let pid_file = self.config.general.pid_file.clone();
        if !pid_file.is_empty() {
            write_pid_file(Path::new(&pid_file))?;
        }

        let scheduler_task = scheduler::spawn_scheduler(
            Arc::clone(&self.worker),
            Duration::from_secs(self.config.scheduler.poll_interval_secs),
            self.shutdown_tx.subscribe(),
        );

        let uptime_updater_task = if self.config.metrics.enabled {
            Some(spawn_uptime_updater(
                self.start_time,
                self.shutdown_tx.subscribe(),
            ))
        } else {
            None
        };

        tracing::info!("entering main event loop");
        let signal = match wait_for_shutdown_signal().await {
            Ok(signal) => signal,
            Err(e) => {
                let _ = self.shutdown_tx.send(());
                let _ = scheduler_task.await;
                if !pid_file.is_empty() {
                    remove_pid_file(Path::new(&pid_file));
                }
                return Err(e);
            }
        };
        tracing::info!(signal = signal, "shutdown signal received");

        // 진행 중인 배치가 커밋 또는 롤백될 때까지 대기
        let _ = self.shutdown_tx.send(());
        if let Err(e) = scheduler_task.await {
            tracing::error!(error = %e, "scheduler task ended abnormally");
        }
        if let Some(task) = uptime_updater_task {
            let _ = task.await;
        }

        if !pid_file.is_empty() {
            remove_pid_file(Path::new(&pid_file));
        }

        tracing::info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            active_libraries = self.tracker.total_active(),
            "libtrail-daemon shut down"
        );
        Ok(())
    }

    /// Run a single drain cycle and return its report.
    pub async fn run_once(&self) -> Result<CycleReport> {
        scheduler::run_cycle_blocking(&self.worker)
            .await
            .ok_or_else(|| anyhow::anyhow!("pipeline worker task failed"))
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &LibtrailConfig {
        &self.config
    }

    /// Temporal tracker shared with the catalog processor.
    pub fn tracker(&self) -> &Arc<LibraryTemporalTracker> {
        &self.tracker
    }

    /// Store and processors behind the scheduler lock.
    pub fn worker(&self) -> &SharedWorker {
        &self.worker
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create the file
/// - Verifies the created file is a regular file
/// - Creates the parent directory with mode 0o700 and the file with 0o600
///
/// # Errors
///
/// Returns an error if the file already exists or cannot be written.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata()?;
    if !metadata.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Record daemon-level metrics (build info, processors registered).
fn record_daemon_metrics(processor_count: usize) {
    use libtrail_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::DAEMON_PROCESSORS_REGISTERED).set(processor_count as f64);

    tracing::debug!(
        processor_count,
        version = env!("CARGO_PKG_VERSION"),
        "daemon metrics recorded"
    );
}

/// Spawn a background task that refreshes the uptime gauge every 10 seconds.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use libtrail_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
