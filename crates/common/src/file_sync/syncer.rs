//! Background synchronizer keeping one remote file mirrored locally.
//!
//! Each cycle downloads into the temp path, optionally validates the result,
//! and renames it over the Active path. Readers only ever observe the
//! [`ActiveFile`] published on a `watch` channel after the rename committed,
//! so they see either the previous complete file or the new one.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, timeout, Instant};

use crate::error::GatewayError;

use super::backoff::Backoff;
use super::config::RemoteFileSyncerConfig;
use super::downloader::FileDownloader;
use super::validator::FileValidator;

/// Lifecycle state of a synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Downloading { attempt: u32 },
    Validating { attempt: u32 },
    Swapping,
    Active,
    Failed { attempt: u32 },
}

/// The file currently visible to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFile {
    pub path: PathBuf,
    /// Increases by one on every swap; `1` is the first activation.
    pub version: u64,
    pub activated_at: DateTime<Utc>,
    pub size: u64,
}

/// Notified after each activation, e.g. to reload a lookup database.
#[async_trait]
pub trait FileConsumer: Send + Sync {
    /// # Errors
    ///
    /// Failures are logged by the synchronizer and do not undo the swap.
    async fn on_file_activated(&self, file: &ActiveFile) -> Result<(), Report<GatewayError>>;
}

/// Result of one synchronization cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Activated(ActiveFile),
    /// The remote file matches the Active one; nothing was downloaded.
    Skipped,
    /// Every attempt failed; the Active file was left untouched.
    Exhausted { attempts: u32 },
}

/// Read side of a synchronizer, cheap to clone.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    active: watch::Receiver<Option<ActiveFile>>,
    state: watch::Receiver<SyncState>,
}

impl SyncHandle {
    /// The current Active file, if one was ever activated.
    #[must_use]
    pub fn active(&self) -> Option<ActiveFile> {
        self.active.borrow().clone()
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Wait until a new Active file is published.
    ///
    /// # Errors
    ///
    /// Returns a file sync error once the synchronizer is gone.
    pub async fn changed(&mut self) -> Result<(), Report<GatewayError>> {
        self.active
            .changed()
            .await
            .change_context(GatewayError::FileSync {
                message: "synchronizer stopped".to_string(),
            })
    }
}

pub struct RemoteFileSyncer {
    config: RemoteFileSyncerConfig,
    save_path: PathBuf,
    tmp_path: PathBuf,
    downloader: Arc<dyn FileDownloader>,
    validator: Option<Arc<dyn FileValidator>>,
    consumer: Option<Arc<dyn FileConsumer>>,
    backoff: Mutex<Backoff>,
    active_tx: watch::Sender<Option<ActiveFile>>,
    state_tx: watch::Sender<SyncState>,
}

impl RemoteFileSyncer {
    pub fn new(config: RemoteFileSyncerConfig, downloader: Arc<dyn FileDownloader>) -> Self {
        let (active_tx, _) = watch::channel(None);
        let (state_tx, _) = watch::channel(SyncState::Idle);
        Self {
            save_path: PathBuf::from(&config.save_filepath),
            tmp_path: PathBuf::from(&config.tmp_filepath),
            backoff: Mutex::new(Backoff::new(config.retry.clone())),
            config,
            downloader,
            validator: None,
            consumer: None,
            active_tx,
            state_tx,
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn FileValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn with_consumer(mut self, consumer: Arc<dyn FileConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            active: self.active_tx.subscribe(),
            state: self.state_tx.subscribe(),
        }
    }

    /// Publish an existing Active file, or run a first cycle when there is
    /// none.
    pub async fn initialize(&self) -> CycleOutcome {
        match tokio::fs::metadata(&self.save_path).await {
            Ok(metadata) if metadata.is_file() => {
                log::info!(
                    "File sync '{}': using existing {}",
                    self.config.name,
                    self.save_path.display()
                );
                let active = self.next_active(metadata.len());
                self.publish(active.clone()).await;
                CycleOutcome::Activated(active)
            }
            _ => self.run_cycle().await,
        }
    }

    /// Run one download, validate and swap cycle with retries.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if !self.is_update_required().await {
            log::debug!(
                "File sync '{}': remote file unchanged, skipping",
                self.config.name
            );
            return CycleOutcome::Skipped;
        }

        let mut backoff = self.backoff.lock().await;
        backoff.reset();

        loop {
            let attempt = backoff.failures() + 1;
            let error = match self.attempt(attempt).await {
                Ok(active) => return CycleOutcome::Activated(active),
                Err(error) => error,
            };

            log::warn!(
                "File sync '{}': attempt {} failed: {:?}",
                self.config.name,
                attempt,
                error
            );
            self.remove_tmp().await;
            self.state_tx.send_replace(SyncState::Failed { attempt });

            match backoff.on_failure(Instant::now()) {
                Some(delay) => sleep(delay).await,
                None => {
                    log::error!(
                        "File sync '{}': giving up after {} attempts, keeping current file",
                        self.config.name,
                        attempt
                    );
                    self.state_tx.send_replace(SyncState::Idle);
                    return CycleOutcome::Exhausted { attempts: attempt };
                }
            }
        }
    }

    /// Whether a refresh should download the file again.
    ///
    /// When the downloader reports a remote size equal to the Active file's
    /// size the download is skipped.
    pub async fn is_update_required(&self) -> bool {
        let Some(active) = self.active_tx.borrow().clone() else {
            return true;
        };

        match self.downloader.remote_size(&self.config.download_url).await {
            Ok(Some(remote_size)) => remote_size != active.size,
            Ok(None) => true,
            Err(e) => {
                log::debug!(
                    "File sync '{}': size probe failed, downloading: {:?}",
                    self.config.name,
                    e
                );
                true
            }
        }
    }

    /// Initialize, then refresh on the configured interval until `shutdown`
    /// resolves.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        tokio::select! {
            () = &mut shutdown => return,
            _ = self.initialize() => {}
        }

        if self.config.update_interval_ms == 0 {
            log::info!("File sync '{}': refresh disabled", self.config.name);
            return;
        }

        let interval = Duration::from_millis(self.config.update_interval_ms);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                () = sleep(interval) => {}
            }
            // A cycle may spend minutes in retries; shutdown must cut it short.
            tokio::select! {
                () = &mut shutdown => break,
                _ = self.run_cycle() => {}
            }
        }
        log::info!("File sync '{}': stopping", self.config.name);
    }

    async fn attempt(&self, attempt: u32) -> Result<ActiveFile, Report<GatewayError>> {
        self.state_tx
            .send_replace(SyncState::Downloading { attempt });
        ensure_parent(&self.tmp_path).await?;

        let per_attempt = Duration::from_millis(self.config.timeout_ms);
        let size = timeout(
            per_attempt,
            self.downloader
                .download(&self.config.download_url, &self.tmp_path),
        )
        .await
        .change_context(GatewayError::FileSync {
            message: format!("download timed out after {}ms", self.config.timeout_ms),
        })??;

        if let Some(validator) = &self.validator {
            self.state_tx.send_replace(SyncState::Validating { attempt });
            validator.validate(&self.tmp_path).await?;
        }

        self.state_tx.send_replace(SyncState::Swapping);
        ensure_parent(&self.save_path).await?;
        tokio::fs::rename(&self.tmp_path, &self.save_path)
            .await
            .change_context(GatewayError::FileSync {
                message: format!(
                    "failed to move {} to {}",
                    self.tmp_path.display(),
                    self.save_path.display()
                ),
            })?;

        let active = self.next_active(size);
        self.publish(active.clone()).await;
        Ok(active)
    }

    fn next_active(&self, size: u64) -> ActiveFile {
        let version = self
            .active_tx
            .borrow()
            .as_ref()
            .map_or(1, |active| active.version + 1);
        ActiveFile {
            path: self.save_path.clone(),
            version,
            activated_at: Utc::now(),
            size,
        }
    }

    async fn publish(&self, active: ActiveFile) {
        log::info!(
            "File sync '{}': activated version {} ({} bytes) at {}",
            self.config.name,
            active.version,
            active.size,
            active.path.display()
        );
        self.active_tx.send_replace(Some(active.clone()));
        self.state_tx.send_replace(SyncState::Active);

        if let Some(consumer) = &self.consumer {
            if let Err(e) = consumer.on_file_activated(&active).await {
                log::warn!(
                    "File sync '{}': consumer rejected version {}: {:?}",
                    self.config.name,
                    active.version,
                    e
                );
            }
        }
    }

    async fn remove_tmp(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.tmp_path).await {
            if e.kind() != ErrorKind::NotFound {
                log::warn!(
                    "File sync '{}': failed to remove {}: {}",
                    self.config.name,
                    self.tmp_path.display(),
                    e
                );
            }
        }
    }
}

async fn ensure_parent(path: &Path) -> Result<(), Report<GatewayError>> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    tokio::fs::create_dir_all(parent)
        .await
        .change_context(GatewayError::FileSync {
            message: format!("failed to create {}", parent.display()),
        })
}
