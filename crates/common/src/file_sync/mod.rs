//! Remote file synchronization.
//!
//! A [`RemoteFileSyncer`] keeps an externally hosted file mirrored on local
//! disk, refreshing it on an interval with retries, and exposes the current
//! copy through a [`SyncHandle`].

pub mod backoff;
pub mod config;
pub mod downloader;
pub mod syncer;
pub mod validator;

pub use backoff::Backoff;
pub use config::{RemoteFileSyncerConfig, RetryPolicy};
pub use downloader::{FileDownloader, HttpFileDownloader};
pub use syncer::{ActiveFile, CycleOutcome, FileConsumer, RemoteFileSyncer, SyncHandle, SyncState};
pub use validator::{FileValidator, Sha256Validator};
