use std::path::Path;

use async_trait::async_trait;
use error_stack::{Report, ResultExt};
use http::header::CONTENT_LENGTH;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::GatewayError;

/// Fetches a remote resource onto local disk.
#[async_trait]
pub trait FileDownloader: Send + Sync {
    /// Stream `url` into `dest`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns a file sync error on transport, status or write failures.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, Report<GatewayError>>;

    /// Size of the remote resource, when the source can report it cheaply.
    ///
    /// # Errors
    ///
    /// Returns a file sync error when the probe itself fails.
    async fn remote_size(&self, _url: &str) -> Result<Option<u64>, Report<GatewayError>> {
        Ok(None)
    }
}

/// HTTP downloader built on `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpFileDownloader {
    client: Client,
}

impl HttpFileDownloader {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FileDownloader for HttpFileDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, Report<GatewayError>> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .change_context(GatewayError::FileSync {
                message: format!("failed to download {url}"),
            })?;

        let mut file = File::create(dest)
            .await
            .change_context(GatewayError::FileSync {
                message: format!("failed to create {}", dest.display()),
            })?;

        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .change_context(GatewayError::FileSync {
                message: format!("failed to read body of {url}"),
            })?
        {
            file.write_all(&chunk)
                .await
                .change_context(GatewayError::FileSync {
                    message: format!("failed to write {}", dest.display()),
                })?;
            written += chunk.len() as u64;
        }

        file.flush().await.change_context(GatewayError::FileSync {
            message: format!("failed to flush {}", dest.display()),
        })?;
        file.sync_all()
            .await
            .change_context(GatewayError::FileSync {
                message: format!("failed to sync {}", dest.display()),
            })?;

        log::debug!("Downloaded {} bytes from {}", written, url);
        Ok(written)
    }

    async fn remote_size(&self, url: &str) -> Result<Option<u64>, Report<GatewayError>> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .change_context(GatewayError::FileSync {
                message: format!("HEAD request to {url} failed"),
            })?;

        Ok(response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok()))
    }
}
