use std::path::Path;

use async_trait::async_trait;
use error_stack::{Report, ResultExt};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::GatewayError;

/// Check run on a freshly downloaded file before it becomes Active.
#[async_trait]
pub trait FileValidator: Send + Sync {
    /// # Errors
    ///
    /// Returns a file sync error when the file must not be activated.
    async fn validate(&self, path: &Path) -> Result<(), Report<GatewayError>>;
}

/// Compares the file's SHA-256 digest with an expected hex value.
#[derive(Debug, Clone)]
pub struct Sha256Validator {
    expected: String,
}

impl Sha256Validator {
    pub fn new(expected_hex: impl Into<String>) -> Self {
        Self {
            expected: expected_hex.into().to_ascii_lowercase(),
        }
    }
}

#[async_trait]
impl FileValidator for Sha256Validator {
    async fn validate(&self, path: &Path) -> Result<(), Report<GatewayError>> {
        let mut file = File::open(path)
            .await
            .change_context(GatewayError::FileSync {
                message: format!("failed to open {}", path.display()),
            })?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let read = file
                .read(&mut buffer)
                .await
                .change_context(GatewayError::FileSync {
                    message: format!("failed to read {}", path.display()),
                })?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        let actual = hex::encode(hasher.finalize());
        if actual != self.expected {
            return Err(Report::new(GatewayError::FileSync {
                message: format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    path.display(),
                    self.expected,
                    actual
                ),
            }));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // SHA-256 of "hello".
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[tokio::test]
    async fn accepts_matching_digest() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("file");
        tokio::fs::write(&path, b"hello")
            .await
            .expect("should write file");

        Sha256Validator::new(HELLO_SHA256.to_uppercase())
            .validate(&path)
            .await
            .expect("digest should match");
    }

    #[tokio::test]
    async fn rejects_mismatching_digest() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("file");
        tokio::fs::write(&path, b"tampered")
            .await
            .expect("should write file");

        let err = Sha256Validator::new(HELLO_SHA256)
            .validate(&path)
            .await
            .expect_err("digest should not match");
        assert!(format!("{err}").contains("checksum mismatch"));
    }
}
