//! The cache manager: descriptor → validated local archive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use citibike_core::ArchiveDescriptor;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpError};
use crate::policy::FetchPolicy;

/// Suffix for in-flight staging files next to their final entry.
const STAGING_SUFFIX: &str = ".part";

/// Summary of a [`CacheManager::purge`] pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurgeReport {
    pub dry_run: bool,
    pub matched_files: usize,
    pub deleted_files: usize,
    pub total_bytes: u64,
}

enum TransferFailure {
    Http(HttpError),
    Fatal(Error),
}

/// Maps descriptors to deterministic local paths and keeps the entries
/// valid: atomic placement, retry with backoff, one automatic re-download
/// on checksum mismatch, and same-entry coalescing.
pub struct CacheManager<C> {
    client: C,
    cache_dir: PathBuf,
    base_url: String,
    policy: FetchPolicy,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<C: HttpClient> CacheManager<C> {
    pub fn new(client: C, cache_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            cache_dir: cache_dir.into(),
            base_url: base_url.into(),
            policy: FetchPolicy::default(),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The underlying client, mainly so tests can assert on call counts.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The deterministic entry path for a descriptor.
    pub fn entry_path(&self, descriptor: &ArchiveDescriptor) -> PathBuf {
        descriptor.local_path(&self.cache_dir)
    }

    /// Purely local validity check; no network.
    pub fn is_cached(&self, descriptor: &ArchiveDescriptor) -> bool {
        self.validate_entry(descriptor, &self.entry_path(descriptor))
    }

    /// Return a validated local copy, downloading only when needed.
    ///
    /// Concurrent calls for the same descriptor serialize on a per-entry
    /// lock: the first caller transfers, the rest find the validated entry.
    pub async fn ensure_local(&self, descriptor: &ArchiveDescriptor) -> Result<PathBuf> {
        let lock = self.entry_lock(descriptor).await;
        let _guard = lock.lock().await;

        let path = self.entry_path(descriptor);
        if self.validate_entry(descriptor, &path) {
            debug!(archive = %descriptor.file_name(), "cache hit");
            return Ok(path);
        }
        self.fetch_entry(descriptor, &path).await?;
        Ok(path)
    }

    /// Force a fresh transfer, replacing any existing entry.
    pub async fn refresh(&self, descriptor: &ArchiveDescriptor) -> Result<PathBuf> {
        let lock = self.entry_lock(descriptor).await;
        let _guard = lock.lock().await;

        let path = self.entry_path(descriptor);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::remove_file(&path)
                .await
                .map_err(Error::io(&path))?;
        }
        self.fetch_entry(descriptor, &path).await?;
        Ok(path)
    }

    /// Report and optionally delete the entire cache directory.
    pub fn purge(&self, dry_run: bool) -> Result<PurgeReport> {
        let mut report = PurgeReport {
            dry_run,
            matched_files: 0,
            deleted_files: 0,
            total_bytes: 0,
        };
        if !self.cache_dir.is_dir() {
            return Ok(report);
        }
        visit_files(&self.cache_dir, &mut |path, len| {
            report.matched_files += 1;
            report.total_bytes += len;
            if !dry_run {
                std::fs::remove_file(path).map_err(Error::io(path))?;
                report.deleted_files += 1;
            }
            Ok(())
        })?;
        if !dry_run {
            std::fs::remove_dir_all(&self.cache_dir).map_err(Error::io(&self.cache_dir))?;
        }
        Ok(report)
    }

    async fn entry_lock(&self, descriptor: &ArchiveDescriptor) -> Arc<Mutex<()>> {
        let mut inflight = self.inflight.lock().await;
        inflight
            .entry(descriptor.file_name())
            .or_default()
            .clone()
    }

    /// Size check when the descriptor knows one, checksum when it carries
    /// one; a bare existing file is otherwise taken as valid.
    fn validate_entry(&self, descriptor: &ArchiveDescriptor, path: &Path) -> bool {
        let Ok(meta) = std::fs::metadata(path) else {
            return false;
        };
        if !meta.is_file() {
            return false;
        }
        if let Some(expected) = descriptor.expected_size
            && meta.len() != expected
        {
            return false;
        }
        if let Some(expected) = descriptor.checksum {
            return file_sha256(path).is_ok_and(|actual| actual == expected);
        }
        true
    }

    async fn fetch_entry(&self, descriptor: &ArchiveDescriptor, path: &Path) -> Result<()> {
        let archive = descriptor.file_name();
        let url = descriptor.remote_url(&self.base_url);
        let staging = path.with_file_name(format!("{archive}{STAGING_SUFFIX}"));

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(Error::io(parent))?;
        }

        let mut redownloaded = false;
        let mut attempt = 0u32;
        loop {
            let failure = match self.transfer(&url, &staging).await {
                Ok((bytes, digest)) => {
                    match self.validate_transfer(descriptor, bytes, digest) {
                        Ok(()) => {
                            tokio::fs::rename(&staging, path)
                                .await
                                .map_err(Error::io(path))?;
                            info!(archive = %archive, bytes, "archive cached");
                            return Ok(());
                        }
                        Err(err @ Error::Integrity { .. }) if !redownloaded => {
                            // one automatic re-download before giving up
                            warn!(archive = %archive, %err, "re-downloading after checksum mismatch");
                            redownloaded = true;
                            attempt = 0;
                            self.discard_staging(&staging).await;
                            continue;
                        }
                        Err(err) => {
                            self.discard_staging(&staging).await;
                            return Err(err);
                        }
                    }
                }
                Err(failure) => failure,
            };

            self.discard_staging(&staging).await;
            match failure {
                TransferFailure::Fatal(err) => return Err(err),
                TransferFailure::Http(source) => {
                    if source.is_transient() && attempt < self.policy.max_retries {
                        let delay = self.policy.retry_delay(attempt);
                        warn!(archive = %archive, attempt, %source, "transfer failed, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    } else {
                        return Err(Error::Download {
                            archive,
                            attempts: attempt + 1,
                            source,
                        });
                    }
                }
            }
        }
    }

    /// Stream one transfer to the staging path, hashing as bytes arrive.
    async fn transfer(
        &self,
        url: &str,
        staging: &Path,
    ) -> std::result::Result<(u64, [u8; 32]), TransferFailure> {
        let response = self
            .client
            .get(url)
            .await
            .map_err(TransferFailure::Http)?;

        let mut file = tokio::fs::File::create(staging)
            .await
            .map_err(|e| TransferFailure::Fatal(Error::io(staging)(e)))?;
        let mut hasher = Sha256::new();
        let mut written = 0u64;

        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(TransferFailure::Http)?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| TransferFailure::Fatal(Error::io(staging)(e)))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| TransferFailure::Fatal(Error::io(staging)(e)))?;

        if let Some(advertised) = response.content_length
            && written != advertised
        {
            // truncated body; retryable like any transport failure
            return Err(TransferFailure::Http(HttpError::transport(format!(
                "truncated body: {written} of {advertised} bytes"
            ))));
        }
        Ok((written, hasher.finalize().into()))
    }

    fn validate_transfer(
        &self,
        descriptor: &ArchiveDescriptor,
        bytes: u64,
        digest: [u8; 32],
    ) -> Result<()> {
        if let Some(expected) = descriptor.expected_size
            && bytes != expected
        {
            return Err(Error::SizeMismatch {
                archive: descriptor.file_name(),
                expected,
                actual: bytes,
            });
        }
        if let Some(expected) = descriptor.checksum
            && digest != expected
        {
            return Err(Error::Integrity {
                archive: descriptor.file_name(),
                expected: hex::encode(expected),
                actual: hex::encode(digest),
            });
        }
        Ok(())
    }

    async fn discard_staging(&self, staging: &Path) {
        let _ = tokio::fs::remove_file(staging).await;
    }
}

fn visit_files(dir: &Path, f: &mut impl FnMut(&Path, u64) -> Result<()>) -> Result<()> {
    for entry in std::fs::read_dir(dir).map_err(Error::io(dir))? {
        let entry = entry.map_err(Error::io(dir))?;
        let path = entry.path();
        if path.is_dir() {
            visit_files(&path, f)?;
        } else if let Ok(meta) = entry.metadata() {
            f(&path, meta.len())?;
        }
    }
    Ok(())
}

fn file_sha256(path: &Path) -> std::io::Result<[u8; 32]> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().into())
}
