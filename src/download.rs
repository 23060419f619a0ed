//! Download decision and execution for a single media item.
//!
//! Each item gets two candidate paths. A local file matching the remote item
//! at either path means the item is already backed up and the network is
//! never touched; otherwise the body is streamed to the last-checked path.

use std::io;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::api::{ApiClient, ApiError};
use crate::files;

/// How strictly a local file must match the remote item to count as already
/// backed up. The checksum policy also requires the MD5 reported by the
/// server to match the local file's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    SizeOnly,
    SizeAndChecksum,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{url}: download failed with: {source}")]
    Fetch {
        url: String,
        #[source]
        source: ApiError,
    },
    #[error("{}: file creation failed with: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: file content copy failed with: {source}", .path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{url}: reading body failed with: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("checking {}: {source}", .path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub struct Downloader<'a> {
    api: &'a ApiClient,
    policy: MatchPolicy,
    dry_run: bool,
}

impl<'a> Downloader<'a> {
    pub fn new(api: &'a ApiClient, policy: MatchPolicy, dry_run: bool) -> Self {
        Self {
            api,
            policy,
            dry_run,
        }
    }

    /// Decide whether the item needs downloading and, if so, stream it to
    /// disk. Returns `Ok(false)` when an existing local file already matches,
    /// `Ok(true)` when a download happened (or would have, under dry-run).
    pub async fn resolve(
        &self,
        primary: &Path,
        fallback: &Path,
        url: &str,
        size: u64,
        md5: &str,
    ) -> Result<bool, DownloadError> {
        let mut dest = primary;
        if primary.exists() {
            if self.local_match(primary, size, md5).await? {
                debug!("File exists with same size: {url}");
                return Ok(false);
            }
            debug!(
                "File exists but looks different, trying unique name {}",
                fallback.display()
            );
            dest = fallback;
            if fallback.exists() && self.local_match(fallback, size, md5).await? {
                debug!("Unique file exists with same size: {url}");
                return Ok(false);
            }
        }

        info!("Getting {url}");
        if self.dry_run {
            info!("[DRY RUN] Would save {}", dest.display());
            return Ok(true);
        }

        let response = self
            .api
            .get_raw(url)
            .await
            .map_err(|source| DownloadError::Fetch {
                url: url.to_string(),
                source,
            })?;

        let mut file = File::create(dest)
            .await
            .map_err(|source| DownloadError::Create {
                path: dest.to_path_buf(),
                source,
            })?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| DownloadError::Body {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|source| DownloadError::Copy {
                    path: dest.to_path_buf(),
                    source,
                })?;
        }
        file.flush().await.map_err(|source| DownloadError::Copy {
            path: dest.to_path_buf(),
            source,
        })?;

        info!("Saved {}", dest.display());
        Ok(true)
    }

    /// Whether the existing file at `path` already matches the remote item
    /// under the configured policy.
    async fn local_match(&self, path: &Path, size: u64, md5: &str) -> Result<bool, DownloadError> {
        let probe_err = |source: io::Error| DownloadError::Probe {
            path: path.to_path_buf(),
            source,
        };

        if !files::same_file_size(path, size).map_err(probe_err)? {
            return Ok(false);
        }
        if self.policy == MatchPolicy::SizeOnly || md5.is_empty() {
            return Ok(true);
        }

        let owned = path.to_path_buf();
        let local = tokio::task::spawn_blocking(move || files::file_md5(&owned))
            .await
            .map_err(|e| probe_err(io::Error::other(e)))?
            .map_err(probe_err)?;
        Ok(local.eq_ignore_ascii_case(md5))
    }
}
