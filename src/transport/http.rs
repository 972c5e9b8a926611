//! Raw HTTP download without the platform download manager
//!
//! Streams the response body straight to a file in the staging directory. The
//! target name comes from `Content-Disposition`, else the URL path. The file is
//! written under a hidden `.part` name and renamed once complete, so the scanner
//! never sees half a download.

use crate::config::RetryConfig;
use crate::error::{DownloadError, Error, InstallError, Result};
use crate::retry::with_retry;
use crate::tree::discard;
use crate::utils::extract_filename_from_headers;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const CHUNK_SIZE: usize = 64 * 1024;

/// Blocking HTTP downloader
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl HttpDownloader {
    /// Create a downloader retrying transient failures per `retry`
    ///
    /// Must not be called from inside an async context; use a worker thread.
    pub fn new(retry: RetryConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()?;
        Ok(Self {
            client,
            retry,
            cancel: CancellationToken::new(),
        })
    }

    /// Abort the transfer when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Download `url` into `dest_dir`, returning the written file
    ///
    /// An existing file of the same name is never replaced.
    pub fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<PathBuf> {
        with_retry(&self.retry, || self.attempt(url, dest_dir, progress))
    }

    fn attempt(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<PathBuf> {
        debug!(url, "requesting");
        let mut response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                uri: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let file_name = extract_filename_from_headers(response.headers(), url);
        let dest = dest_dir.join(&file_name);
        if dest.exists() {
            return Err(InstallError::DestinationExists { path: dest }.into());
        }
        let partial = dest_dir.join(format!(".{file_name}.part"));
        let total = response.content_length();

        let written = match self.stream_to(&mut response, &partial, url, total, progress) {
            Ok(written) => written,
            Err(e) => {
                discard(&partial);
                return Err(e);
            }
        };

        std::fs::rename(&partial, &dest).map_err(|e| InstallError::MoveFailed {
            source_path: partial.clone(),
            dest_path: dest.clone(),
            reason: e.to_string(),
        })?;
        info!(url, ?dest, bytes = written, "download complete");
        Ok(dest)
    }

    fn stream_to(
        &self,
        response: &mut reqwest::blocking::Response,
        partial: &Path,
        url: &str,
        total: Option<u64>,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<u64> {
        let mut file = File::create(partial)?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                return Err(DownloadError::Cancelled {
                    uri: url.to_string(),
                }
                .into());
            }
            let n = response.read(&mut buffer).map_err(Error::Io)?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])?;
            written += n as u64;
            progress(written, total);
        }
        file.flush()?;
        Ok(written)
    }
}
