//! Two-stage package download: redirect resolution, then the byte transfer.

use std::path::Path;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{COOKIE, LOCATION, USER_AGENT};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::http::check_status;
use crate::store::DownloadTarget;

/// Size of the pieces the body is written and reported in.
pub const CHUNK_SIZE: usize = 4096;

/// Trait for receiving transfer progress updates.
pub trait DownloadProgress: Send + Sync {
    /// Called after every written chunk with the completed percentage.
    fn on_progress(&self, _percent: u8) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {}

/// Returns `100 * written / expected`, capped at 100.
#[must_use]
pub fn percent(written: u64, expected: u64) -> u8 {
    if expected == 0 {
        return 100;
    }
    let pct = written.saturating_mul(100) / expected;
    u8::try_from(pct.min(100)).unwrap_or(100)
}

/// Copies `stream` into `writer` in [`CHUNK_SIZE`] pieces, reporting progress
/// after each one.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] if `cancel` fires, any write error, and
/// [`Error::IncompleteTransfer`] if the byte count differs from `expected`
/// or the stream fails before `expected` bytes arrived. Stream errors after
/// that point are passed on as they are.
pub async fn copy_chunks<S, E, W, P>(
    stream: S,
    writer: &mut W,
    expected: u64,
    progress: &P,
    cancel: &CancellationToken,
) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    Error: From<E>,
    W: AsyncWrite + Unpin,
    P: DownloadProgress + ?Sized,
{
    let mut stream = std::pin::pin!(stream);
    let mut written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            next = stream.next() => next,
        };
        let chunk = match next {
            None => break,
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) if written < expected => {
                log::debug!("Body stream failed after {written} bytes: {}", Error::from(e));
                return Err(Error::IncompleteTransfer {
                    expected,
                    received: written,
                });
            }
            Some(Err(e)) => return Err(e.into()),
        };

        for piece in chunk.chunks(CHUNK_SIZE) {
            writer.write_all(piece).await?;
            written += piece.len() as u64;
            progress.on_progress(percent(written, expected));
        }
    }
    writer.flush().await?;

    if written != expected {
        log::warn!("Transfer ended after {written} of {expected} bytes");
        return Err(Error::IncompleteTransfer {
            expected,
            received: written,
        });
    }
    Ok(written)
}

/// Downloads resolved packages to local files.
pub struct Downloader<F: FileSystem = TokioFileSystem> {
    http: reqwest::Client,
    user_agent: String,
    fs: F,
}

impl Downloader<TokioFileSystem> {
    /// Creates a new downloader with the default file system.
    #[must_use]
    pub fn new(http: reqwest::Client, user_agent: impl Into<String>) -> Self {
        Self::with_fs(http, user_agent, TokioFileSystem)
    }
}

impl<F: FileSystem> Downloader<F> {
    /// Creates a new downloader with a custom file system implementation.
    #[must_use]
    pub fn with_fs(http: reqwest::Client, user_agent: impl Into<String>, fs: F) -> Self {
        Self {
            http,
            user_agent: user_agent.into(),
            fs,
        }
    }

    async fn get(&self, url: &str, market_da: &str) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(COOKIE, format!("MarketDA={market_da}"))
            .send()
            .await?;
        check_status(response).await
    }

    /// Requests the signed URL and returns the `Location` it redirects to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] for error statuses, [`Error::UnexpectedStatus`]
    /// for anything other than `302`, and [`Error::MissingResponseField`] if
    /// the redirect has no usable `Location`.
    pub async fn resolve_redirect(&self, target: &DownloadTarget) -> Result<String> {
        let response = self.get(&target.url, &target.market_da).await?;
        let status = response.status();
        if status != StatusCode::FOUND {
            return Err(Error::UnexpectedStatus(status.as_u16()));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::MissingResponseField("Location"))?;
        let location = response
            .url()
            .join(location)
            .map_err(|_| Error::MissingResponseField("Location"))?;

        if location.scheme() != "https" {
            log::warn!("Package is served over unencrypted {}", location.scheme());
        }
        Ok(location.into())
    }

    /// Fetches `url` into `dest`, replacing any existing file.
    ///
    /// A partially written file is removed again on failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] for error statuses,
    /// [`Error::MissingResponseField`] without a declared length, and any
    /// error of [`copy_chunks`].
    pub async fn transfer<P>(
        &self,
        url: &str,
        market_da: &str,
        dest: &Path,
        progress: &P,
        cancel: &CancellationToken,
    ) -> Result<u64>
    where
        P: DownloadProgress + ?Sized,
    {
        let response = self.get(url, market_da).await?;
        let expected = response
            .content_length()
            .ok_or(Error::MissingResponseField("Content-Length"))?;
        log::info!("Downloading {expected} bytes to {}", dest.display());

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs.create_dir_all(parent).await?;
        }
        if self.fs.file_exists(dest).await {
            self.fs.remove_file(dest).await?;
        }
        let mut file = self.fs.create_file(dest).await?;

        let result = copy_chunks(response.bytes_stream(), &mut file, expected, progress, cancel).await;
        drop(file);
        if result.is_err() {
            let _ = self.fs.remove_file(dest).await;
        }
        result
    }

    /// Runs both stages for `target`, writing the package to `dest`.
    ///
    /// # Errors
    ///
    /// Returns the first error of either stage; the transfer never starts
    /// if the redirect stage fails.
    pub async fn download<P>(
        &self,
        target: &DownloadTarget,
        dest: &Path,
        progress: &P,
        cancel: &CancellationToken,
    ) -> Result<u64>
    where
        P: DownloadProgress + ?Sized,
    {
        let location = self.resolve_redirect(target).await?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.transfer(&location, &target.market_da, dest, progress, cancel)
            .await
    }
}
