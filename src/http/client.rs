//! HTTP client used for link probes and archive downloads.

use anyhow::{Context, Result};
use log::debug;
use reqwest::Client;
use reqwest::header::{CACHE_CONTROL, CONTENT_LENGTH, HeaderMap, PRAGMA};
use std::io::Write;
use std::time::Duration;

use super::error::{HttpError, classify};

/// Outcome of a body-less `HEAD` request.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadResponse {
    pub status: u16,
    /// `Content-Length`, when present and a valid non-negative integer.
    pub content_length: Option<u64>,
}

impl HeadResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Thin wrapper around a shared reqwest Client. No request is retried.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Issues a `HEAD` request that always goes to the origin.
    ///
    /// Any HTTP status is a successful exchange here; only transport failures
    /// are errors, as [`HttpError::Timeout`] or [`HttpError::Transport`].
    #[tracing::instrument(skip(self))]
    pub async fn head(&self, url: &str, timeout: Duration) -> Result<HeadResponse> {
        debug!("HEAD {} (timeout {:?})", url, timeout);

        let response = self
            .client
            .head(url)
            .header(CACHE_CONTROL, "no-cache, no-store")
            .header(PRAGMA, "no-cache")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        Ok(HeadResponse {
            status: response.status().as_u16(),
            content_length: parse_content_length(response.headers()),
        })
    }

    /// Streams `url` into the writer produced by `create_writer`.
    ///
    /// `on_chunk` receives `(bytes_received, total_bytes)` after every chunk;
    /// `total_bytes` is `None` when the server does not announce a length.
    /// The writer is only created once the server has answered with a 2xx.
    #[tracing::instrument(skip(self, create_writer, on_chunk))]
    pub async fn download_file<W, F, P>(
        &self,
        url: &str,
        create_writer: F,
        mut on_chunk: P,
    ) -> Result<u64>
    where
        W: Write,
        F: FnOnce() -> Result<W>,
        P: FnMut(u64, Option<u64>),
    {
        debug!("Downloading file from {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let mut response = response.error_for_status().map_err(|e| classify(&e))?;
        let total = response.content_length();

        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response.chunk().await.map_err(|e| classify(&e))? {
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
            on_chunk(downloaded_bytes, total);
        }
        writer.flush().context("Failed to flush downloaded file")?;

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(downloaded_bytes)
    }
}

fn parse_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

/// Whether an error came from the HTTP layer rather than local I/O.
pub fn http_error(e: &anyhow::Error) -> Option<&HttpError> {
    e.downcast_ref::<HttpError>()
}
