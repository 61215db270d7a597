//! Lightweight reachability/size checks for saved links.

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use std::time::Duration;
use url::Url;

use crate::http::{HttpClient, HttpError, http_error};

use super::{LinkRecord, Reachability};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    /// Check `record`'s URL and return the record with its status fields
    /// refreshed. Never fails: every problem ends up as `Unreachable`.
    async fn probe(&self, record: LinkRecord) -> LinkRecord;
}

/// Probes links with a cache-bypassing `HEAD` request.
pub struct HttpProber {
    client: HttpClient,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(client: HttpClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Prober for HttpProber {
    #[tracing::instrument(skip(self, record), fields(id = %record.id))]
    async fn probe(&self, mut record: LinkRecord) -> LinkRecord {
        let now = Utc::now();
        record.last_probed_at = Some(match record.last_probed_at {
            Some(previous) if previous > now => previous,
            _ => now,
        });

        let url = match Url::parse(&record.url) {
            Ok(url) => url,
            Err(e) => {
                debug!("Link {} has an invalid URL {:?}: {}", record.id, record.url, e);
                record.reachability = Reachability::Unreachable;
                record.size_bytes = None;
                return record;
            }
        };

        match self.client.head(url.as_str(), self.timeout).await {
            Ok(head) => {
                record.reachability = if head.is_success() {
                    Reachability::Reachable
                } else {
                    Reachability::Unreachable
                };
                // A missing header keeps the last known size.
                if let Some(size) = head.content_length {
                    record.size_bytes = Some(size);
                }
            }
            Err(e) => {
                if matches!(http_error(&e), Some(HttpError::Timeout)) {
                    debug!("Probe of {} timed out after {:?}", url, self.timeout);
                } else {
                    debug!("Probe of {} failed: {:#}", url, e);
                }
                record.reachability = Reachability::Unreachable;
            }
        }
        record
    }
}
