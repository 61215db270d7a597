//! Durable, ordered collection of link records.

use anyhow::{Context, Result};
use log::{debug, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::LINKS_STORAGE_KEY;
use crate::defaults::KeyValueStore;

use super::LinkRecord;

/// Ordered link collection backed by a [`KeyValueStore`].
///
/// Insertion order is display order. Every mutation re-serializes the whole
/// collection while holding the lock, so concurrent updates to different
/// records never lose each other's writes.
pub struct LinkStore<K: KeyValueStore> {
    defaults: K,
    links: Mutex<Vec<LinkRecord>>,
}

impl<K: KeyValueStore> LinkStore<K> {
    /// Open the store, reading whatever collection is currently persisted.
    pub fn open(defaults: K) -> Self {
        let links = decode(&defaults);
        Self {
            defaults,
            links: Mutex::new(links),
        }
    }

    /// Re-read the persisted collection, replacing the in-memory copy.
    /// Missing or malformed data yields an empty collection.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> Vec<LinkRecord> {
        let mut links = self.links.lock().await;
        *links = decode(&self.defaults);
        links.clone()
    }

    /// Snapshot of the collection in display order.
    pub async fn links(&self) -> Vec<LinkRecord> {
        self.links.lock().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<LinkRecord> {
        self.links.lock().await.iter().find(|l| l.id == id).cloned()
    }

    /// Append a new record with a fresh id and creation time.
    #[tracing::instrument(skip(self))]
    pub async fn add(&self, url: &str, name: &str) -> Result<LinkRecord> {
        let record = LinkRecord::new(url, name);
        let mut links = self.links.lock().await;
        let mut next = links.clone();
        next.push(record.clone());
        self.commit(&mut links, next)?;
        debug!("Added link {} ({})", record.id, record.url);
        Ok(record)
    }

    /// Replace the record with the same id. Returns `false` (and persists
    /// nothing) when no such record exists.
    #[tracing::instrument(skip(self, record), fields(id = %record.id))]
    pub async fn update(&self, record: LinkRecord) -> Result<bool> {
        let mut links = self.links.lock().await;
        let Some(position) = links.iter().position(|l| l.id == record.id) else {
            debug!("Update for unknown link {}, ignoring", record.id);
            return Ok(false);
        };
        let mut next = links.clone();
        next[position] = record;
        self.commit(&mut links, next)?;
        Ok(true)
    }

    /// Remove the record with `id`, if present. Always persists.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let mut links = self.links.lock().await;
        let mut next = links.clone();
        next.retain(|l| l.id != id);
        self.commit(&mut links, next)
    }

    /// Remove the records at the given display positions. Out-of-range
    /// positions are ignored. Always persists.
    #[tracing::instrument(skip(self))]
    pub async fn delete_at(&self, indices: &[usize]) -> Result<()> {
        let mut links = self.links.lock().await;
        let mut indices: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| i < links.len())
            .collect();
        indices.sort_unstable();
        indices.dedup();
        let mut next = links.clone();
        for index in indices.into_iter().rev() {
            next.remove(index);
        }
        self.commit(&mut links, next)
    }

    /// Persist `next` and make it the in-memory collection. On failure the
    /// in-memory collection is left untouched.
    fn commit(&self, links: &mut Vec<LinkRecord>, next: Vec<LinkRecord>) -> Result<()> {
        let data = serde_json::to_vec(&next).context("Failed to encode link collection")?;
        self.defaults
            .set_data(LINKS_STORAGE_KEY, &data)
            .context("Failed to persist link collection")?;
        *links = next;
        Ok(())
    }
}

fn decode<K: KeyValueStore>(defaults: &K) -> Vec<LinkRecord> {
    let Some(data) = defaults.data(LINKS_STORAGE_KEY) else {
        return Vec::new();
    };
    match serde_json::from_slice(&data) {
        Ok(links) => links,
        Err(e) => {
            warn!("Discarding unreadable link collection: {}", e);
            Vec::new()
        }
    }
}
