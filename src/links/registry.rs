//! Concurrent refresh coordination over the link store.

use anyhow::Result;
use futures_util::future::join_all;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::defaults::KeyValueStore;

use super::{LinkRecord, LinkStore, Prober};

/// Ties the link store to a prober.
///
/// Probes run as independent tasks; their results flow back through the
/// store, which is the single writer of the persisted collection.
pub struct LinkRegistry<K: KeyValueStore + 'static, P: Prober + 'static> {
    store: Arc<LinkStore<K>>,
    prober: Arc<P>,
    refreshing: Arc<RefreshState>,
}

impl<K: KeyValueStore + 'static, P: Prober + 'static> Clone for LinkRegistry<K, P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prober: Arc::clone(&self.prober),
            refreshing: Arc::clone(&self.refreshing),
        }
    }
}

/// Number of running refresh batches, published as a flag.
struct RefreshState {
    active: Mutex<usize>,
    flag: watch::Sender<bool>,
}

/// Holds one batch open; the flag drops to `false` with the last guard.
struct RefreshingFlag(Arc<RefreshState>);

impl RefreshingFlag {
    fn raise(state: &Arc<RefreshState>) -> Self {
        let mut active = lock(&state.active);
        *active += 1;
        state.flag.send_replace(true);
        drop(active);
        Self(Arc::clone(state))
    }
}

impl Drop for RefreshingFlag {
    fn drop(&mut self) {
        let mut active = lock(&self.0.active);
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.0.flag.send_replace(false);
        }
    }
}

fn lock(active: &Mutex<usize>) -> MutexGuard<'_, usize> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<K: KeyValueStore + 'static, P: Prober + 'static> LinkRegistry<K, P> {
    pub fn new(store: Arc<LinkStore<K>>, prober: Arc<P>) -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            store,
            prober,
            refreshing: Arc::new(RefreshState {
                active: Mutex::new(0),
                flag,
            }),
        }
    }

    pub fn store(&self) -> &LinkStore<K> {
        &self.store
    }

    /// Observe the "is refreshing" flag.
    pub fn refreshing(&self) -> watch::Receiver<bool> {
        self.refreshing.flag.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        *self.refreshing.flag.borrow()
    }

    /// Add a link and schedule its first probe.
    ///
    /// Returns as soon as the record is persisted; the handle resolves once
    /// the probe result has been written back.
    #[tracing::instrument(skip(self))]
    pub async fn add_link(&self, url: &str, name: &str) -> Result<(LinkRecord, JoinHandle<()>)> {
        let record = self.store.add(url, name).await?;
        let handle = self.spawn_refresh(record.id);
        Ok((record, handle))
    }

    /// Probe one record and write the result back. Unknown ids are ignored.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_one(&self, id: Uuid) {
        let Some(record) = self.store.get(id).await else {
            debug!("Link {} no longer exists, skipping probe", id);
            return;
        };

        let probed = self.prober.probe(record).await;
        debug!(
            "Link {} is {} (size {:?})",
            id,
            probed.reachability.label(),
            probed.size_bytes
        );

        match self.store.update(probed).await {
            Ok(true) => {}
            Ok(false) => debug!("Link {} was removed while being probed", id),
            Err(e) => warn!("Failed to save probe result for {}: {:#}", id, e),
        }
    }

    /// Probe every record concurrently and wait for all of them.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_all(&self) {
        let ids: Vec<Uuid> = self.store.links().await.iter().map(|l| l.id).collect();
        self.refresh_ids(&ids).await;
    }

    /// Probe the given records concurrently and wait for all of them.
    /// A failing probe task never stops the others.
    pub async fn refresh_ids(&self, ids: &[Uuid]) {
        let _flag = RefreshingFlag::raise(&self.refreshing);
        info!("Refreshing {} link(s)...", ids.len());

        let handles = ids.iter().map(|&id| self.spawn_refresh(id));
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("Probe task failed: {}", e);
            }
        }

        info!("Refresh complete.");
    }

    fn spawn_refresh(&self, id: Uuid) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move { registry.refresh_one(id).await })
    }
}
