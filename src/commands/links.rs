use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use log::debug;
use url::Url;
use uuid::Uuid;

use crate::{
    defaults::KeyValueStore,
    links::{LinkRecord, LinkRegistry, Prober},
};

/// Print every saved link, one per line, in display order.
#[tracing::instrument(skip(registry))]
pub async fn list<K, P>(registry: &LinkRegistry<K, P>) -> Result<()>
where
    K: KeyValueStore + 'static,
    P: Prober + 'static,
{
    let links = registry.store().links().await;
    if links.is_empty() {
        println!("No saved links.");
        return Ok(());
    }
    for link in &links {
        println!("{}", format_link(link));
    }
    Ok(())
}

/// Save a link and wait for its first probe.
#[tracing::instrument(skip(registry))]
pub async fn add<K, P>(registry: &LinkRegistry<K, P>, url: &str, name: Option<&str>) -> Result<()>
where
    K: KeyValueStore + 'static,
    P: Prober + 'static,
{
    let parsed = Url::parse(url)?;
    let name = match name {
        Some(name) => name.to_string(),
        None => default_name(&parsed),
    };

    let (record, probe) = registry.add_link(url, &name).await?;
    if let Err(e) = probe.await {
        debug!("Initial probe of {} did not finish: {}", record.id, e);
    }

    let record = registry.store().get(record.id).await.unwrap_or(record);
    println!("{}", format_link(&record));
    Ok(())
}

#[tracing::instrument(skip(registry))]
pub async fn rename<K, P>(registry: &LinkRegistry<K, P>, id: Uuid, name: &str) -> Result<()>
where
    K: KeyValueStore + 'static,
    P: Prober + 'static,
{
    let mut record = find(registry, id).await?;
    record.name = name.to_string();
    registry.store().update(record).await?;
    println!("Renamed {} to {}", id, name);
    Ok(())
}

/// Point a link at a new URL and probe it again.
#[tracing::instrument(skip(registry))]
pub async fn set_url<K, P>(registry: &LinkRegistry<K, P>, id: Uuid, url: &str) -> Result<()>
where
    K: KeyValueStore + 'static,
    P: Prober + 'static,
{
    Url::parse(url)?;
    let mut record = find(registry, id).await?;
    record.url = url.to_string();
    registry.store().update(record).await?;
    registry.refresh_one(id).await;

    if let Some(record) = registry.store().get(id).await {
        println!("{}", format_link(&record));
    }
    Ok(())
}

/// Delete links by id. Unknown ids are ignored.
#[tracing::instrument(skip(registry))]
pub async fn remove<K, P>(registry: &LinkRegistry<K, P>, ids: &[Uuid]) -> Result<()>
where
    K: KeyValueStore + 'static,
    P: Prober + 'static,
{
    for &id in ids {
        registry.store().delete(id).await?;
    }
    println!("Removed {} link(s).", ids.len());
    Ok(())
}

/// Probe one link, or every link when `id` is `None`.
#[tracing::instrument(skip(registry))]
pub async fn refresh<K, P>(registry: &LinkRegistry<K, P>, id: Option<Uuid>) -> Result<()>
where
    K: KeyValueStore + 'static,
    P: Prober + 'static,
{
    match id {
        Some(id) => {
            find(registry, id).await?;
            registry.refresh_one(id).await;
        }
        None => registry.refresh_all().await,
    }
    list(registry).await
}

async fn find<K, P>(registry: &LinkRegistry<K, P>, id: Uuid) -> Result<LinkRecord>
where
    K: KeyValueStore + 'static,
    P: Prober + 'static,
{
    match registry.store().get(id).await {
        Some(record) => Ok(record),
        None => bail!("No link with id {}", id),
    }
}

/// Last path segment of the URL without its extension, else the host.
fn default_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(|s| s.rsplit_once('.').map_or(s, |(stem, _)| stem).to_string())
        .or_else(|| url.host_str().map(String::from))
        .unwrap_or_default()
}

pub(crate) fn format_link(link: &LinkRecord) -> String {
    format!(
        "{}  {}  {}  [{}]  {}  checked {}",
        link.id,
        link.name,
        link.url,
        link.reachability.label(),
        link.size_bytes.map_or_else(|| "-".to_string(), format_size),
        format_time(link.last_probed_at),
    )
}

pub(crate) fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

pub(crate) fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(
        || "never".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}
