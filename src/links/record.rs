use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of the most recent probe of a link.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    /// Never probed.
    #[default]
    Unknown,
    Reachable,
    Unreachable,
}

impl Reachability {
    pub fn label(&self) -> &'static str {
        match self {
            Reachability::Unknown => "unknown",
            Reachability::Reachable => "online",
            Reachability::Unreachable => "offline",
        }
    }
}

/// A saved remote package location.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LinkRecord {
    pub id: Uuid,
    pub url: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reachability: Reachability,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub last_probed_at: Option<DateTime<Utc>>,
    /// Written by the installer after a successful install; never touched here.
    #[serde(default)]
    pub installed_package_id: Option<String>,
    #[serde(default)]
    pub installed_icon: Option<Vec<u8>>,
}

impl LinkRecord {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            name: name.into(),
            created_at: Utc::now(),
            reachability: Reachability::Unknown,
            size_bytes: None,
            last_probed_at: None,
            installed_package_id: None,
            installed_icon: None,
        }
    }
}
