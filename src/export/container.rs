use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::Config;

/// One data container belonging to an installed app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    /// Directory name of the container under its storage root.
    pub data_id: String,
    /// Display name of the container.
    #[serde(default)]
    pub name: String,
    /// Storage group the container belongs to, if any.
    #[serde(default)]
    pub group_id: Option<String>,
}

/// The installed application an export is taken from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDescriptor {
    pub bundle_path: PathBuf,
    pub bundle_id: String,
    pub display_name: String,
    pub version: String,
    /// Containers live under the shared app-group root instead of the
    /// private one.
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub containers: Vec<ContainerRecord>,
}

impl AppDescriptor {
    /// Descriptor for a bundle with no containers; the bundle identifier and
    /// display name default to the bundle's file stem.
    pub fn from_bundle(bundle_path: PathBuf) -> Self {
        let stem = bundle_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            bundle_path,
            bundle_id: stem.clone(),
            display_name: stem,
            version: String::new(),
            is_shared: false,
            containers: Vec::new(),
        }
    }
}

/// Resolves container records to directories, distinguishing the private and
/// shared storage roots.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerLocator {
    private_root: PathBuf,
    shared_root: PathBuf,
}

impl ContainerLocator {
    pub fn new(private_root: PathBuf, shared_root: PathBuf) -> Self {
        Self {
            private_root,
            shared_root,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.private_data_dir(), config.shared_data_dir())
    }

    /// Directory of `app`'s container at `index`.
    pub fn container_path(&self, app: &AppDescriptor, index: usize) -> Result<PathBuf> {
        let Some(container) = app.containers.get(index) else {
            bail!(
                "{} has no container #{} ({} available)",
                app.display_name,
                index,
                app.containers.len()
            );
        };
        if container.data_id.is_empty() || container.data_id.contains(['/', '\\']) {
            bail!("Invalid container identifier {:?}", container.data_id);
        }

        let root = if app.is_shared {
            &self.shared_root
        } else {
            &self.private_root
        };
        Ok(root.join(&container.data_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(is_shared: bool) -> AppDescriptor {
        AppDescriptor {
            containers: vec![ContainerRecord {
                data_id: "8F2C".into(),
                name: "Default".into(),
                group_id: None,
            }],
            is_shared,
            ..AppDescriptor::from_bundle(PathBuf::from("/apps/AppX.app"))
        }
    }

    fn locator() -> ContainerLocator {
        ContainerLocator::new(
            PathBuf::from("/root/Data/Application"),
            PathBuf::from("/root/AppGroup/Data/Application"),
        )
    }

    #[test]
    fn test_private_and_shared_roots() {
        assert_eq!(
            locator().container_path(&app(false), 0).unwrap(),
            PathBuf::from("/root/Data/Application/8F2C")
        );
        assert_eq!(
            locator().container_path(&app(true), 0).unwrap(),
            PathBuf::from("/root/AppGroup/Data/Application/8F2C")
        );
    }

    #[test]
    fn test_out_of_range_index() {
        assert!(locator().container_path(&app(false), 1).is_err());
    }

    #[test]
    fn test_rejects_path_like_identifier() {
        let mut app = app(false);
        app.containers[0].data_id = "../escape".into();
        assert!(locator().container_path(&app, 0).is_err());
    }

    #[test]
    fn test_from_bundle_defaults() {
        let app = AppDescriptor::from_bundle(PathBuf::from("/apps/AppX.app"));
        assert_eq!(app.bundle_id, "AppX");
        assert_eq!(app.display_name, "AppX");
        assert!(app.containers.is_empty());
    }
}
