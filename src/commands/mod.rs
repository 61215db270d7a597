//! Command handlers behind the `ipavault` CLI.

mod download;
mod export;
pub mod links;
mod services;

pub use download::{clear_downloads, download, list_downloads, remove_downloads};
pub use export::{ContainerSource, ExportRequest, export};
pub use services::{Registry, Services};
