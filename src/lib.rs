pub mod archive;
pub mod cleanup;
pub mod commands;
pub mod config;
pub mod defaults;
pub mod download;
pub mod export;
pub mod http;
pub mod links;
pub mod progress;
pub mod runtime;
