//! HTTP client module: body-less probes and streaming downloads.

mod client;
mod error;

pub use client::{HeadResponse, HttpClient, http_error};
pub use error::{HttpError, classify};
