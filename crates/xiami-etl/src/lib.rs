//! Export, reconciliation, download and tagging stages for xiami-exporter.
//!
//! The stages run as separate invocations over shared on-disk state:
//! favorites pages are exported to JSON, reconciled into the song database,
//! then used to drive audio and artwork downloads and tagging.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod category;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod export;
pub mod reconcile;
pub mod resilience;
pub mod signer;
pub mod store;
pub mod tag;

pub use category::FavCategory;
pub use client::XiamiClient;
pub use config::Config;
pub use download::{AudioInfo, Downloader};
pub use error::{EtlError, EtlResult};
pub use export::Exporter;
pub use signer::Session;
pub use store::FileStore;
