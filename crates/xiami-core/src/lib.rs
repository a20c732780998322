//! Core domain model for xiami-exporter.
//!
//! This crate defines the exported `Song` and `SongList` records, the
//! record-trimming rules applied to raw API JSON, and the SQLite schema
//! together with its versioned migration runner.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod schema;
pub mod trim;

pub use error::{Error, Result};
