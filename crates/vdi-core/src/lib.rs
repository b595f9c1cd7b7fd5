//! VDI Core - Foundation for the Sheepdog image store adapter
//!
//! Provides the error type, store configuration, image locations and the
//! result types shared by the storage driver and the admin tooling.

pub mod config;
pub mod error;
pub mod location;
pub mod types;

pub use config::{StoreConfig, MAX_CHUNK_SIZE_MB};
pub use error::{Error, Result};
pub use location::{check_host, check_volume_name, StoreLocation};
pub use types::*;
