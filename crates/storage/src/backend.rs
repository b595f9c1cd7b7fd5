//! Image backend trait definition
//!
//! Defines the interface the surrounding image service drives.

use std::io::Read;

use bytes::Bytes;
use vdi_core::{AddedImage, Result, StoreLocation};

/// Blocking trait for image backends
pub trait ImageBackend: Send + Sync {
    /// Store a new image read from `data`
    ///
    /// # Arguments
    /// * `image_id` - Identifier of the new image
    /// * `data` - Image contents, consumed to EOF
    /// * `image_size` - Declared size in bytes, or 0 when unknown
    ///
    /// # Returns
    /// Location URI, bytes consumed, hex MD5 and backend metadata
    ///
    /// # Errors
    /// `Duplicate` if the image already exists, `Backend` if any step fails
    fn add(&self, image_id: &str, data: &mut dyn Read, image_size: u64) -> Result<AddedImage>;

    /// Read part of an image
    ///
    /// # Errors
    /// Backends without random access return `RandomGetNotSupported`
    fn get(&self, location: &StoreLocation, offset: u64, chunk_size: Option<u64>) -> Result<Bytes>;

    /// Delete the image at `location`
    ///
    /// # Errors
    /// `NotFound` if nothing is stored there, `Backend` if deletion fails
    fn delete(&self, location: &StoreLocation) -> Result<()>;

    /// Check if an image exists at `location`
    fn exists(&self, location: &StoreLocation) -> Result<bool>;

    /// Size in bytes of the image at `location`
    fn get_size(&self, location: &StoreLocation) -> Result<u64>;
}
