//! Core type definitions for the image store

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of an image, used verbatim as the Sheepdog volume name
pub type ImageId = String;

/// Result of a successful image upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedImage {
    /// Location URI of the stored image
    pub uri: String,

    /// Number of bytes consumed from the input stream
    pub size: u64,

    /// Hex MD5 of exactly the bytes consumed
    pub checksum: String,

    /// Backend specific metadata (always empty for Sheepdog)
    pub metadata: HashMap<String, String>,
}
