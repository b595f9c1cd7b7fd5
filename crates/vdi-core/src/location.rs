//! Sheepdog image locations
//!
//! Two URI forms are understood:
//! - `sheepdog://<image>`
//! - `sheepdog://<addr>:<port>:<image>`

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// URI scheme owned by this store
pub const SCHEME: &str = "sheepdog";

/// Longest volume name the cluster accepts
pub const MAX_VOLUME_NAME_LEN: usize = 256;

/// Volume names travel through a shell command line, so they are limited
/// to characters that can never split or escape a word.
fn volume_name_problem(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("image name is empty".to_string());
    }
    if name.len() > MAX_VOLUME_NAME_LEN {
        return Some(format!(
            "image name is longer than {MAX_VOLUME_NAME_LEN} bytes"
        ));
    }
    if name.starts_with('-') {
        return Some("image name must not start with '-'".to_string());
    }
    name.chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+')))
        .map(|c| format!("image name contains {c:?}"))
}

/// Host names and IPv4 addresses only
pub(crate) fn host_problem(addr: &str) -> Option<String> {
    if addr.is_empty() {
        return Some("address is empty".to_string());
    }
    if addr.starts_with('-') {
        return Some("address must not start with '-'".to_string());
    }
    addr.chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .map(|c| format!("address contains {c:?}"))
}

/// Check that `name` is usable as a volume name
///
/// Only ASCII letters, digits, `-`, `_`, `.` and `+` are accepted.
pub fn check_volume_name(name: &str) -> Result<()> {
    match volume_name_problem(name) {
        Some(reason) => Err(Error::BadLocation {
            uri: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Check that `addr` is usable as a sheep daemon address
pub fn check_host(addr: &str) -> Result<()> {
    match host_problem(addr) {
        Some(reason) => Err(Error::BadLocation {
            uri: addr.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Parsed location of an image in the Sheepdog cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocation {
    /// Volume name
    pub image: String,

    /// Sheep daemon address, when the URI names one
    pub addr: Option<String>,

    /// Sheep daemon port, when the URI names one
    pub port: Option<u16>,
}

impl StoreLocation {
    /// Location for an image on the configured cluster
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            addr: None,
            port: None,
        }
    }

    /// Parse a `sheepdog://` URI
    pub fn parse(uri: &str) -> Result<Self> {
        let bad = |reason: &str| Error::BadLocation {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let rest = uri
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| bad("expected sheepdog:// scheme"))?;

        let pieces: Vec<&str> = rest.split(':').collect();
        let location = match pieces.as_slice() {
            [image] => Self::new(*image),
            [addr, port, image] => {
                let port = port.parse::<u16>().map_err(|_| bad("port is not a number"))?;
                if let Some(reason) = host_problem(addr) {
                    return Err(bad(&reason));
                }
                Self {
                    image: image.to_string(),
                    addr: Some(addr.to_string()),
                    port: Some(port),
                }
            }
            _ => return Err(bad("expected sheepdog://image or sheepdog://addr:port:image")),
        };

        if let Some(reason) = volume_name_problem(&location.image) {
            return Err(bad(&reason));
        }
        Ok(location)
    }

    /// Format the location back into a URI
    pub fn uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.addr, self.port) {
            (Some(addr), Some(port)) => write!(f, "{SCHEME}://{addr}:{port}:{}", self.image),
            _ => write!(f, "{SCHEME}://{}", self.image),
        }
    }
}

impl FromStr for StoreLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
