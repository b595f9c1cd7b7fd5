//! Primitive operations on one Sheepdog volume

use std::sync::Arc;

use bytes::Bytes;
use tracing::instrument;
use vdi_core::{Error, Result};

use crate::{CommandExecutor, VolumeCommandRunner};

/// Tag of the one snapshot this store keeps per volume
///
/// A volume can only ever have a single addressable snapshot through this
/// store; the snapshot outlives the working volume and is the stored image.
pub const SNAPSHOT_TAG: &str = "glance-image";

/// Handle on a named volume
///
/// Holds no state besides its addressing; the cluster is queried on every call.
#[derive(Debug, Clone)]
pub struct VolumeHandle {
    runner: VolumeCommandRunner,
    chunk_size: usize,
}

impl VolumeHandle {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        tool: &str,
        addr: &str,
        port: u16,
        name: &str,
        chunk_size: usize,
    ) -> Result<Self> {
        Ok(Self {
            runner: VolumeCommandRunner::new(executor, tool, addr, port, name)?,
            chunk_size: chunk_size.max(1),
        })
    }

    pub fn name(&self) -> &str {
        self.runner.name()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Whether the volume (or its snapshot) exists
    ///
    /// An empty listing means the volume is absent; it is not an error.
    #[instrument(skip(self), fields(volume = %self.name()))]
    pub fn exists(&self) -> Result<bool> {
        let out = self.runner.run("list -r", None, &[])?;
        Ok(!out.iter().all(u8::is_ascii_whitespace))
    }

    /// Size in bytes, taken from the fourth field of the raw listing
    #[instrument(skip(self), fields(volume = %self.name()))]
    pub fn get_size(&self) -> Result<u64> {
        let out = self.runner.run("list -r", None, &[])?;
        let listing = String::from_utf8_lossy(&out);
        listing
            .split_whitespace()
            .nth(3)
            .and_then(|field| field.parse::<u64>().ok())
            .ok_or_else(|| {
                Error::backend(format!(
                    "unexpected listing for {}: {:?}",
                    self.name(),
                    listing.trim()
                ))
            })
    }

    #[instrument(skip(self), fields(volume = %self.name()))]
    pub fn create(&self, size: u64) -> Result<()> {
        self.runner.run("create", None, &[size.to_string()])?;
        Ok(())
    }

    #[instrument(skip(self), fields(volume = %self.name()))]
    pub fn resize(&self, size: u64) -> Result<()> {
        self.runner.run("resize", None, &[size.to_string()])?;
        Ok(())
    }

    /// Write `count` bytes of `data` starting at `offset`
    ///
    /// Issues one `write` per chunk of at most `chunk_size` bytes. Any failed
    /// chunk fails the whole call.
    #[instrument(skip(self, data), fields(volume = %self.name()))]
    pub fn write(&self, data: &[u8], offset: u64, count: usize) -> Result<()> {
        let data = data.get(..count).ok_or_else(|| {
            Error::backend(format!(
                "write of {} bytes requested from a {} byte buffer",
                count,
                data.len()
            ))
        })?;

        let mut chunk_offset = offset;
        for chunk in data.chunks(self.chunk_size) {
            self.runner.run(
                "write",
                Some(chunk),
                &[chunk_offset.to_string(), chunk.len().to_string()],
            )?;
            chunk_offset += chunk.len() as u64;
        }
        Ok(())
    }

    /// Read `count` bytes at `offset` from the snapshot
    #[instrument(skip(self), fields(volume = %self.name()))]
    pub fn read(&self, offset: u64, count: u64) -> Result<Bytes> {
        let out = self.runner.run(
            &format!("read -s {SNAPSHOT_TAG}"),
            None,
            &[offset.to_string(), count.to_string()],
        )?;
        Ok(Bytes::from(out))
    }

    #[instrument(skip(self), fields(volume = %self.name()))]
    pub fn create_snapshot(&self) -> Result<()> {
        self.runner
            .run(&format!("snapshot -s {SNAPSHOT_TAG}"), None, &[])?;
        Ok(())
    }

    #[instrument(skip(self), fields(volume = %self.name()))]
    pub fn delete_snapshot(&self) -> Result<()> {
        self.runner
            .run(&format!("delete -s {SNAPSHOT_TAG}"), None, &[])?;
        Ok(())
    }

    /// Delete the working volume
    #[instrument(skip(self), fields(volume = %self.name()))]
    pub fn delete(&self) -> Result<()> {
        self.runner.run("delete", None, &[])?;
        Ok(())
    }
}
