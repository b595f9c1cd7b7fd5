//! Sheepdog image store
//!
//! Adds an image as: create volume, write, snapshot, delete the working
//! volume. The snapshot under [`SNAPSHOT_TAG`](crate::SNAPSHOT_TAG) is the
//! stored image. A failure after the volume was created deletes it before
//! the error is returned.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, instrument};
use vdi_core::{AddedImage, Error, Result, StoreConfig, StoreLocation};

use crate::{
    CommandExecutor, ImageBackend, ShellExecutor, StoreObserver, StoreStep, TracingObserver,
    VolumeHandle,
};

/// Image store backed by a Sheepdog cluster
#[derive(Clone)]
pub struct SheepdogStore {
    config: StoreConfig,
    executor: Arc<dyn CommandExecutor>,
    observer: Arc<dyn StoreObserver>,
}

impl fmt::Debug for SheepdogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheepdogStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SheepdogStore {
    /// Create a store that shells out to the configured tool and logs via `tracing`
    pub fn new(config: StoreConfig) -> Result<Self> {
        Self::with_parts(config, Arc::new(ShellExecutor::new()), Arc::new(TracingObserver))
    }

    /// Create a store with a custom executor and observer
    pub fn with_parts(
        config: StoreConfig,
        executor: Arc<dyn CommandExecutor>,
        observer: Arc<dyn StoreObserver>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            executor,
            observer,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Handle on `name` in the configured cluster
    ///
    /// Fails with [`Error::BadLocation`] if `name` is not a usable volume name.
    pub fn image(&self, name: &str) -> Result<VolumeHandle> {
        VolumeHandle::new(
            self.executor.clone(),
            &self.config.tool,
            &self.config.address,
            self.config.port,
            name,
            self.write_chunk_size(),
        )
    }

    /// Handle for a location, honouring an address and port carried in the URI
    fn image_at(&self, location: &StoreLocation) -> Result<VolumeHandle> {
        VolumeHandle::new(
            self.executor.clone(),
            &self.config.tool,
            location.addr.as_deref().unwrap_or(&self.config.address),
            location.port.unwrap_or(self.config.port),
            &location.image,
            self.write_chunk_size(),
        )
    }

    fn write_chunk_size(&self) -> usize {
        usize::try_from(self.config.chunk_size()).unwrap_or(usize::MAX)
    }

    /// Read `count` bytes at `offset` from a stored image's snapshot
    ///
    /// Administrative access only; [`ImageBackend::get`] stays unsupported.
    #[instrument(skip(self), fields(backend = "sheepdog"))]
    pub fn read_snapshot(&self, location: &StoreLocation, offset: u64, count: u64) -> Result<Bytes> {
        let image = self.image_at(location)?;
        if !image.exists()? {
            return Err(Error::NotFound {
                image_id: location.image.clone(),
            });
        }
        image.read(offset, count)
    }

    /// Stream `data` into the volume chunk by chunk
    ///
    /// Returns the number of bytes written. With an unknown size the volume
    /// is grown before every chunk.
    fn write_image(
        &self,
        image: &VolumeHandle,
        data: &mut dyn Read,
        image_size: u64,
        checksum: &mut md5::Context,
    ) -> Result<u64> {
        let mut buf = Vec::new();
        let mut offset = 0u64;

        loop {
            let len = read_chunk(data, image.chunk_size(), &mut buf)
                .map_err(|e| Error::backend(format!("failed to read image data: {e}")))?;
            if len == 0 {
                break;
            }
            let chunk = &buf[..len];

            if image_size == 0 {
                image.resize(offset + len as u64)?;
            }
            image.write(chunk, offset, len)?;
            checksum.consume(chunk);
            offset += len as u64;
        }

        debug!(image_id = image.name(), bytes = offset, "Image data written");
        Ok(offset)
    }

    /// Report `step` as failed and delete the partially built volume
    ///
    /// Returns the error the caller should see: the original one, or the
    /// cleanup failure if deleting the volume failed too.
    fn abort_add(&self, image: &VolumeHandle, step: StoreStep, err: Error) -> Error {
        self.observer.step_failed(image.name(), step, &err);

        match image.delete() {
            Ok(()) => err,
            Err(cleanup) => {
                self.observer.cleanup_failed(image.name(), step, &cleanup);
                let reason = match cleanup {
                    Error::Backend { message } => message,
                    other => other.to_string(),
                };
                Error::backend(format!(
                    "cleanup of {} after failed {} also failed: {}",
                    image.name(),
                    step,
                    reason
                ))
            }
        }
    }
}

/// Read up to `limit` bytes into `buf`, returning fewer only at EOF
fn read_chunk(reader: &mut dyn Read, limit: usize, buf: &mut Vec<u8>) -> io::Result<usize> {
    buf.clear();
    Read::take(&mut *reader, limit as u64).read_to_end(buf)
}

impl ImageBackend for SheepdogStore {
    #[instrument(skip(self, data), fields(backend = "sheepdog"))]
    fn add(&self, image_id: &str, data: &mut dyn Read, image_size: u64) -> Result<AddedImage> {
        let image = self.image(image_id)?;

        if image.exists()? {
            return Err(Error::Duplicate {
                image_id: image_id.to_string(),
            });
        }

        if let Err(e) = image.create(image_size) {
            return Err(self.abort_add(&image, StoreStep::Create, e));
        }

        let mut checksum = md5::Context::new();
        let size = match self.write_image(&image, data, image_size, &mut checksum) {
            Ok(size) => size,
            Err(e) => return Err(self.abort_add(&image, StoreStep::Write, e)),
        };

        if let Err(e) = image.create_snapshot() {
            return Err(self.abort_add(&image, StoreStep::Snapshot, e));
        }

        // The snapshot is now the image; the working volume can go
        if let Err(e) = image.delete() {
            self.observer
                .step_failed(image_id, StoreStep::DeleteWorkingVolume, &e);
            return Err(e);
        }

        let added = AddedImage {
            uri: StoreLocation::new(image_id).uri(),
            size,
            checksum: format!("{:x}", checksum.compute()),
            metadata: HashMap::new(),
        };
        info!(image_id, size, checksum = %added.checksum, "Image stored");
        Ok(added)
    }

    #[instrument(skip_all, fields(backend = "sheepdog"))]
    fn get(
        &self,
        _location: &StoreLocation,
        _offset: u64,
        _chunk_size: Option<u64>,
    ) -> Result<Bytes> {
        Err(Error::RandomGetNotSupported)
    }

    #[instrument(skip(self), fields(backend = "sheepdog"))]
    fn delete(&self, location: &StoreLocation) -> Result<()> {
        let image = self.image_at(location)?;

        if !image.exists()? {
            return Err(Error::NotFound {
                image_id: location.image.clone(),
            });
        }

        if let Err(e) = image.delete_snapshot() {
            self.observer
                .step_failed(&location.image, StoreStep::DeleteSnapshot, &e);
            return Err(e);
        }

        info!(image_id = %location.image, "Image deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "sheepdog"))]
    fn exists(&self, location: &StoreLocation) -> Result<bool> {
        self.image_at(location)?.exists()
    }

    #[instrument(skip(self), fields(backend = "sheepdog"))]
    fn get_size(&self, location: &StoreLocation) -> Result<u64> {
        let image = self.image_at(location)?;
        if !image.exists()? {
            return Err(Error::NotFound {
                image_id: location.image.clone(),
            });
        }
        image.get_size()
    }
}
