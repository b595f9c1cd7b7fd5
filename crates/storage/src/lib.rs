//! Storage - Sheepdog image store for virtual disk images
//!
//! Images are kept as Sheepdog VDI snapshots. Every operation shells out to
//! the cluster control tool (`collie` or `dog`):
//! - [`VolumeCommandRunner`] builds and runs one `vdi` command line
//! - [`VolumeHandle`] exposes the primitive volume operations
//! - [`SheepdogStore`] sequences them into add / delete with cleanup on failure
//!
//! # Example
//!
//! ```no_run
//! use vdi_storage::{ImageBackend, SheepdogStore};
//! use vdi_core::{StoreConfig, StoreLocation};
//!
//! # fn example() -> vdi_core::Result<()> {
//! let store = SheepdogStore::new(StoreConfig::default())?;
//! let mut file = std::fs::File::open("disk.img")?;
//! let size = file.metadata()?.len();
//! let added = store.add("img-1", &mut file, size)?;
//! store.delete(&StoreLocation::parse(&added.uri)?)?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod executor;
mod observer;
mod runner;
mod store;
mod volume;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::ImageBackend;
pub use executor::{CommandExecutor, ProcessFailure, ShellExecutor};
pub use observer::{StoreObserver, StoreStep, TracingObserver};
pub use runner::VolumeCommandRunner;
pub use store::SheepdogStore;
pub use volume::{VolumeHandle, SNAPSHOT_TAG};
