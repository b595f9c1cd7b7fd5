//! Administrative commands for the Sheepdog image store
//!
//! The `vdictl` binary parses [`Cli`] and hands the command to [`run`].

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use vdi_core::{Result, StoreLocation};
use vdi_storage::{ImageBackend, SheepdogStore};

/// Manage images stored in a Sheepdog cluster
#[derive(Debug, Parser)]
#[command(name = "vdictl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON store configuration (defaults to localhost:7000)
    #[arg(global = true, short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(global = true, short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload a file as a new image
    Add {
        /// Identifier of the new image
        image_id: String,

        /// Image file to upload
        file: PathBuf,
    },

    /// Delete a stored image
    Delete {
        /// Image location, e.g. sheepdog://img-1
        uri: String,
    },

    /// Check whether an image exists
    Exists { uri: String },

    /// Print the size of a stored image in bytes
    Size { uri: String },

    /// Read bytes from a stored image's snapshot to stdout
    Read {
        uri: String,

        /// Byte offset into the image
        offset: u64,

        /// Number of bytes to read
        count: u64,
    },
}

/// Execute `command` against `store`, writing results to `out`
pub fn run(store: &SheepdogStore, command: Commands, out: &mut dyn Write) -> Result<()> {
    match command {
        Commands::Add { image_id, file } => {
            let mut reader = File::open(&file)?;
            let size = reader.metadata()?.len();
            info!(%image_id, path = %file.display(), size, "Uploading image");

            let added = store.add(&image_id, &mut reader, size)?;
            let summary = serde_json::json!({
                "uri": added.uri,
                "size": added.size,
                "checksum": added.checksum,
                "metadata": added.metadata,
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
        }
        Commands::Delete { uri } => {
            store.delete(&StoreLocation::parse(&uri)?)?;
            writeln!(out, "deleted {uri}")?;
        }
        Commands::Exists { uri } => {
            let exists = store.exists(&StoreLocation::parse(&uri)?)?;
            writeln!(out, "{exists}")?;
        }
        Commands::Size { uri } => {
            let size = store.get_size(&StoreLocation::parse(&uri)?)?;
            writeln!(out, "{size}")?;
        }
        Commands::Read { uri, offset, count } => {
            let data = store.read_snapshot(&StoreLocation::parse(&uri)?, offset, count)?;
            out.write_all(&data)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vdi_core::{Error, StoreConfig};
    use vdi_storage::testing::{ClusterSimulator, RecordingObserver};

    fn setup() -> (Arc<ClusterSimulator>, SheepdogStore) {
        let cluster = Arc::new(ClusterSimulator::new());
        let store = SheepdogStore::with_parts(
            StoreConfig::default(),
            cluster.clone(),
            Arc::new(RecordingObserver::new()),
        )
        .unwrap();
        (cluster, store)
    }

    fn exec(store: &SheepdogStore, args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("vdictl").chain(args.iter().copied()))
            .expect("valid arguments");
        let mut out = Vec::new();
        run(store, cli.command, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_add_size_read_delete() {
        let (cluster, store) = setup();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"disk contents").unwrap();
        let path = file.path().to_str().unwrap();

        let added = exec(&store, &["add", "img-1", path]).unwrap();
        let summary: serde_json::Value = serde_json::from_str(&added).unwrap();
        assert_eq!(summary["uri"], "sheepdog://img-1");
        assert_eq!(summary["size"], 13);

        assert_eq!(exec(&store, &["exists", "sheepdog://img-1"]).unwrap(), "true\n");
        assert_eq!(exec(&store, &["size", "sheepdog://img-1"]).unwrap(), "13\n");
        assert_eq!(
            exec(&store, &["read", "sheepdog://img-1", "5", "8"]).unwrap(),
            "contents"
        );

        exec(&store, &["delete", "sheepdog://img-1"]).unwrap();
        assert!(cluster.is_absent("img-1"));
        assert_eq!(exec(&store, &["exists", "sheepdog://img-1"]).unwrap(), "false\n");
    }

    #[test]
    fn test_bad_uri() {
        let (_cluster, store) = setup();
        let result = exec(&store, &["delete", "file:///tmp/img"]);
        assert!(matches!(result, Err(Error::BadLocation { .. })));
    }

    #[test]
    fn test_config_flag_parses() {
        let cli = Cli::try_parse_from(["vdictl", "--config", "/etc/vdi.json", "exists", "sheepdog://x"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/vdi.json")));
        assert!(matches!(cli.command, Commands::Exists { .. }));
    }
}
