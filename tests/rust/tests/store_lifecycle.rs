use anyhow::Result;
use parking_lot::Mutex;
use std::io::{self, Cursor, Write};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use vdi_core::{Error, StoreConfig, StoreLocation};
use vdi_storage::testing::{ClusterSimulator, RecordingObserver};
use vdi_storage::{ImageBackend, SheepdogStore, StoreStep, TracingObserver};

// Helper to build a store on top of a fresh simulated cluster
fn start_store(chunk_size_mb: u64) -> (Arc<ClusterSimulator>, Arc<RecordingObserver>, SheepdogStore) {
    let cluster = Arc::new(ClusterSimulator::new());
    let observer = Arc::new(RecordingObserver::new());
    let config = StoreConfig {
        chunk_size_mb,
        ..Default::default()
    };
    let store = SheepdogStore::with_parts(config, cluster.clone(), observer.clone())
        .expect("default config is valid");
    (cluster, observer, store)
}

#[test]
fn test_full_lifecycle() -> Result<()> {
    let (cluster, observer, store) = start_store(1);
    let payload: Vec<u8> = (0..3 * 1024 * 1024 + 17).map(|i| (i % 251) as u8).collect();

    // 1. Add
    let added = store.add("img-1", &mut Cursor::new(payload.clone()), payload.len() as u64)?;
    assert_eq!(added.uri, "sheepdog://img-1");
    assert_eq!(added.size, payload.len() as u64);
    assert_eq!(added.checksum, format!("{:x}", md5::compute(&payload)));
    assert!(added.metadata.is_empty());

    // 2. Only the snapshot survives
    assert!(!cluster.has_volume("img-1"));
    assert_eq!(cluster.snapshot("img-1").as_deref(), Some(payload.as_slice()));

    // 3. Query it back through the location
    let location = StoreLocation::parse(&added.uri)?;
    assert!(store.exists(&location)?);
    assert_eq!(store.get_size(&location)?, payload.len() as u64);
    let head = store.read_snapshot(&location, 0, 16)?;
    assert_eq!(&head[..], &payload[..16]);

    // 4. Delete
    store.delete(&location)?;
    assert!(cluster.is_absent("img-1"));
    assert!(!store.exists(&location)?);
    assert!(observer.events().is_empty());

    Ok(())
}

#[test]
fn test_add_existing_image_is_duplicate() -> Result<()> {
    let (cluster, _observer, store) = start_store(64);
    store.add("img-1", &mut Cursor::new(b"xx".to_vec()), 2)?;
    let before = cluster.subcommands().len();

    let result = store.add("img-1", &mut Cursor::new(b"yy".to_vec()), 2);
    assert!(matches!(result, Err(Error::Duplicate { .. })));

    // Only the existence check ran
    assert_eq!(&cluster.subcommands()[before..], ["list -r"]);
    assert_eq!(cluster.snapshot("img-1"), Some(b"xx".to_vec()));
    Ok(())
}

#[test]
fn test_write_failure_leaves_nothing_behind() {
    let (cluster, observer, store) = start_store(64);
    cluster.fail_on("write", "Failed to write to VDI");

    let result = store.add("img-1", &mut Cursor::new(b"xx".to_vec()), 2);
    assert!(matches!(result, Err(Error::Backend { .. })));
    assert!(cluster.is_absent("img-1"));
    assert_eq!(observer.steps(), vec![(StoreStep::Write, false)]);
}

#[test]
fn test_snapshot_failure_leaves_nothing_behind() {
    let (cluster, observer, store) = start_store(64);
    cluster.fail_on("snapshot -s glance-image", "Failed to create snapshot");

    let result = store.add("img-1", &mut Cursor::new(b"xx".to_vec()), 2);
    assert!(matches!(result, Err(Error::Backend { .. })));
    assert!(cluster.is_absent("img-1"));
    assert_eq!(
        cluster.subcommands().iter().filter(|s| *s == "delete").count(),
        1
    );
    assert_eq!(observer.steps(), vec![(StoreStep::Snapshot, false)]);
}

#[test]
fn test_failed_working_volume_delete_is_reported() {
    let (cluster, observer, store) = start_store(64);
    cluster.fail_on("delete", "VDI is locked");

    let result = store.add("img-1", &mut Cursor::new(b"xx".to_vec()), 2);
    assert!(matches!(result, Err(Error::Backend { .. })));

    // Both the working volume and the snapshot are left for the operator
    assert!(cluster.has_volume("img-1"));
    assert!(cluster.snapshot("img-1").is_some());
    assert_eq!(observer.steps(), vec![(StoreStep::DeleteWorkingVolume, false)]);
}

#[test]
fn test_cleanup_failure_surfaces_its_own_error() {
    let (cluster, observer, store) = start_store(64);
    cluster.fail_on("write", "Failed to write to VDI");
    cluster.fail_on("delete", "VDI is locked");

    let err = store
        .add("img-1", &mut Cursor::new(b"xx".to_vec()), 2)
        .unwrap_err();
    match err {
        Error::Backend { message } => {
            assert!(message.contains("cleanup"), "{message}");
            assert!(message.contains("VDI is locked"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(cluster.has_volume("img-1"));
    assert_eq!(
        observer.steps(),
        vec![(StoreStep::Write, false), (StoreStep::Write, true)]
    );
}

#[test]
fn test_retry_after_failed_add() -> Result<()> {
    let (cluster, _observer, store) = start_store(64);
    cluster.fail_on("snapshot -s glance-image", "Failed to create snapshot");
    assert!(store.add("img-1", &mut Cursor::new(b"xx".to_vec()), 2).is_err());

    // Cleanup left the name free for a second attempt
    cluster.heal("snapshot -s glance-image");
    let added = store.add("img-1", &mut Cursor::new(b"xx".to_vec()), 2)?;
    assert_eq!(added.size, 2);
    Ok(())
}

#[test]
fn test_delete_missing_image() {
    let (cluster, _observer, store) = start_store(64);

    let result = store.delete(&StoreLocation::new("img-2"));
    assert!(matches!(result, Err(Error::NotFound { .. })));
    assert_eq!(cluster.subcommands(), ["list -r"]);
}

#[test]
fn test_delete_failure_logs_once() -> Result<()> {
    let (cluster, observer, store) = start_store(64);
    store.add("img-1", &mut Cursor::new(b"xx".to_vec()), 2)?;
    cluster.fail_on("delete -s glance-image", "snapshot in use");

    let result = store.delete(&StoreLocation::new("img-1"));
    assert!(matches!(result, Err(Error::Backend { .. })));
    assert_eq!(observer.messages(), vec!["Error in delete snapshot image"]);
    assert!(cluster.snapshot("img-1").is_some());
    Ok(())
}

#[test]
fn test_get_is_unsupported() {
    let (cluster, _observer, store) = start_store(64);

    for chunk_size in [None, Some(1), Some(64 * 1024)] {
        let result = store.get(&StoreLocation::new("img-1"), 0, chunk_size);
        assert!(matches!(result, Err(Error::RandomGetNotSupported)));
    }
    assert!(cluster.subcommands().is_empty());
}

#[test]
fn test_unknown_size_upload() -> Result<()> {
    let (cluster, _observer, store) = start_store(1);
    let payload = vec![0xabu8; 1024 * 1024 + 3];

    let added = store.add("img-3", &mut Cursor::new(payload.clone()), 0)?;
    assert_eq!(added.size, payload.len() as u64);
    assert_eq!(cluster.snapshot("img-3"), Some(payload));
    Ok(())
}

/// Log sink shared between the subscriber and the test
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_default_observer_logs_through_tracing() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();

    let cluster = Arc::new(ClusterSimulator::new());
    cluster.fail_on("create", "No space left");
    let store = SheepdogStore::with_parts(
        StoreConfig::default(),
        cluster.clone(),
        Arc::new(TracingObserver),
    )
    .unwrap();

    let result = tracing::subscriber::with_default(subscriber, || {
        store.add("img-4", &mut Cursor::new(b"xx".to_vec()), 2)
    });
    assert!(matches!(result, Err(Error::Backend { .. })));

    let output = logs.contents();
    assert!(output.contains("ERROR"), "{output}");
    assert!(output.contains("Error in create image"), "{output}");
    assert!(output.contains("No space left"), "{output}");
    assert_eq!(output.matches("Error in create image").count(), 1, "{output}");
}
