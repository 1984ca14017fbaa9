use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use kart_archive::{package, Catalog, CatalogError, ListOptions, SortOrder, StoreRequest};
use kart_config::{ChannelSettings, KartConfig};
use kart_store::{BlobStore, InMemoryBlobStore, StoreError, StoreResult};

const BUCKET: &str = "kart-test";

fn setup() -> (Arc<InMemoryBlobStore>, Catalog) {
    let config = KartConfig::new(BUCKET)
        .with_channel("testing", "sync", ChannelSettings::default())
        .with_channel("testing", "other", ChannelSettings::default());
    let store = Arc::new(InMemoryBlobStore::new());
    let catalog = Catalog::new(store.clone(), Arc::new(config));
    (store, catalog)
}

fn build_dir(files: usize, subdirs: usize) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..files {
        fs::write(dir.path().join(format!("file-{i}.txt")), format!("content {i}")).unwrap();
    }
    for s in 0..subdirs {
        let sub = dir.path().join(format!("sub-{s}"));
        fs::create_dir_all(&sub).unwrap();
        for i in 0..files {
            fs::write(sub.join(format!("nested-{i}.dat")), vec![s as u8; i + 1]).unwrap();
        }
    }
    dir
}

async fn store_versions(catalog: &Catalog, specs: &[(&str, Option<&str>)]) {
    for (version, arch) in specs {
        let dir = build_dir(1, 0);
        let mut req = StoreRequest::new(dir.path(), "testing", "sync", *version);
        if let Some(arch) = arch {
            req = req.arch(*arch);
        }
        catalog.store(req).await.unwrap();
    }
}

fn assert_same_tree(expected: &Path, actual: &Path) {
    for entry in tree_paths(expected) {
        let rel = entry.strip_prefix(expected).unwrap();
        let other = actual.join(rel);
        if entry.is_dir() {
            assert!(other.is_dir(), "missing directory {rel:?}");
        } else {
            assert_eq!(fs::read(&entry).unwrap(), fs::read(&other).unwrap(), "{rel:?}");
        }
    }
}

fn tree_paths(root: &Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            out.push(path);
        }
    }
    out
}

/// Fails puts or deletes under one key namespace while a flag is set.
struct FailingStore {
    inner: InMemoryBlobStore,
    records: bool,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FailingStore {
    /// Fails operations on `_records/` keys when `records`, else on archives.
    fn new(records: bool) -> Self {
        Self {
            inner: InMemoryBlobStore::new(),
            records,
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    fn targets(&self, key: &str) -> bool {
        key.starts_with("_records/") == self.records
    }
}

#[async_trait]
impl BlobStore for FailingStore {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> StoreResult<()> {
        if self.targets(key) && self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("put refused".into()));
        }
        self.inner.put(bucket, key, data).await
    }

    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        self.inner.get(bucket, key).await
    }

    async fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> StoreResult<()> {
        self.inner.copy(bucket, source_key, dest_key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        if self.targets(key) && self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("delete refused".into()));
        }
        self.inner.delete(bucket, key).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        self.inner.list(bucket, prefix).await
    }
}

fn failing_setup(records: bool) -> (Arc<FailingStore>, Catalog) {
    let config = KartConfig::new(BUCKET).with_channel("testing", "sync", ChannelSettings::default());
    let store = Arc::new(FailingStore::new(records));
    let catalog = Catalog::new(store.clone(), Arc::new(config));
    (store, catalog)
}

// ---------------------------------------------------------------------------
// store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_empty_directory() {
    let (_store, catalog) = setup();
    let dir = build_dir(0, 0);
    let build = catalog
        .store(StoreRequest::new(dir.path(), "testing", "sync", "0.1.2").metadata("revision", "1234567"))
        .await
        .unwrap();

    assert_eq!(build.project, "testing");
    assert_eq!(build.channel, "sync");
    assert_eq!(build.version, "0.1.2");
    assert_eq!(build.number, 1);
    assert_eq!(build.arch, "all");
    assert_eq!(build.metadata.get("revision").map(String::as_str), Some("1234567"));

    let data = catalog.fetch(&build).await.unwrap();
    assert!(package::entries(&data).unwrap().is_empty());
}

#[tokio::test]
async fn store_with_subdirectories_roundtrips_contents() {
    let (_store, catalog) = setup();
    let dir = build_dir(4, 3);
    let build = catalog
        .store(StoreRequest::new(dir.path(), "testing", "sync", "0.5.6").arch("armv7"))
        .await
        .unwrap();
    assert_eq!(build.arch, "armv7");
    assert_eq!(build.number, 1);

    let data = catalog.fetch(&build).await.unwrap();
    let out = tempfile::tempdir().unwrap();
    package::unpack(&data, out.path()).unwrap();
    assert_same_tree(dir.path(), out.path());
}

#[tokio::test]
async fn store_writes_archive_and_record_keys() {
    let (store, catalog) = setup();
    let dir = build_dir(1, 0);
    let build = catalog
        .store(StoreRequest::new(dir.path(), "testing", "sync", "0.1.1"))
        .await
        .unwrap();
    assert_eq!(build.key(), "testing/sync/0.1.1/1_all.tar.gz");
    assert!(store.contains(BUCKET, &build.key()));
    assert!(store.contains(BUCKET, &build.record_key()));
}

#[tokio::test]
async fn numbers_increase_regardless_of_version() {
    let (_store, catalog) = setup();
    let first = catalog
        .store(StoreRequest::new(build_dir(4, 0).path(), "testing", "sync", "0.1.2"))
        .await
        .unwrap();
    let second = catalog
        .store(StoreRequest::new(build_dir(2, 0).path(), "testing", "sync", "0.1.1"))
        .await
        .unwrap();
    assert_eq!(first.number, 1);
    assert_eq!(second.number, 2);
}

#[tokio::test]
async fn serialized_stores_are_gapless() {
    let (_store, catalog) = setup();
    let mut numbers = Vec::new();
    for (i, arch) in ["all", "amd64", "armv7", "all", "amd64"].iter().enumerate() {
        let dir = build_dir(1, 0);
        let req = StoreRequest::new(dir.path(), "testing", "sync", format!("1.0.{i}")).arch(*arch);
        numbers.push(catalog.store(req).await.unwrap().number);
    }
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    assert_eq!(catalog.next_number("testing", "sync").await.unwrap(), 6);
}

#[tokio::test]
async fn numbers_are_scoped_per_channel() {
    let (_store, catalog) = setup();
    store_versions(&catalog, &[("1.0.0", None), ("1.0.1", None)]).await;
    let other = catalog
        .store(StoreRequest::new(build_dir(1, 0).path(), "testing", "other", "1.0.0"))
        .await
        .unwrap();
    assert_eq!(other.number, 1);
}

#[tokio::test]
async fn rejects_missing_source_directory() {
    let (store, catalog) = setup();
    let err = catalog
        .store(StoreRequest::new("/bogus/path/lol", "testing", "sync", "0.1.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::SourceNotFound { .. }));
    assert!(store.is_empty());
}

#[tokio::test]
async fn rejects_file_as_source() {
    let (_store, catalog) = setup();
    let dir = build_dir(1, 0);
    let err = catalog
        .store(StoreRequest::new(dir.path().join("file-0.txt"), "testing", "sync", "0.1.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::SourceNotFound { .. }));
}

#[tokio::test]
async fn rejects_unknown_project_and_channel_without_writing() {
    let (store, catalog) = setup();
    let dir = build_dir(1, 0);

    let err = catalog
        .store(StoreRequest::new(dir.path(), "bogus-project", "sync", "0.1.2"))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::UnknownProject(p) if p == "bogus-project"));

    let err = catalog
        .store(StoreRequest::new(dir.path(), "testing", "bogus-channel", "0.1.2"))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::UnknownChannel { .. }));

    assert!(store.is_empty());
}

#[tokio::test]
async fn rejects_unusable_identifiers() {
    let (store, catalog) = setup();
    let dir = build_dir(1, 0);
    let err = catalog
        .store(StoreRequest::new(dir.path(), "testing", "sync", "1.0/evil"))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidBuild(_)));

    let err = catalog
        .store(StoreRequest::new(dir.path(), "testing", "sync", "1.0").arch("arm.v7"))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidBuild(_)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn name_pattern_is_kept_in_the_record() {
    let (_store, catalog) = setup();
    let build = catalog
        .store(StoreRequest::new(build_dir(1, 0).path(), "testing", "sync", "2.0.0").name_pattern("{project}-{version}"))
        .await
        .unwrap();
    assert_eq!(
        catalog.name_pattern(&build).await.unwrap().as_deref(),
        Some("{project}-{version}")
    );
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_with_no_builds_is_empty() {
    let (_store, catalog) = setup();
    let list = catalog.list("testing", "sync", &ListOptions::new()).await.unwrap();
    assert!(list.is_empty());
    assert!(catalog.latest("testing", "sync").await.unwrap().is_none());
}

#[tokio::test]
async fn list_counts_builds() {
    let (_store, catalog) = setup();
    store_versions(&catalog, &[("1.2.3", None)]).await;
    assert_eq!(catalog.list("testing", "sync", &ListOptions::new()).await.unwrap().len(), 1);

    store_versions(&catalog, &[("1.2.4", None)]).await;
    assert_eq!(catalog.list("testing", "sync", &ListOptions::new()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn list_restores_metadata() {
    let (_store, catalog) = setup();
    catalog
        .store(StoreRequest::new(build_dir(1, 0).path(), "testing", "sync", "0.1.2").metadata("revision", "abc"))
        .await
        .unwrap();
    let list = catalog.list("testing", "sync", &ListOptions::new()).await.unwrap();
    assert_eq!(list[0].metadata.get("revision").map(String::as_str), Some("abc"));

    let by_meta = catalog
        .list("testing", "sync", &ListOptions::new().filter("metadata.revision", "abc"))
        .await
        .unwrap();
    assert_eq!(by_meta.len(), 1);
}

#[tokio::test]
async fn list_rejects_unknown_names() {
    let (_store, catalog) = setup();
    assert!(matches!(
        catalog.list("bogus-project", "sync", &ListOptions::new()).await,
        Err(CatalogError::UnknownProject(_))
    ));
    assert!(matches!(
        catalog.list("testing", "bogus-channel", &ListOptions::new()).await,
        Err(CatalogError::UnknownChannel { .. })
    ));
}

#[tokio::test]
async fn filter_by_one_key() {
    let (_store, catalog) = setup();
    store_versions(&catalog, &[("1.2.3", None), ("1.2.3", None), ("1.2.3", None), ("1.2.4", None)]).await;
    let list = catalog
        .list("testing", "sync", &ListOptions::new().filter("version", "1.2.3"))
        .await
        .unwrap();
    assert_eq!(list.len(), 3);
}

#[tokio::test]
async fn filter_by_two_keys() {
    let (_store, catalog) = setup();
    store_versions(
        &catalog,
        &[("1.2.3", Some("amd64")), ("1.2.3", Some("amd64")), ("1.2.3", None), ("1.2.4", None)],
    )
    .await;
    let list = catalog
        .list(
            "testing",
            "sync",
            &ListOptions::new().filter("version", "1.2.3").filter("arch", "amd64"),
        )
        .await
        .unwrap();
    assert_eq!(list.len(), 2);
    assert!(list.iter().all(|b| b.version == "1.2.3" && b.arch == "amd64"));
}

#[tokio::test]
async fn filter_by_unknown_key_matches_nothing() {
    let (_store, catalog) = setup();
    store_versions(&catalog, &[("1.2.3", None)]).await;
    let list = catalog
        .list("testing", "sync", &ListOptions::new().filter("colour", "red"))
        .await
        .unwrap();
    assert!(list.is_empty());
}

#[tokio::test]
async fn sort_descending_and_ascending_are_mirrors() {
    let (_store, catalog) = setup();
    store_versions(&catalog, &[("1.2.3", None), ("1.2.3", None), ("1.2.3", None), ("1.2.3", None)]).await;

    let desc = catalog
        .list(
            "testing",
            "sync",
            &ListOptions::new().sort_by(["project", "number"], SortOrder::Descending),
        )
        .await
        .unwrap();
    assert_eq!(desc.len(), 4);
    assert_eq!(desc[0].number, 4);
    assert_eq!(desc[3].number, 1);

    let mut asc = catalog
        .list(
            "testing",
            "sync",
            &ListOptions::new().sort_by(["project", "number"], SortOrder::Ascending),
        )
        .await
        .unwrap();
    asc.reverse();
    assert_eq!(asc, desc);
}

#[tokio::test]
async fn sort_is_numeric_not_lexical() {
    let (_store, catalog) = setup();
    let versions: Vec<String> = (0..11).map(|i| format!("0.0.{i}")).collect();
    let specs: Vec<(&str, Option<&str>)> = versions.iter().map(|v| (v.as_str(), None)).collect();
    store_versions(&catalog, &specs).await;

    let list = catalog
        .list("testing", "sync", &ListOptions::new().sort_by(["number"], SortOrder::Descending))
        .await
        .unwrap();
    assert_eq!(list[0].number, 11);
    assert_eq!(list[1].number, 10);
    assert_eq!(list[2].number, 9);
    assert_eq!(catalog.latest("testing", "sync").await.unwrap().unwrap().number, 11);
}

#[tokio::test]
async fn sort_by_unknown_field_fails() {
    let (_store, catalog) = setup();
    let err = catalog
        .list("testing", "sync", &ListOptions::new().sort_by(["colour"], SortOrder::Ascending))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::UnknownSortField(_)));
}

#[tokio::test]
async fn limit_truncates_after_sort() {
    let (_store, catalog) = setup();
    store_versions(&catalog, &[("1.2.3", None), ("1.2.3", None), ("1.2.3", None), ("1.2.3", None)]).await;
    let list = catalog
        .list(
            "testing",
            "sync",
            &ListOptions::new().sort_by(["number"], SortOrder::Descending).limit(2),
        )
        .await
        .unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].number, 4);
    assert_eq!(list[1].number, 3);
}

#[tokio::test]
async fn list_ignores_foreign_keys() {
    let (store, catalog) = setup();
    store_versions(&catalog, &[("1.0.0", None)]).await;
    store
        .put(BUCKET, "testing/sync/kart.json", bytes::Bytes::from_static(b"{}"))
        .await
        .unwrap();
    store
        .put(BUCKET, "testing/sync/1.0.0/notes.txt", bytes::Bytes::new())
        .await
        .unwrap();
    let list = catalog.list("testing", "sync", &ListOptions::new()).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(catalog.next_number("testing", "sync").await.unwrap(), 2);
}

#[tokio::test]
async fn list_without_record_has_empty_metadata() {
    let (store, catalog) = setup();
    let build = catalog
        .store(StoreRequest::new(build_dir(1, 0).path(), "testing", "sync", "1.0.0").metadata("revision", "x"))
        .await
        .unwrap();
    store.delete(BUCKET, &build.record_key()).await.unwrap();

    let list = catalog.list("testing", "sync", &ListOptions::new()).await.unwrap();
    assert_eq!(list.len(), 1);
    assert!(list[0].metadata.is_empty());
}

#[tokio::test]
async fn get_by_number() {
    let (_store, catalog) = setup();
    store_versions(&catalog, &[("1.0.0", None), ("1.1.0", None)]).await;
    assert_eq!(catalog.get("testing", "sync", 2).await.unwrap().version, "1.1.0");
    assert!(matches!(
        catalog.get("testing", "sync", 9).await,
        Err(CatalogError::BuildNotFound(_))
    ));
}

#[tokio::test]
async fn archive_write_failure_stores_nothing() {
    let (store, catalog) = failing_setup(false);
    store.fail_puts.store(true, Ordering::SeqCst);

    let dir = build_dir(1, 0);
    let err = catalog
        .store(StoreRequest::new(dir.path(), "testing", "sync", "1.0.0"))
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        CatalogError::ArchiveWrite { key, .. } if key == "testing/sync/1.0.0/1_all.tar.gz"
    ));
    assert!(err.to_string().contains("archive write failed"));
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn record_write_failure_returns_the_stored_build() {
    let (store, catalog) = failing_setup(true);
    store.fail_puts.store(true, Ordering::SeqCst);

    let dir = build_dir(1, 0);
    let err = catalog
        .store(
            StoreRequest::new(dir.path(), "testing", "sync", "1.0.0")
                .metadata("revision", "abc")
                .name_pattern("{project}-{version}"),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("record write failed"));
    let CatalogError::RecordWrite { key, build, .. } = err else {
        panic!("expected a record write failure");
    };
    assert_eq!(key, "_records/testing/sync/1.0.0/1_all.tar.gz.json");
    assert_eq!(build.number, 1);
    assert!(store.inner.contains(BUCKET, &build.key()));

    // Listed without metadata until the record lands.
    let list = catalog.list("testing", "sync", &ListOptions::new()).await.unwrap();
    assert!(list[0].metadata.is_empty());

    store.fail_puts.store(false, Ordering::SeqCst);
    catalog
        .record(&build, Some("{project}-{version}".into()))
        .await
        .unwrap();
    let list = catalog.list("testing", "sync", &ListOptions::new()).await.unwrap();
    assert_eq!(list[0].metadata.get("revision").map(String::as_str), Some("abc"));
    assert_eq!(
        catalog.name_pattern(&build).await.unwrap().as_deref(),
        Some("{project}-{version}")
    );
    assert_eq!(catalog.next_number("testing", "sync").await.unwrap(), 2);
}

#[tokio::test]
async fn exhausted_numbers_are_an_error() {
    let (store, catalog) = setup();
    store
        .put(BUCKET, &format!("testing/sync/1.0.0/{}_all.tar.gz", u64::MAX), Bytes::new())
        .await
        .unwrap();

    assert!(matches!(
        catalog.next_number("testing", "sync").await,
        Err(CatalogError::NumbersExhausted { .. })
    ));
    let dir = build_dir(1, 0);
    let err = catalog
        .store(StoreRequest::new(dir.path(), "testing", "sync", "1.0.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::NumbersExhausted { .. }));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn number_filter_is_exact() {
    let (_store, catalog) = setup();
    let versions: Vec<String> = (0..12).map(|i| format!("1.0.{i}")).collect();
    let specs: Vec<(&str, Option<&str>)> = versions.iter().map(|v| (v.as_str(), None)).collect();
    store_versions(&catalog, &specs).await;

    for (value, expected) in [("12", 1), ("012", 0), ("+12", 0)] {
        let list = catalog
            .list("testing", "sync", &ListOptions::new().filter("number", value))
            .await
            .unwrap();
        assert_eq!(list.len(), expected, "{value}");
    }
}

// ---------------------------------------------------------------------------
// remove
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remove_regular_build() {
    let (store, catalog) = setup();
    store_versions(&catalog, &[("1.2.3", None), ("1.2.4", None)]).await;
    let list = catalog.list("testing", "sync", &ListOptions::new()).await.unwrap();
    assert_eq!(list.len(), 2);

    catalog.remove(&list[0]).await.unwrap();
    let after = catalog.list("testing", "sync", &ListOptions::new()).await.unwrap();
    assert_eq!(after.len(), 1);
    assert!(!store.contains(BUCKET, &list[0].record_key()));
}

#[tokio::test]
async fn remove_last_build() {
    let (store, catalog) = setup();
    store_versions(&catalog, &[("1.2.3", None)]).await;
    let list = catalog.list("testing", "sync", &ListOptions::new()).await.unwrap();
    catalog.remove(&list[0]).await.unwrap();
    assert!(catalog.list("testing", "sync", &ListOptions::new()).await.unwrap().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn remove_twice_succeeds() {
    let (_store, catalog) = setup();
    store_versions(&catalog, &[("1.2.3", None)]).await;
    let build = catalog.list("testing", "sync", &ListOptions::new()).await.unwrap().remove(0);
    catalog.remove(&build).await.unwrap();
    catalog.remove(&build).await.unwrap();
    assert!(matches!(catalog.fetch(&build).await, Err(CatalogError::BuildNotFound(_))));
}

#[tokio::test]
async fn archive_delete_failure_keeps_build_listed() {
    let (store, catalog) = failing_setup(false);
    let dir = build_dir(1, 0);
    let build = catalog
        .store(StoreRequest::new(dir.path(), "testing", "sync", "1.0.0"))
        .await
        .unwrap();

    store.fail_deletes.store(true, Ordering::SeqCst);
    let err = catalog.remove(&build).await.unwrap_err();
    assert!(matches!(err, CatalogError::ArchiveDelete { .. }));
    assert!(err.to_string().contains("archive delete failed"));
    assert!(store.inner.contains(BUCKET, &build.record_key()));
    assert_eq!(catalog.list("testing", "sync", &ListOptions::new()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn record_delete_failure_is_finished_by_removing_again() {
    let (store, catalog) = failing_setup(true);
    let dir = build_dir(1, 0);
    let build = catalog
        .store(StoreRequest::new(dir.path(), "testing", "sync", "1.0.0"))
        .await
        .unwrap();

    store.fail_deletes.store(true, Ordering::SeqCst);
    let err = catalog.remove(&build).await.unwrap_err();
    assert!(matches!(
        &err,
        CatalogError::RecordDelete { key, .. } if key == &build.record_key()
    ));
    assert!(catalog.list("testing", "sync", &ListOptions::new()).await.unwrap().is_empty());

    store.fail_deletes.store(false, Ordering::SeqCst);
    catalog.remove(&build).await.unwrap();
    assert!(store.inner.is_empty());
}
