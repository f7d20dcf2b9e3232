//! Promotion of cached objects into sandbox working directories
//!
//! A staged entry only ever moves forward: it is replaced when the cache
//! holds a strictly newer timestamp, never the other way round. The payload
//! is renamed into place before its metadata is written, so a staged
//! timestamp never claims more than the payload next to it.

use crate::layout::{Layout, copy_preserving, create_shared_dir};
use crate::lock::{LockKey, ObjectLocks};
use crate::metadata::MetadataStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use unitgate_common::{Error, Result, TenantScope};

/// Result of a staging call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    /// The cached copy was promoted
    Promoted,
    /// The staged copy was already current
    UpToDate,
}

/// Promotes cache entries into the sandbox
pub struct Stager {
    layout: Arc<Layout>,
    metadata: Arc<dyn MetadataStore>,
    locks: Arc<ObjectLocks>,
}

impl Stager {
    /// Create a staging engine
    pub fn new(
        layout: Arc<Layout>,
        metadata: Arc<dyn MetadataStore>,
        locks: Arc<ObjectLocks>,
    ) -> Self {
        Self {
            layout,
            metadata,
            locks,
        }
    }

    /// Promote `(namespace, name)` into the working directory of
    /// `main_class`
    ///
    /// The cache entry must already exist. Once both the cached and the
    /// staged copy exist, their timestamps decide; missing or unreadable
    /// metadata on either side fails with `MetadataUnavailable`.
    pub fn stage(
        &self,
        scope: &TenantScope,
        main_class: &str,
        namespace: &str,
        name: &str,
    ) -> Result<StageOutcome> {
        let cached = self.layout.cache_path(scope, namespace, name)?;
        let dest_dir = self.layout.stage_dir(scope, main_class)?;
        let dest = self.layout.stage_path(scope, main_class, name)?;
        let _source = self.locks.lock(LockKey::cached(scope, namespace, name));
        let _dest = self.locks.lock(LockKey::staged(scope, main_class, name));

        let promote = if !dest_dir.is_dir() {
            create_shared_dir(&dest_dir)?;
            true
        } else if !dest.is_file() {
            true
        } else {
            self.timestamp(&cached)? > self.timestamp(&dest)?
        };

        if !promote {
            debug!("{}/{} already current in {}", namespace, name, main_class);
            return Ok(StageOutcome::UpToDate);
        }

        info!(
            "Updating {}/{} from cache into {}",
            namespace,
            name,
            dest_dir.display()
        );
        let metadata = self.metadata.read(&cached)?;
        copy_preserving(&cached, &dest)?;
        self.metadata.write(&dest, &metadata)?;
        Ok(StageOutcome::Promoted)
    }

    fn timestamp(&self, path: &Path) -> Result<f64> {
        self.metadata
            .read(path)?
            .timestamp()
            .map_err(|e| Error::metadata_unavailable(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSync;
    use crate::layout::write_atomic;
    use crate::metadata::{SidecarMetadataStore, sidecar_path};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::fs::{self, File};
    use std::path::PathBuf;
    use std::thread;
    use std::time::{Duration, SystemTime};
    use tempfile::{TempDir, tempdir};
    use unitgate_client::MemoryBlobStore;
    use unitgate_common::{ObjectMetadata, RefreshPolicy, TIMESTAMP_KEY, Tenant};

    struct Fixture {
        _dir: TempDir,
        layout: Arc<Layout>,
        stager: Stager,
        locks: Arc<ObjectLocks>,
        scope: TenantScope,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let layout = Arc::new(Layout::new(
            dir.path().join("cache"),
            dir.path().join("sandbox"),
        ));
        let locks = Arc::new(ObjectLocks::new());
        let stager = Stager::new(
            layout.clone(),
            Arc::new(SidecarMetadataStore::new()),
            locks.clone(),
        );
        Fixture {
            _dir: dir,
            layout,
            stager,
            locks,
            scope: TenantScope::from_account("AUTH_stagetenant00001").unwrap(),
        }
    }

    fn write_entry(path: &Path, body: &[u8], ts: f64) {
        create_shared_dir(path.parent().unwrap()).unwrap();
        write_atomic(path, body).unwrap();
        let metadata: ObjectMetadata = [(TIMESTAMP_KEY, format!("{ts:.1}"))].into_iter().collect();
        SidecarMetadataStore::new().write(path, &metadata).unwrap();
    }

    fn timestamp(path: &Path) -> f64 {
        SidecarMetadataStore::new()
            .read(path)
            .unwrap()
            .timestamp()
            .unwrap()
    }

    impl Fixture {
        fn cache(&self, name: &str, body: &[u8], ts: f64) -> PathBuf {
            let path = self.layout.cache_path(&self.scope, "units", name).unwrap();
            write_entry(&path, body, ts);
            path
        }

        fn staged(&self, name: &str) -> PathBuf {
            self.layout
                .stage_path(&self.scope, "HelloMain", name)
                .unwrap()
        }

        fn stage(&self, name: &str) -> Result<StageOutcome> {
            self.stager.stage(&self.scope, "HelloMain", "units", name)
        }
    }

    #[test]
    fn test_first_stage_creates_directory() {
        let f = fixture();
        f.cache("hello", b"v1", 100.0);

        assert_eq!(f.stage("hello").unwrap(), StageOutcome::Promoted);

        let staged = f.staged("hello");
        assert!(staged.ends_with("stagetenant00/HelloMain/hello"));
        assert_eq!(fs::read(&staged).unwrap(), b"v1");
        assert_eq!(timestamp(&staged), 100.0);
    }

    #[test]
    fn test_missing_destination_file_is_promoted() {
        let f = fixture();
        f.cache("hello", b"hello", 100.0);
        f.cache("other", b"other", 100.0);
        f.stage("hello").unwrap();

        // Directory exists, file does not
        assert_eq!(f.stage("other").unwrap(), StageOutcome::Promoted);
        assert_eq!(fs::read(f.staged("other")).unwrap(), b"other");
    }

    #[test]
    fn test_restaging_fresh_copy_is_noop() {
        let f = fixture();
        f.cache("hello", b"v1", 100.0);
        f.stage("hello").unwrap();

        let staged = f.staged("hello");
        let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        File::options()
            .write(true)
            .open(&staged)
            .unwrap()
            .set_modified(past)
            .unwrap();

        assert_eq!(f.stage("hello").unwrap(), StageOutcome::UpToDate);
        assert_eq!(fs::read(&staged).unwrap(), b"v1");
        assert_eq!(fs::metadata(&staged).unwrap().modified().unwrap(), past);
    }

    #[test]
    fn test_stale_staged_copy_is_refreshed() {
        let f = fixture();
        f.cache("hello", b"old", 50.0);
        f.stage("hello").unwrap();

        f.cache("hello", b"new", 100.0);
        assert_eq!(f.stage("hello").unwrap(), StageOutcome::Promoted);

        let staged = f.staged("hello");
        assert_eq!(fs::read(&staged).unwrap(), b"new");
        assert_eq!(timestamp(&staged), 100.0);
    }

    #[test]
    fn test_older_cache_never_overwrites_staged() {
        let f = fixture();
        f.cache("hello", b"new", 100.0);
        f.stage("hello").unwrap();

        f.cache("hello", b"old", 50.0);
        assert_eq!(f.stage("hello").unwrap(), StageOutcome::UpToDate);
        assert_eq!(fs::read(f.staged("hello")).unwrap(), b"new");
        assert_eq!(timestamp(&f.staged("hello")), 100.0);
    }

    #[test]
    fn test_promotion_keeps_source_mtime() {
        let f = fixture();
        let cached = f.cache("hello", b"v1", 100.0);
        let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        File::options()
            .write(true)
            .open(&cached)
            .unwrap()
            .set_modified(past)
            .unwrap();

        f.stage("hello").unwrap();
        assert_eq!(
            fs::metadata(f.staged("hello")).unwrap().modified().unwrap(),
            past
        );
    }

    #[test]
    fn test_missing_staged_metadata() {
        let f = fixture();
        f.cache("hello", b"v1", 100.0);
        f.stage("hello").unwrap();
        fs::remove_file(sidecar_path(&f.staged("hello"))).unwrap();

        let err = f.stage("hello").unwrap_err();
        assert!(matches!(err, Error::MetadataUnavailable { .. }));
    }

    #[test]
    fn test_corrupt_cached_timestamp() {
        let f = fixture();
        let cached = f.cache("hello", b"v1", 100.0);
        f.stage("hello").unwrap();

        let metadata: ObjectMetadata = [(TIMESTAMP_KEY, "soon")].into_iter().collect();
        SidecarMetadataStore::new().write(&cached, &metadata).unwrap();

        let err = f.stage("hello").unwrap_err();
        assert!(matches!(err, Error::MetadataUnavailable { .. }));
    }

    #[test]
    fn test_staged_timestamp_is_monotonic() {
        let f = fixture();
        let mut rng = StdRng::seed_from_u64(7);
        let mut highest = f64::MIN;

        for round in 0..50 {
            let ts = f64::from(rng.gen_range(1..1000_u32));
            let body = format!("round {round} at {ts}");
            f.cache("hello", body.as_bytes(), ts);

            let outcome = f.stage("hello").unwrap();
            let staged_ts = timestamp(&f.staged("hello"));

            if ts > highest {
                assert_eq!(outcome, StageOutcome::Promoted);
                assert_eq!(fs::read(f.staged("hello")).unwrap(), body.as_bytes());
                highest = ts;
            } else {
                assert_eq!(outcome, StageOutcome::UpToDate);
            }
            assert_eq!(staged_ts, highest);
        }
    }

    #[test]
    fn test_destination_lock_spans_namespaces() {
        let f = fixture();
        let cached = f
            .layout
            .cache_path(&f.scope, "dependencies", "hello")
            .unwrap();
        write_entry(&cached, b"library", 100.0);

        // A unit named like the dependency is being promoted into the same file
        let busy = f.locks.lock(LockKey::staged(&f.scope, "HelloMain", "hello"));
        thread::scope(|s| {
            let staging =
                s.spawn(|| f.stager.stage(&f.scope, "HelloMain", "dependencies", "hello"));
            thread::sleep(Duration::from_millis(100));
            assert!(!f.staged("hello").exists());

            drop(busy);
            assert_eq!(staging.join().unwrap().unwrap(), StageOutcome::Promoted);
        });
        assert_eq!(fs::read(f.staged("hello")).unwrap(), b"library");
    }

    #[test]
    fn test_concurrent_fetch_and_stage_keep_payload_paired() {
        let dir = tempdir().unwrap();
        let layout = Arc::new(Layout::new(
            dir.path().join("cache"),
            dir.path().join("sandbox"),
        ));
        let metadata: Arc<dyn MetadataStore> = Arc::new(SidecarMetadataStore::new());
        let locks = Arc::new(ObjectLocks::new());
        let remote = Arc::new(MemoryBlobStore::new());
        let cache = CacheSync::new(
            layout.clone(),
            remote.clone(),
            metadata.clone(),
            locks.clone(),
            RefreshPolicy::Always,
        );
        let stager = Stager::new(layout.clone(), metadata, locks.clone());
        let tenant = Tenant::from_account("AUTH_stagetenant00001").unwrap();

        thread::scope(|s| {
            for worker in 0..8_u32 {
                let (cache, stager, remote, tenant) = (&cache, &stager, &remote, &tenant);
                s.spawn(move || {
                    for round in 0..25_u32 {
                        // Payload is its own timestamp
                        let version = format!("{:.1}", f64::from(round * 8 + worker));
                        let object: ObjectMetadata =
                            [(TIMESTAMP_KEY, version.clone())].into_iter().collect();
                        remote.put(&tenant.account, "units", "hello", version, object);

                        cache.ensure_cached(tenant, "units", "hello").unwrap();
                        stager
                            .stage(&tenant.scope, "HelloMain", "units", "hello")
                            .unwrap();
                    }
                });
            }
        });

        let cached = layout.cache_path(&tenant.scope, "units", "hello").unwrap();
        let cached_body: f64 = fs::read_to_string(&cached).unwrap().parse().unwrap();
        assert_eq!(cached_body, timestamp(&cached));

        let staged = layout
            .stage_path(&tenant.scope, "HelloMain", "hello")
            .unwrap();
        let staged_body: f64 = fs::read_to_string(&staged).unwrap().parse().unwrap();
        assert_eq!(staged_body, timestamp(&staged));
        assert_eq!(locks.held_count(), 0);
    }
}
