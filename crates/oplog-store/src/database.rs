use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;

use tracing::{debug, info};

use crate::collection::{Collection, RecordKind};
use crate::error::{StoreError, StoreResult};

/// The registry of named collections sharing one storage directory.
///
/// Construction validates the directory up front; registration is
/// idempotent; [`load`] drives the two-phase startup: replay every
/// collection, and only once *all* replays have finished enable logging
/// everywhere.
///
/// [`load`]: Database::load
#[derive(Debug)]
pub struct Database {
    data_dir: PathBuf,
    collections: BTreeMap<String, Collection>,
}

impl Database {
    /// Open a database over an existing, readable and writable directory.
    ///
    /// Fails fast with the offending path and the underlying filesystem
    /// error otherwise. The caller is responsible for choosing the path;
    /// default-directory probing belongs to the embedding application.
    pub fn open(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let data_dir = data_dir.into();
        validate_data_dir(&data_dir).map_err(|source| StoreError::InvalidDataDir {
            path: data_dir.clone(),
            source,
        })?;

        debug!(data_dir = %data_dir.display(), "opened database");
        Ok(Self {
            data_dir,
            collections: BTreeMap::new(),
        })
    }

    /// The validated storage directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Register a collection, or return the existing one.
    ///
    /// Idempotent for a matching `kind`; re-registering under a different
    /// kind is an error rather than being silently accepted.
    pub fn ensure_collection(
        &mut self,
        name: &str,
        kind: RecordKind,
    ) -> StoreResult<&mut Collection> {
        match self.collections.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let existing = entry.into_mut();
                if existing.kind() != &kind {
                    return Err(StoreError::KindMismatch {
                        collection: name.to_string(),
                        registered: existing.kind().to_string(),
                        requested: kind.to_string(),
                    });
                }
                Ok(existing)
            }
            Entry::Vacant(entry) => {
                debug!(collection = name, %kind, "adding collection");
                Ok(entry.insert(Collection::new(name, kind, &self.data_dir)))
            }
        }
    }

    /// Look up a registered collection.
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// Look up a registered collection for mutation.
    pub fn collection_mut(&mut self, name: &str) -> Option<&mut Collection> {
        self.collections.get_mut(name)
    }

    /// Iterate over all registered collections.
    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    /// Replay every collection's log, then enable logging everywhere.
    ///
    /// Phase one replays collections concurrently (one scoped thread per
    /// collection) and joins them all — success or failure — before
    /// anything else happens. Phase two only runs if every replay
    /// succeeded; any failure fails the whole load and no collection gets
    /// its logging enabled. This is the barrier that keeps a would-be
    /// writer away from a log file whose replay reader is still draining,
    /// and keeps a half-initialized database from taking live writes.
    ///
    /// There is no cancellation or timeout: a stalled filesystem stalls
    /// the load.
    pub fn load(&mut self) -> StoreResult<()> {
        let results: Vec<StoreResult<()>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .collections
                .values_mut()
                .map(|collection| scope.spawn(move || collection.load()))
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        // All replays have finished; surface the first failure, if any.
        for result in results {
            result?;
        }

        for collection in self.collections.values_mut() {
            collection.enable_logging()?;
        }

        info!(
            collections = self.collections.len(),
            data_dir = %self.data_dir.display(),
            "database loaded"
        );
        Ok(())
    }

    /// Flush and fsync every collection's log. The durability barrier to
    /// wait on before exiting.
    pub fn close(&mut self) -> StoreResult<()> {
        for collection in self.collections.values_mut() {
            collection.close()?;
        }
        Ok(())
    }
}

/// Check that the path is a directory we can both read and write.
fn validate_data_dir(path: &Path) -> io::Result<()> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_dir() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a directory"));
    }

    // Readability: we must be able to enumerate the directory.
    fs::read_dir(path)?;

    // Writability: probe with a scratch file, as access bits alone lie on
    // some filesystems.
    let probe = path.join(".oplogdb-write-probe");
    let result = fs::File::create(&probe).and_then(|mut f| f.write_all(b"probe"));
    let _ = fs::remove_file(&probe);
    result?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogRecord;
    use crate::stream::OplogReader;
    use oplog_types::KeyPath;
    use serde_json::{json, Map, Value};

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object payload, got {other}"),
        }
    }

    fn path(s: &str) -> KeyPath {
        s.parse().unwrap()
    }

    #[test]
    fn open_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = Database::open(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDataDir { .. }));
    }

    #[test]
    fn open_rejects_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain-file");
        std::fs::write(&file, b"x").unwrap();
        let err = Database::open(&file).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDataDir { .. }));
    }

    #[test]
    fn ensure_collection_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::open(dir.path()).unwrap();
        db.ensure_collection("users", RecordKind::new("user")).unwrap();
        db.ensure_collection("users", RecordKind::new("user")).unwrap();
        assert_eq!(db.collections().count(), 1);
    }

    #[test]
    fn ensure_collection_rejects_kind_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::open(dir.path()).unwrap();
        db.ensure_collection("users", RecordKind::new("user")).unwrap();
        let err = db
            .ensure_collection("users", RecordKind::new("invoice"))
            .unwrap_err();
        match err {
            StoreError::KindMismatch {
                collection,
                registered,
                requested,
            } => {
                assert_eq!(collection, "users");
                assert_eq!(registered, "user");
                assert_eq!(requested, "invoice");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_enables_logging_on_every_collection() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::open(dir.path()).unwrap();
        db.ensure_collection("users", RecordKind::new("user")).unwrap();
        db.ensure_collection("posts", RecordKind::new("post")).unwrap();

        db.load().unwrap();
        assert!(db.collections().all(Collection::logging_enabled));
    }

    #[test]
    fn corrupt_collection_fails_whole_load_and_nothing_logs() {
        let dir = tempfile::tempdir().unwrap();
        // Collection "aaa" has a dangling set record; "zzz" is healthy.
        std::fs::write(
            dir.path().join("aaa.oplog"),
            "{\"id\":\"ghost\",\"set\":\"k\",\"v\":1,\"t\":1}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("zzz.oplog"),
            "{\"add\":{\"id\":\"z1\",\"n\":1},\"t\":1}\n",
        )
        .unwrap();

        let mut db = Database::open(dir.path()).unwrap();
        db.ensure_collection("aaa", RecordKind::new("a")).unwrap();
        db.ensure_collection("zzz", RecordKind::new("z")).unwrap();

        let err = db.load().unwrap_err();
        assert!(matches!(err, StoreError::UnknownObject { line: 1, .. }));
        // The barrier: a failed phase one means no collection accepts
        // live writes, healthy siblings included.
        assert!(db.collections().all(|c| !c.logging_enabled()));
    }

    #[test]
    fn full_lifecycle_across_two_collections() {
        let dir = tempfile::tempdir().unwrap();

        let (user_id, post_id) = {
            let mut db = Database::open(dir.path()).unwrap();
            db.ensure_collection("users", RecordKind::new("user")).unwrap();
            db.ensure_collection("posts", RecordKind::new("post")).unwrap();
            db.load().unwrap();

            let users = db.collection_mut("users").unwrap();
            let user_id = users.create(payload(json!({"username": "u1"}))).unwrap();
            users
                .set_at(&user_id, &path("profile.email"), json!("u1@x.io"))
                .unwrap();

            let posts = db.collection_mut("posts").unwrap();
            let post_id = posts
                .create(payload(json!({"title": "hello", "tags": ["a"]})))
                .unwrap();
            posts.set_at(&post_id, &path("tags.1"), json!("b")).unwrap();

            db.close().unwrap();
            (user_id, post_id)
        };

        let mut db = Database::open(dir.path()).unwrap();
        db.ensure_collection("users", RecordKind::new("user")).unwrap();
        db.ensure_collection("posts", RecordKind::new("post")).unwrap();
        db.load().unwrap();

        let user = db.collection("users").unwrap().get(&user_id).unwrap();
        assert_eq!(user.get(&path("profile.email")), Some(&json!("u1@x.io")));

        let post = db.collection("posts").unwrap().get(&post_id).unwrap();
        assert_eq!(post.get(&path("tags")), Some(&json!(["a", "b"])));
    }

    #[test]
    fn replay_fidelity_over_random_operations() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::open(dir.path()).unwrap();
        db.ensure_collection("docs", RecordKind::new("doc")).unwrap();
        db.load().unwrap();

        let docs = db.collection_mut("docs").unwrap();
        let mut ids = Vec::new();
        for n in 0..20 {
            ids.push(docs.create(payload(json!({"n": n}))).unwrap());
        }
        for (n, id) in ids.iter().enumerate() {
            docs.set_at(id, &path("meta.rank"), json!(n)).unwrap();
            if n % 3 == 0 {
                docs.unset_at(id, &path("n")).unwrap();
            }
            if n % 5 == 0 {
                docs.remove(id).unwrap();
            }
        }
        db.close().unwrap();

        let live: Vec<_> = {
            let docs = db.collection("docs").unwrap();
            let mut pairs: Vec<_> = docs
                .iter()
                .map(|(id, obj)| (id.clone(), obj.payload().clone()))
                .collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            pairs
        };

        let mut reloaded = Database::open(dir.path()).unwrap();
        reloaded
            .ensure_collection("docs", RecordKind::new("doc"))
            .unwrap();
        reloaded.load().unwrap();

        let replayed: Vec<_> = {
            let docs = reloaded.collection("docs").unwrap();
            let mut pairs: Vec<_> = docs
                .iter()
                .map(|(id, obj)| (id.clone(), obj.payload().clone()))
                .collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            pairs
        };

        assert_eq!(live, replayed);
    }

    #[test]
    fn reopened_database_appends_after_existing_records() {
        let dir = tempfile::tempdir().unwrap();

        let first_id = {
            let mut db = Database::open(dir.path()).unwrap();
            let users = db.ensure_collection("users", RecordKind::new("user")).unwrap();
            users.load().unwrap();
            users.enable_logging().unwrap();
            let id = users.create(payload(json!({"n": 1}))).unwrap();
            db.close().unwrap();
            id
        };

        let mut db = Database::open(dir.path()).unwrap();
        db.ensure_collection("users", RecordKind::new("user")).unwrap();
        db.load().unwrap();
        let users = db.collection_mut("users").unwrap();
        users.create(payload(json!({"n": 2}))).unwrap();
        db.close().unwrap();

        let records: Vec<_> = OplogReader::open(&dir.path().join("users.oplog"))
            .unwrap()
            .map(|(_, item)| item.unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert!(matches!(&records[0], LogRecord::Add { id, .. } if *id == first_id));
    }
}
