use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use oplog_types::{KeyPath, ObjectId, Timestamp};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectRef, PersistedObject};
use crate::record::LogRecord;
use crate::stream::{OplogReader, OplogWriter, StreamError};

/// Application-level label for the records a collection holds.
///
/// The store never interprets payload schemas; the kind exists so that
/// re-registering a collection under a different kind is caught instead of
/// silently accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordKind(String);

impl RecordKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

/// One named collection: an in-memory id → object index backed by an
/// append-only oplog at `<data_dir>/<name>.oplog`.
///
/// A collection starts empty with no log open. [`load`] replays the
/// existing log (if any) into memory; [`enable_logging`] then opens the
/// append stream, after which every mutation journals one record. Before
/// `enable_logging`, mutations update memory but never touch the file —
/// the replay reader and the appender must not coexist on one file.
///
/// [`load`]: Collection::load
/// [`enable_logging`]: Collection::enable_logging
#[derive(Debug)]
pub struct Collection {
    name: String,
    kind: RecordKind,
    path: PathBuf,
    objects: HashMap<ObjectId, PersistedObject>,
    oplog: Option<OplogWriter>,
}

impl Collection {
    pub(crate) fn new(name: impl Into<String>, kind: RecordKind, data_dir: &Path) -> Self {
        let name = name.into();
        let path = data_dir.join(format!("{name}.oplog"));
        Self {
            name,
            kind,
            path,
            objects: HashMap::new(),
            oplog: None,
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered record kind.
    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    /// Path of the backing oplog file.
    pub fn oplog_path(&self) -> &Path {
        &self.path
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate over all live objects.
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &PersistedObject)> {
        self.objects.iter()
    }

    /// Create a new object from a payload. The store assigns a fresh id,
    /// embeds it into the payload, and journals an `add` record. Returns
    /// the assigned id.
    pub fn create(&mut self, mut payload: Map<String, Value>) -> StoreResult<ObjectId> {
        let id = ObjectId::generate();
        payload.insert("id".to_string(), Value::String(id.to_string()));
        let data = Value::Object(payload);

        self.objects
            .insert(id.clone(), PersistedObject::new(data.clone()));
        self.log(LogRecord::Add {
            id: id.clone(),
            data,
            at: Timestamp::now(),
        })?;
        Ok(id)
    }

    /// Look up an object by id.
    pub fn get(&self, id: &ObjectId) -> Option<&PersistedObject> {
        self.objects.get(id)
    }

    /// Obtain a mutation handle for an object.
    pub fn get_mut(&mut self, id: &ObjectId) -> Option<ObjectRef<'_>> {
        if self.objects.contains_key(id) {
            Some(ObjectRef::new(self, id.clone()))
        } else {
            None
        }
    }

    /// Remove an object and journal an `rm` record.
    ///
    /// Removing an unknown id is a silent no-op: nothing is journaled and
    /// `false` is returned, so a stale handle can never produce a dangling
    /// record in the log.
    pub fn remove(&mut self, id: &ObjectId) -> StoreResult<bool> {
        if self.objects.remove(id).is_none() {
            warn!(collection = %self.name, %id, "remove of unknown object; nothing journaled");
            return Ok(false);
        }
        self.log(LogRecord::Remove {
            id: id.clone(),
            at: Timestamp::now(),
        })?;
        Ok(true)
    }

    /// Set a (possibly nested) field of an object, then journal a `set`
    /// record. Intermediate containers are created as needed.
    ///
    /// An unknown id is a silent no-op write: `false`, nothing journaled.
    pub fn set_at(
        &mut self,
        id: &ObjectId,
        keypath: &KeyPath,
        value: Value,
    ) -> StoreResult<bool> {
        let Some(object) = self.objects.get_mut(id) else {
            warn!(collection = %self.name, %id, %keypath, "set on unknown object; nothing journaled");
            return Ok(false);
        };
        object.apply_set(keypath, value.clone());
        self.log(LogRecord::Set {
            id: id.clone(),
            keypath: keypath.clone(),
            value,
            at: Timestamp::now(),
        })?;
        Ok(true)
    }

    /// Remove a (possibly nested) field of an object, then journal an
    /// `unset` record. An already-absent path still journals: replaying
    /// the no-op is harmless and keeps the log a faithful operation trace.
    ///
    /// An unknown id is a silent no-op write: `false`, nothing journaled.
    pub fn unset_at(&mut self, id: &ObjectId, keypath: &KeyPath) -> StoreResult<bool> {
        let Some(object) = self.objects.get_mut(id) else {
            warn!(collection = %self.name, %id, %keypath, "unset on unknown object; nothing journaled");
            return Ok(false);
        };
        object.apply_unset(keypath);
        self.log(LogRecord::Unset {
            id: id.clone(),
            keypath: keypath.clone(),
            at: Timestamp::now(),
        })?;
        Ok(true)
    }

    /// Whether live mutations are currently being journaled.
    pub fn logging_enabled(&self) -> bool {
        self.oplog.is_some()
    }

    /// Open the append stream. Must only be called once this collection's
    /// replay has finished (the database's two-phase load guarantees this
    /// across all collections).
    pub fn enable_logging(&mut self) -> StoreResult<()> {
        debug!(collection = %self.name, path = %self.path.display(), "enabling logging");
        self.oplog = Some(OplogWriter::open(&self.path)?);
        Ok(())
    }

    /// Flush and fsync the append stream, if open. The durability barrier:
    /// callers must wait for this before assuming their writes are on disk.
    pub fn close(&mut self) -> StoreResult<()> {
        if let Some(writer) = self.oplog.take() {
            writer.close()?;
        }
        Ok(())
    }

    /// Replay the existing log (if any) into memory, in file order.
    ///
    /// A missing file is an empty collection. A record that fails to
    /// decode, or a `set`/`unset` whose id has no preceding `add`, fails
    /// the load with the collection name and the record's 1-based ordinal.
    pub fn load(&mut self) -> StoreResult<()> {
        let reader = OplogReader::open(&self.path)?;
        let mut replayed = 0u64;

        for (ordinal, item) in reader {
            let record = item.map_err(|e| match e {
                StreamError::Io(e) => StoreError::Io(e),
                StreamError::Record(e) => StoreError::Decode {
                    collection: self.name.clone(),
                    line: ordinal,
                    reason: e.to_string(),
                },
            })?;

            match record {
                LogRecord::Add { id, data, .. } => {
                    self.objects.insert(id, PersistedObject::new(data));
                }
                LogRecord::Remove { id, .. } => {
                    self.objects.remove(&id);
                }
                LogRecord::Set {
                    id, keypath, value, ..
                } => {
                    let object = self.objects.get_mut(&id).ok_or_else(|| {
                        StoreError::UnknownObject {
                            collection: self.name.clone(),
                            id: id.clone(),
                            line: ordinal,
                        }
                    })?;
                    object.apply_set(&keypath, value);
                }
                LogRecord::Unset { id, keypath, .. } => {
                    let object = self.objects.get_mut(&id).ok_or_else(|| {
                        StoreError::UnknownObject {
                            collection: self.name.clone(),
                            id: id.clone(),
                            line: ordinal,
                        }
                    })?;
                    object.apply_unset(&keypath);
                }
            }
            replayed = ordinal;
        }

        debug!(collection = %self.name, records = replayed, "replay complete");
        Ok(())
    }

    fn log(&mut self, record: LogRecord) -> StoreResult<()> {
        // Logging is disabled during replay; in-memory state still updates.
        let Some(writer) = self.oplog.as_mut() else {
            return Ok(());
        };
        debug!(collection = %self.name, "logging record");
        writer.append(&record)
    }
}
