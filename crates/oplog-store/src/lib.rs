//! Persistence engine for oplogdb.
//!
//! Each named collection of JSON documents is backed by an append-only
//! operation log ("oplog") on disk: one UTF-8 file per collection, one
//! JSON-encoded record per line. The in-memory state of a collection is
//! always reconstructible by replaying its log from empty state.
//!
//! # Components
//!
//! - [`LogRecord`] — the four record kinds and their line codec
//! - [`OplogWriter`] / [`OplogReader`] — the append/replay streams
//! - [`Collection`] — one collection's in-memory index plus its stream
//! - [`Database`] — the registry of collections and the two-phase load
//! - [`PersistedObject`] / [`ObjectRef`] — a stored document and its
//!   mutation handle
//!
//! # Lifecycle
//!
//! 1. Open a [`Database`] against a validated data directory.
//! 2. Register collections with [`Database::ensure_collection`].
//! 3. Call [`Database::load`]: every collection replays its log, and only
//!    after *all* replays finish is logging enabled anywhere. No collection
//!    accepts live writes while a sibling is still mid-replay.
//! 4. Mutate through [`Collection`] or [`ObjectRef`]; each mutation appends
//!    one record to that collection's log.
//! 5. Call [`Database::close`] and wait for it before assuming durability.

pub mod collection;
pub mod database;
pub mod error;
pub mod object;
pub mod record;
pub mod stream;

pub use collection::{Collection, RecordKind};
pub use database::Database;
pub use error::{StoreError, StoreResult};
pub use object::{ObjectRef, PersistedObject};
pub use record::{LogRecord, RecordError};
pub use stream::{OplogReader, OplogWriter, StreamError};
