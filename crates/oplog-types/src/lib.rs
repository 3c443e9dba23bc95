//! Foundation types for oplogdb.
//!
//! This crate provides the identifier, temporal, and path types shared by
//! the rest of the system. Every other oplogdb crate depends on
//! `oplog-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] — Opaque short unique string identifier, store-assigned
//! - [`Timestamp`] — Wall-clock milliseconds since the UNIX epoch
//! - [`KeyPath`] — Parsed dot/bracket path addressing a field inside a
//!   nested JSON document, with the set/unset/get algorithms over
//!   [`serde_json::Value`]

pub mod error;
pub mod id;
pub mod keypath;
pub mod timestamp;

pub use error::TypeError;
pub use id::ObjectId;
pub use keypath::{KeyPath, KeySegment};
pub use timestamp::Timestamp;
