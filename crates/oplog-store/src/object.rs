use oplog_types::{KeyPath, ObjectId};
use serde_json::Value;

use crate::collection::Collection;
use crate::error::StoreResult;

/// One stored document: a JSON object payload with its `id` embedded.
///
/// Owned exclusively by the [`Collection`] it lives in; obtained through
/// [`Collection::get`] for reads and mutated through an [`ObjectRef`].
#[derive(Clone, Debug, PartialEq)]
pub struct PersistedObject {
    data: Value,
}

impl PersistedObject {
    pub(crate) fn new(data: Value) -> Self {
        Self { data }
    }

    /// The embedded object id.
    pub fn id(&self) -> &str {
        self.data.get("id").and_then(Value::as_str).unwrap_or_default()
    }

    /// The full payload, `id` included.
    pub fn payload(&self) -> &Value {
        &self.data
    }

    /// Resolve a keypath inside the payload.
    pub fn get(&self, keypath: &KeyPath) -> Option<&Value> {
        keypath.get(&self.data)
    }

    /// The payload as compact JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.data).expect("serializing a JSON value cannot fail")
    }

    pub(crate) fn apply_set(&mut self, keypath: &KeyPath, value: Value) {
        keypath.set(&mut self.data, value);
    }

    pub(crate) fn apply_unset(&mut self, keypath: &KeyPath) -> bool {
        keypath.unset(&mut self.data)
    }
}

/// Mutation handle for one object in a collection.
///
/// This is the object's back-reference to its owning store, expressed as a
/// borrow: every mutation goes through the collection so it can be
/// journaled, and the handle can neither outlive the collection nor affect
/// its lifecycle. While a handle exists the object cannot be removed out
/// from under it.
pub struct ObjectRef<'a> {
    collection: &'a mut Collection,
    id: ObjectId,
}

impl<'a> ObjectRef<'a> {
    pub(crate) fn new(collection: &'a mut Collection, id: ObjectId) -> Self {
        Self { collection, id }
    }

    /// The object's id.
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// The object's payload.
    pub fn payload(&self) -> &Value {
        self.collection
            .get(&self.id)
            .expect("object removed while handle held")
            .payload()
    }

    /// Resolve a keypath inside the payload.
    pub fn get(&self, keypath: &KeyPath) -> Option<&Value> {
        keypath.get(self.payload())
    }

    /// Set a (possibly nested) field and journal the change.
    pub fn set_at(&mut self, keypath: &KeyPath, value: Value) -> StoreResult<()> {
        self.collection.set_at(&self.id, keypath, value)?;
        Ok(())
    }

    /// Remove a (possibly nested) field and journal the change.
    pub fn unset_at(&mut self, keypath: &KeyPath) -> StoreResult<()> {
        self.collection.unset_at(&self.id, keypath)?;
        Ok(())
    }

    /// Delete this object from its collection.
    pub fn destroy(self) -> StoreResult<()> {
        let Self { collection, id } = self;
        collection.remove(&id)?;
        Ok(())
    }
}
