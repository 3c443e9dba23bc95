use oplog_types::{KeyPath, ObjectId, Timestamp};
use serde_json::{json, Value};

/// One journaled operation.
///
/// Line format (one compact JSON object per line, `t` in epoch ms):
/// ```text
/// {"add": <payload-with-id>, "t": <ms>}
/// {"rm": "<id>", "t": <ms>}
/// {"id": "<id>", "set": "<keypath>", "v": <value>, "t": <ms>}
/// {"id": "<id>", "unset": "<keypath>", "t": <ms>}
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum LogRecord {
    /// A new object was created. `data` is the full payload with the
    /// assigned `id` embedded; `id` is that same id, pre-extracted.
    Add {
        id: ObjectId,
        data: Value,
        at: Timestamp,
    },
    /// An object was removed. The record itself stays in the log, which is
    /// what makes deletion replayable.
    Remove { id: ObjectId, at: Timestamp },
    /// A (possibly nested) field was set.
    Set {
        id: ObjectId,
        keypath: KeyPath,
        value: Value,
        at: Timestamp,
    },
    /// A (possibly nested) field was removed.
    Unset {
        id: ObjectId,
        keypath: KeyPath,
        at: Timestamp,
    },
}

/// A single record failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("not valid JSON: {0}")]
    Json(String),

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record matches no known operation")]
    UnknownOperation,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

impl LogRecord {
    /// Timestamp carried by this record.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Add { at, .. }
            | Self::Remove { at, .. }
            | Self::Set { at, .. }
            | Self::Unset { at, .. } => *at,
        }
    }

    /// Encode as a single line of compact JSON (no trailing newline).
    pub fn encode(&self) -> String {
        let value = match self {
            Self::Add { data, at, .. } => json!({ "add": data, "t": at }),
            Self::Remove { id, at } => json!({ "rm": id, "t": at }),
            Self::Set {
                id,
                keypath,
                value,
                at,
            } => json!({ "id": id, "set": keypath, "v": value, "t": at }),
            Self::Unset { id, keypath, at } => {
                json!({ "id": id, "unset": keypath, "t": at })
            }
        };
        // Compact JSON of an in-memory `Value` cannot fail or span lines.
        serde_json::to_string(&value).expect("serializing a JSON value cannot fail")
    }

    /// Decode one log line.
    pub fn decode(line: &str) -> Result<Self, RecordError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| RecordError::Json(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(RecordError::NotAnObject);
        };

        let at = match map.get("t") {
            Some(t) => t
                .as_u64()
                .map(Timestamp::from_millis)
                .ok_or(RecordError::InvalidField {
                    field: "t",
                    reason: "expected epoch milliseconds".into(),
                })?,
            None => return Err(RecordError::MissingField("t")),
        };

        // Operation discrimination follows the writer's precedence:
        // add, rm, set, unset.
        if let Some(data) = map.get("add") {
            if !data.is_object() {
                return Err(RecordError::InvalidField {
                    field: "add",
                    reason: "payload must be a JSON object".into(),
                });
            }
            let id = embedded_id(data)?;
            return Ok(Self::Add {
                id,
                data: data.clone(),
                at,
            });
        }

        if let Some(rm) = map.get("rm") {
            let id = id_from(rm, "rm")?;
            return Ok(Self::Remove { id, at });
        }

        if let Some(set) = map.get("set") {
            let id = id_field(&map)?;
            let keypath = keypath_from(set, "set")?;
            let value = map
                .get("v")
                .cloned()
                .ok_or(RecordError::MissingField("v"))?;
            return Ok(Self::Set {
                id,
                keypath,
                value,
                at,
            });
        }

        if let Some(unset) = map.get("unset") {
            let id = id_field(&map)?;
            let keypath = keypath_from(unset, "unset")?;
            return Ok(Self::Unset { id, keypath, at });
        }

        Err(RecordError::UnknownOperation)
    }
}

fn embedded_id(data: &Value) -> Result<ObjectId, RecordError> {
    let id = data
        .get("id")
        .and_then(Value::as_str)
        .ok_or(RecordError::InvalidField {
            field: "add",
            reason: "payload is missing an `id` string".into(),
        })?;
    ObjectId::parse(id).map_err(|e| RecordError::InvalidField {
        field: "add",
        reason: e.to_string(),
    })
}

fn id_field(map: &serde_json::Map<String, Value>) -> Result<ObjectId, RecordError> {
    let value = map.get("id").ok_or(RecordError::MissingField("id"))?;
    id_from(value, "id")
}

fn id_from(value: &Value, field: &'static str) -> Result<ObjectId, RecordError> {
    let s = value.as_str().ok_or(RecordError::InvalidField {
        field,
        reason: "expected a string id".into(),
    })?;
    ObjectId::parse(s).map_err(|e| RecordError::InvalidField {
        field,
        reason: e.to_string(),
    })
}

fn keypath_from(value: &Value, field: &'static str) -> Result<KeyPath, RecordError> {
    let s = value.as_str().ok_or(RecordError::InvalidField {
        field,
        reason: "expected a keypath string".into(),
    })?;
    s.parse().map_err(|e: oplog_types::TypeError| RecordError::InvalidField {
        field,
        reason: e.to_string(),
    })
}
