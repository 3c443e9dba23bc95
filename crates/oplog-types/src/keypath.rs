use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::TypeError;

/// One step of a [`KeyPath`]: an object key or an array index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeySegment {
    /// Named field of a JSON object.
    Key(String),
    /// Position in a JSON array.
    Index(usize),
}

/// A parsed path into a nested JSON document.
///
/// Accepts dot and bracket notation: `profile.email`, `tags.0`,
/// `tags[0].name`. A bare segment consisting only of ASCII digits is an
/// array index; everything else is an object key.
///
/// `KeyPath` carries both the parsed segments and the original source
/// string, so encoding a path back into a log record is lossless.
#[derive(Clone)]
pub struct KeyPath {
    raw: String,
    segments: Vec<KeySegment>,
}

impl KeyPath {
    /// The segments of this path, in order.
    pub fn segments(&self) -> &[KeySegment] {
        &self.segments
    }

    /// The original path string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve this path against a document, if every step exists.
    ///
    /// An index segment against an object resolves the index as a string
    /// key, mirroring [`set`](KeyPath::set).
    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut node = root;
        for segment in &self.segments {
            node = match segment {
                KeySegment::Key(key) => node.get(key.as_str())?,
                KeySegment::Index(index) => match node {
                    Value::Object(map) => map.get(index.to_string().as_str())?,
                    other => other.get(*index)?,
                },
            };
        }
        Some(node)
    }

    /// Set the value at this path, creating intermediate containers.
    ///
    /// Only a missing or scalar intermediate is replaced by an empty
    /// object (or an empty array when the next segment is an index).
    /// Existing containers are kept: an index segment against an object
    /// assigns the index as a string key, and arrays are padded with
    /// nulls up to the target index. A named field cannot be represented
    /// on a JSON array, so a key segment against an array drops the
    /// write.
    pub fn set(&self, root: &mut Value, value: Value) {
        set_in(&self.segments, root, value);
    }

    /// Remove the value at this path.
    ///
    /// An absent path is a silent no-op; returns `true` if something was
    /// actually removed. On arrays the slot is nulled rather than removed,
    /// so sibling indices stay stable across replay.
    pub fn unset(&self, root: &mut Value) -> bool {
        unset_in(&self.segments, root)
    }
}

fn set_in(segments: &[KeySegment], node: &mut Value, value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    match head {
        KeySegment::Key(key) => {
            if matches!(node, Value::Array(_)) {
                // Named fields are not representable on a JSON array;
                // the write is dropped rather than destroying the array.
                return;
            }
            if !matches!(node, Value::Object(_)) {
                *node = Value::Object(Map::new());
            }
            if let Value::Object(map) = node {
                let child = map.entry(key.clone()).or_insert(Value::Null);
                set_in(rest, child, value);
            }
        }
        KeySegment::Index(index) => {
            // An existing object keeps its entries; the index becomes a
            // string key.
            if let Value::Object(map) = node {
                let child = map.entry(index.to_string()).or_insert(Value::Null);
                set_in(rest, child, value);
                return;
            }
            if !matches!(node, Value::Array(_)) {
                *node = Value::Array(Vec::new());
            }
            if let Value::Array(items) = node {
                if items.len() <= *index {
                    items.resize(*index + 1, Value::Null);
                }
                set_in(rest, &mut items[*index], value);
            }
        }
    }
}

fn unset_in(segments: &[KeySegment], node: &mut Value) -> bool {
    match segments {
        [] => false,
        [last] => match (last, node) {
            (KeySegment::Key(key), Value::Object(map)) => map.remove(key).is_some(),
            (KeySegment::Index(index), Value::Object(map)) => {
                map.remove(index.to_string().as_str()).is_some()
            }
            (KeySegment::Index(index), Value::Array(items)) => {
                if *index < items.len() && !items[*index].is_null() {
                    items[*index] = Value::Null;
                    true
                } else {
                    false
                }
            }
            _ => false,
        },
        [head, rest @ ..] => match (head, node) {
            (KeySegment::Key(key), Value::Object(map)) => map
                .get_mut(key)
                .map_or(false, |child| unset_in(rest, child)),
            (KeySegment::Index(index), Value::Object(map)) => map
                .get_mut(index.to_string().as_str())
                .map_or(false, |child| unset_in(rest, child)),
            (KeySegment::Index(index), Value::Array(items)) => items
                .get_mut(*index)
                .map_or(false, |child| unset_in(rest, child)),
            _ => false,
        },
    }
}

impl FromStr for KeyPath {
    type Err = TypeError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TypeError::InvalidKeyPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if path.is_empty() {
            return Err(invalid("path is empty"));
        }

        let mut segments = Vec::new();
        let bytes = path.as_bytes();
        let mut i = 0;
        // `true` when the next thing must open a new segment.
        let mut expect_segment = true;

        while i < path.len() {
            match bytes[i] {
                b'.' => {
                    if expect_segment {
                        return Err(invalid("empty segment"));
                    }
                    expect_segment = true;
                    i += 1;
                }
                b'[' => {
                    // A bracket continues the previous segment; it may not
                    // follow a `.` (though it may open the path).
                    if expect_segment && i > 0 {
                        return Err(invalid("unexpected `[` after `.`"));
                    }
                    let close = path[i..]
                        .find(']')
                        .map(|offset| i + offset)
                        .ok_or_else(|| invalid("unterminated `[`"))?;
                    let digits = &path[i + 1..close];
                    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(invalid("bracket segment must be a decimal index"));
                    }
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| invalid("index out of range"))?;
                    segments.push(KeySegment::Index(index));
                    expect_segment = false;
                    i = close + 1;
                }
                _ => {
                    if !expect_segment {
                        return Err(invalid("expected `.` or `[` after `]`"));
                    }
                    let end = path[i..]
                        .find(|c| c == '.' || c == '[')
                        .map(|offset| i + offset)
                        .unwrap_or(path.len());
                    let word = &path[i..end];
                    if !word.is_empty() && word.bytes().all(|b| b.is_ascii_digit()) {
                        let index = word
                            .parse::<usize>()
                            .map_err(|_| invalid("index out of range"))?;
                        segments.push(KeySegment::Index(index));
                    } else {
                        segments.push(KeySegment::Key(word.to_string()));
                    }
                    expect_segment = false;
                    i = end;
                }
            }
        }

        if expect_segment {
            return Err(invalid("trailing `.`"));
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }
}

impl PartialEq for KeyPath {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for KeyPath {}

impl fmt::Debug for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPath({})", self.raw)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for KeyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for KeyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
