//! Typed Store: the ordered key → typed-value mapping bridging decode and
//! encode.
//!
//! Keys are structured paths rather than formatted strings, so repeater
//! indices never have to be reparsed out of bracket notation.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// One path segment: a plain field name, or a field name with a zero-based
/// repetition index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Name(String),
    Indexed(String, usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Name(name) => write!(f, "{}", name),
            Segment::Indexed(name, index) => write!(f, "{}[{}]", name, index),
        }
    }
}

/// A structured store key, e.g. `entries[3].file_name_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PathKey(Vec<Segment>);

impl PathKey {
    /// The empty path, extended with [`child`](Self::child) and
    /// [`item`](Self::item).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// A single-segment path.
    pub fn name(name: impl Into<String>) -> Self {
        Self(vec![Segment::Name(name.into())])
    }

    /// Append a plain field-name segment.
    pub fn child(mut self, name: impl Into<String>) -> Self {
        self.0.push(Segment::Name(name.into()));
        self
    }

    /// Append an indexed repeater segment.
    pub fn item(mut self, name: impl Into<String>, index: usize) -> Self {
        self.0.push(Segment::Indexed(name.into(), index));
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &PathKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// A decoded value, tagged by the field kind that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Verbatim bytes from a `raw` field.
    Bytes(Vec<u8>),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating-point value (half and single widths are widened to f64).
    Float(f64),
    /// Fixed-width text with trailing NUL padding trimmed.
    Text(String),
}

impl Value {
    /// Kind tag used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bytes(_) => "raw",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }

    /// The integer payload of an `Int` or `UInt` value, widened to i64.
    ///
    /// Used for repeat-count resolution, where either flavor may supply the
    /// count.
    pub fn as_count(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bytes(bytes) => {
                write!(f, "[")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                write!(f, "]")
            }
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{:?}", v),
        }
    }
}

/// Ordered mapping from path keys to typed values.
///
/// Keys are unique; insertion order is preserved. Output byte order is
/// dictated by the Structure Description, never by insertion order, so a
/// store filled out of order still encodes deterministically.
#[derive(Debug, Clone, Default)]
pub struct TypedStore {
    entries: Vec<(PathKey, Value)>,
    index: HashMap<PathKey, usize>,
}

impl TypedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a value. Replaces in place if the key already exists.
    pub fn insert(&mut self, key: PathKey, value: Value) {
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &PathKey) -> Option<&Value> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn get_mut(&mut self, key: &PathKey) -> Option<&mut Value> {
        let pos = *self.index.get(key)?;
        Some(&mut self.entries[pos].1)
    }

    pub fn contains(&self, key: &PathKey) -> bool {
        self.index.contains_key(key)
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&PathKey, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// The distinct repetition indices present under `prefix.repeater[..]`,
    /// in ascending order.
    ///
    /// This is how the encoder determines a repeater's count.
    pub fn indices_under(&self, prefix: &PathKey, repeater: &str) -> BTreeSet<usize> {
        let depth = prefix.segments().len();
        let mut indices = BTreeSet::new();
        for (key, _) in &self.entries {
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(Segment::Indexed(name, index)) = key.segments().get(depth) {
                if name.as_str() == repeater {
                    indices.insert(*index);
                }
            }
        }
        indices
    }

    /// Copy one repetition's sub-entries from `source` into this store under
    /// a different index.
    ///
    /// Every `source` entry whose path contains `repeater[source_index]` is
    /// deep-copied with that segment rewritten to `repeater[target_index]`.
    /// Used to duplicate repeated groups; the copies are independent.
    /// Returns the number of entries copied.
    pub fn merge_repetition(
        &mut self,
        source: &TypedStore,
        repeater: &str,
        source_index: usize,
        target_index: usize,
    ) -> usize {
        let mut copied = 0;
        for (key, value) in &source.entries {
            let mut segments = key.segments().to_vec();
            let mut matched = false;
            for segment in &mut segments {
                if let Segment::Indexed(name, index) = segment {
                    if name.as_str() == repeater && *index == source_index {
                        *index = target_index;
                        matched = true;
                    }
                }
            }
            if matched {
                self.insert(PathKey(segments), value.clone());
                copied += 1;
            }
        }
        copied
    }
}

impl fmt::Display for TypedStore {
    /// Human-readable dump, one `path = value` line per entry.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{} = {}", key, value)?;
        }
        Ok(())
    }
}
