//! Structure Model: declarative binary-layout descriptions and their cache.
//!
//! A structure resource is an XML document naming an ordered field list.
//! Field order is the only source of byte layout; reordering fields between
//! decode and encode breaks the round-trip contract.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::error::{CodecError, Result};

/// Byte order applied to every multi-byte field in a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// The closed set of field kinds a structure may declare.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Fixed-length character data, NUL-padded on disk.
    FixedText { size: usize },
    /// Fixed-width integer, 1 to 8 bytes.
    Integer { size: usize, signed: bool },
    /// IEEE-754 value; size 2 (half precision), 4 or 8.
    Float { size: usize },
    /// Bytes skipped on read and emitted as `fill` padding on write.
    /// Never stored.
    Delimiter { size: usize, fill: u8 },
    /// Uninterpreted bytes kept verbatim.
    Raw { size: usize },
    /// Variable-count group of subfields. The count is not part of the
    /// field itself; see the decoder for how it is resolved.
    Repeater { fields: Vec<Field> },
}

impl FieldKind {
    /// Short tag used in error messages.
    pub fn tag(&self) -> &'static str {
        match self {
            FieldKind::FixedText { .. } => "text",
            FieldKind::Integer { signed: true, .. } => "int",
            FieldKind::Integer { signed: false, .. } => "uint",
            FieldKind::Float { .. } => "float",
            FieldKind::Delimiter { .. } => "padding",
            FieldKind::Raw { .. } => "raw",
            FieldKind::Repeater { .. } => "repeater",
        }
    }
}

/// A single named field within a structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

/// An immutable, ordered description of one binary layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub name: String,
    pub byte_order: Endianness,
    pub fields: Vec<Field>,
}

impl Structure {
    /// Load a structure resource from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let resource = path.display().to_string();
        let xml = fs::read_to_string(path).map_err(|e| CodecError::SchemaLoad {
            resource: resource.clone(),
            reason: e.to_string(),
        })?;
        Self::parse(&resource, &xml)
    }

    /// Parse a structure resource from XML text.
    ///
    /// `resource` is only used to label errors.
    pub fn parse(resource: &str, xml: &str) -> Result<Self> {
        let fail = |reason: String| CodecError::SchemaLoad {
            resource: resource.to_string(),
            reason,
        };

        let mut reader = Reader::from_str(xml);
        let mut name = None;
        let mut byte_order = None;
        // Innermost field list last; index 0 is the structure's own list.
        let mut stack: Vec<(String, Vec<Field>)> = Vec::new();
        let mut done = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"structure" => {
                        let attrs = read_attributes(resource, &e)?;
                        name = attrs.get("name").cloned();
                        byte_order = Some(parse_byte_order(resource, &attrs)?);
                        stack.push((String::new(), Vec::new()));
                    }
                    b"repeater" => {
                        let attrs = read_attributes(resource, &e)?;
                        let repeater_name = attrs
                            .get("name")
                            .cloned()
                            .ok_or_else(|| fail("repeater without a name".to_string()))?;
                        stack.push((repeater_name, Vec::new()));
                    }
                    b"field" => {
                        let field = parse_field(resource, &e)?;
                        let top = stack
                            .last_mut()
                            .ok_or_else(|| fail("field outside <structure>".to_string()))?;
                        push_unique(resource, &mut top.1, field)?;
                    }
                    other => {
                        return Err(fail(format!(
                            "unexpected element <{}>",
                            String::from_utf8_lossy(other)
                        )));
                    }
                },
                Ok(Event::Empty(e)) => match e.name().as_ref() {
                    b"field" => {
                        let field = parse_field(resource, &e)?;
                        let top = stack
                            .last_mut()
                            .ok_or_else(|| fail("field outside <structure>".to_string()))?;
                        push_unique(resource, &mut top.1, field)?;
                    }
                    other => {
                        return Err(fail(format!(
                            "unexpected empty element <{}>",
                            String::from_utf8_lossy(other)
                        )));
                    }
                },
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"repeater" => {
                        let (repeater_name, fields) = stack
                            .pop()
                            .ok_or_else(|| fail("unbalanced </repeater>".to_string()))?;
                        let top = stack
                            .last_mut()
                            .ok_or_else(|| fail("repeater outside <structure>".to_string()))?;
                        push_unique(
                            resource,
                            &mut top.1,
                            Field {
                                name: repeater_name,
                                kind: FieldKind::Repeater { fields },
                            },
                        )?;
                    }
                    b"structure" => {
                        done = true;
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(fail(format!("XML parse error: {}", e))),
            }
        }

        if !done || stack.len() != 1 {
            return Err(fail("missing or unbalanced <structure> element".to_string()));
        }
        let name = name.ok_or_else(|| fail("structure without a name".to_string()))?;
        let byte_order =
            byte_order.ok_or_else(|| fail("structure without a byteorder".to_string()))?;
        let fields = stack.pop().map(|(_, f)| f).unwrap_or_default();
        if fields.is_empty() {
            return Err(fail("structure has no fields".to_string()));
        }

        debug!(
            "Parsed structure '{}' ({} top-level fields, {:?} endian)",
            name,
            fields.len(),
            byte_order
        );

        Ok(Structure {
            name,
            byte_order,
            fields,
        })
    }
}

/// Append a field to a field list, rejecting duplicate names.
///
/// Names are unique within their enclosing field list; a duplicate would
/// collapse two fields onto one store key and break the round-trip
/// guarantee. Nameless padding fields may repeat.
fn push_unique(resource: &str, list: &mut Vec<Field>, field: Field) -> Result<()> {
    if !field.name.is_empty() && list.iter().any(|f| f.name == field.name) {
        return Err(CodecError::SchemaLoad {
            resource: resource.to_string(),
            reason: format!("duplicate field name '{}'", field.name),
        });
    }
    list.push(field);
    Ok(())
}

/// Collect an element's attributes into a name → value map.
fn read_attributes(resource: &str, element: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    element
        .attributes()
        .map(|attr_result| {
            let attr = attr_result.map_err(|e| CodecError::SchemaLoad {
                resource: resource.to_string(),
                reason: format!("failed to parse XML attribute: {}", e),
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| CodecError::SchemaLoad {
                    resource: resource.to_string(),
                    reason: format!("failed to decode XML attribute value: {}", e),
                })?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}

fn parse_byte_order(resource: &str, attrs: &HashMap<String, String>) -> Result<Endianness> {
    match attrs.get("byteorder").map(String::as_str) {
        Some("little") => Ok(Endianness::Little),
        Some("big") => Ok(Endianness::Big),
        Some(other) => Err(CodecError::SchemaLoad {
            resource: resource.to_string(),
            reason: format!("unknown byteorder '{}' (expected little or big)", other),
        }),
        None => Err(CodecError::SchemaLoad {
            resource: resource.to_string(),
            reason: "structure without a byteorder".to_string(),
        }),
    }
}

/// Build a `Field` from a `<field .../>` element, validating kind parameters.
fn parse_field(resource: &str, element: &BytesStart<'_>) -> Result<Field> {
    let attrs = read_attributes(resource, element)?;
    let fail = |reason: String| CodecError::SchemaLoad {
        resource: resource.to_string(),
        reason,
    };

    let kind_tag = attrs
        .get("kind")
        .ok_or_else(|| fail("field without a kind".to_string()))?;
    let name = attrs.get("name").cloned();

    let size = match attrs.get("size") {
        Some(s) => {
            let n: i64 = s
                .parse()
                .map_err(|_| fail(format!("invalid size '{}' for field", s)))?;
            if n <= 0 {
                return Err(fail(format!(
                    "non-positive size {} for field '{}'",
                    n,
                    name.as_deref().unwrap_or("?")
                )));
            }
            Some(n as usize)
        }
        None => None,
    };
    let require_size = |kind: &str| {
        size.ok_or_else(|| {
            fail(format!(
                "{} field '{}' is missing a size",
                kind,
                name.as_deref().unwrap_or("?")
            ))
        })
    };

    let kind = match kind_tag.as_str() {
        "text" => FieldKind::FixedText {
            size: require_size("text")?,
        },
        "int" => {
            let size = require_size("int")?;
            if size > 8 {
                return Err(fail(format!("int field wider than 8 bytes ({})", size)));
            }
            FieldKind::Integer { size, signed: true }
        }
        "uint" => {
            let size = require_size("uint")?;
            if size > 8 {
                return Err(fail(format!("uint field wider than 8 bytes ({})", size)));
            }
            FieldKind::Integer {
                size,
                signed: false,
            }
        }
        "float" => {
            let size = require_size("float")?;
            if size != 2 && size != 4 && size != 8 {
                return Err(fail(format!(
                    "float field must be 2, 4 or 8 bytes, got {}",
                    size
                )));
            }
            FieldKind::Float { size }
        }
        "raw" => FieldKind::Raw {
            size: require_size("raw")?,
        },
        "padding" => {
            let fill = match attrs.get("fill") {
                Some(s) => parse_fill(resource, s)?,
                None => 0,
            };
            FieldKind::Delimiter {
                size: require_size("padding")?,
                fill,
            }
        }
        other => {
            return Err(fail(format!("unknown field kind '{}'", other)));
        }
    };

    // Padding is never stored, so its name is optional.
    let name = match (name, &kind) {
        (Some(n), _) => n,
        (None, FieldKind::Delimiter { .. }) => String::new(),
        (None, _) => return Err(fail(format!("{} field without a name", kind_tag))),
    };

    Ok(Field { name, kind })
}

fn parse_fill(resource: &str, text: &str) -> Result<u8> {
    let parsed = if let Some(hex) = text.strip_prefix("0x") {
        u8::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|_| CodecError::SchemaLoad {
        resource: resource.to_string(),
        reason: format!("invalid fill byte '{}'", text),
    })
}

/// Process-lifetime cache of loaded structure resources.
///
/// Entries are immutable once loaded and the map is populate-once-per-key:
/// a race to load the same resource converges on equivalent values.
pub struct SchemaCache {
    entries: RwLock<HashMap<PathBuf, Arc<Structure>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Load a structure resource, reusing the cached copy when present.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Arc<Structure>> {
        let path = path.as_ref();
        {
            let guard = self.entries.read().map_err(|_| CodecError::LockPoisoned)?;
            if let Some(structure) = guard.get(path) {
                return Ok(Arc::clone(structure));
            }
        }

        let structure = Arc::new(Structure::load(path)?);
        let mut guard = self.entries.write().map_err(|_| CodecError::LockPoisoned)?;
        // First writer wins; a concurrent loader parsed the same bytes.
        Ok(Arc::clone(
            guard.entry(path.to_path_buf()).or_insert(structure),
        ))
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}
