//! Generic decoder: walks a structure description and populates a typed
//! store from a byte cursor.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use encoding_rs::WINDOWS_1252;
use log::{debug, trace};

use super::cursor::ByteCursor;
use super::error::{CodecError, Result};
use super::halffloat;
use super::schema::{Endianness, Field, FieldKind, Structure};
use super::store::{PathKey, TypedStore, Value};

/// Decode a buffer against a structure description.
///
/// Repeat counts are resolved from the most recent integer field decoded at
/// the same nesting level (by convention the field immediately preceding
/// the repeater).
pub fn decode(structure: &Structure, cursor: &mut ByteCursor<'_>) -> Result<TypedStore> {
    decode_with_counts(structure, cursor, &HashMap::new())
}

/// Decode with explicit repeat-count overrides, keyed by repeater name.
///
/// Needed for formats that carry no count field, where the caller derives
/// the count from the file size instead.
pub fn decode_with_counts(
    structure: &Structure,
    cursor: &mut ByteCursor<'_>,
    counts: &HashMap<String, usize>,
) -> Result<TypedStore> {
    debug!(
        "Decoding '{}' from {} bytes at offset {}",
        structure.name,
        cursor.len(),
        cursor.position()
    );

    let mut store = TypedStore::new();
    walk(
        &structure.fields,
        structure.byte_order,
        cursor,
        &mut store,
        &PathKey::root(),
        counts,
    )?;

    debug!(
        "Decoded '{}': {} store entries, cursor at offset {}",
        structure.name,
        store.len(),
        cursor.position()
    );
    Ok(store)
}

fn walk(
    fields: &[Field],
    order: Endianness,
    cursor: &mut ByteCursor<'_>,
    store: &mut TypedStore,
    prefix: &PathKey,
    counts: &HashMap<String, usize>,
) -> Result<()> {
    // Most recent integer decoded at this level; non-integer fields do not
    // reset it.
    let mut preceding_count: Option<i64> = None;

    for field in fields {
        match &field.kind {
            FieldKind::Delimiter { size, .. } => {
                trace!("skip {} delimiter bytes at offset {}", size, cursor.position());
                cursor.skip(*size)?;
            }
            FieldKind::Repeater { fields: subfields } => {
                let count = resolve_count(&field.name, counts, preceding_count)?;
                trace!(
                    "repeater '{}' x{} at offset {}",
                    field.name,
                    count,
                    cursor.position()
                );
                for index in 0..count {
                    let scoped = prefix.clone().item(field.name.as_str(), index);
                    walk(subfields, order, cursor, store, &scoped, counts)?;
                }
            }
            kind => {
                let offset = cursor.position();
                let value = read_scalar(kind, order, cursor)?;
                let key = prefix.clone().child(field.name.as_str());
                trace!("{} = {} (offset {})", key, value, offset);
                if let Value::Int(_) | Value::UInt(_) = value {
                    preceding_count = value.as_count();
                }
                store.insert(key, value);
            }
        }
    }
    Ok(())
}

fn resolve_count(
    repeater: &str,
    counts: &HashMap<String, usize>,
    preceding: Option<i64>,
) -> Result<usize> {
    if let Some(&count) = counts.get(repeater) {
        return Ok(count);
    }
    match preceding {
        Some(count) if count >= 0 => Ok(count as usize),
        Some(count) => Err(CodecError::InvalidRepeatCount {
            repeater: repeater.to_string(),
            reason: format!("preceding count field is negative ({})", count),
        }),
        None => Err(CodecError::InvalidRepeatCount {
            repeater: repeater.to_string(),
            reason: "no explicit count and no preceding integer field".to_string(),
        }),
    }
}

/// Read one scalar field and interpret it per kind and byte order.
fn read_scalar(
    kind: &FieldKind,
    order: Endianness,
    cursor: &mut ByteCursor<'_>,
) -> Result<Value> {
    let value = match kind {
        FieldKind::FixedText { size } => {
            let bytes = cursor.read(*size)?;
            let trimmed = trim_trailing_nul(bytes);
            let (text, _, _) = WINDOWS_1252.decode(trimmed);
            Value::Text(text.into_owned())
        }
        FieldKind::Integer { size, signed } => {
            let bytes = cursor.read(*size)?;
            if *signed {
                Value::Int(read_int(order, bytes))
            } else {
                Value::UInt(read_uint(order, bytes))
            }
        }
        FieldKind::Float { size } => {
            let bytes = cursor.read(*size)?;
            let value = match *size {
                2 => halffloat::f16_to_f64(read_uint(order, bytes) as u16),
                4 => match order {
                    Endianness::Little => LittleEndian::read_f32(bytes) as f64,
                    Endianness::Big => BigEndian::read_f32(bytes) as f64,
                },
                _ => match order {
                    Endianness::Little => LittleEndian::read_f64(bytes),
                    Endianness::Big => BigEndian::read_f64(bytes),
                },
            };
            Value::Float(value)
        }
        FieldKind::Raw { size } => Value::Bytes(cursor.read(*size)?.to_vec()),
        // Delimiter and Repeater are handled by the walk itself.
        FieldKind::Delimiter { .. } | FieldKind::Repeater { .. } => unreachable!(),
    };
    Ok(value)
}

fn read_uint(order: Endianness, bytes: &[u8]) -> u64 {
    match order {
        Endianness::Little => LittleEndian::read_uint(bytes, bytes.len()),
        Endianness::Big => BigEndian::read_uint(bytes, bytes.len()),
    }
}

fn read_int(order: Endianness, bytes: &[u8]) -> i64 {
    match order {
        Endianness::Little => LittleEndian::read_int(bytes, bytes.len()),
        Endianness::Big => BigEndian::read_int(bytes, bytes.len()),
    }
}

/// Strip trailing NUL padding from a fixed-width text field.
fn trim_trailing_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map(|pos| pos + 1)
        .unwrap_or(0);
    &bytes[..end]
}
