//! Generic encoder: walks a structure description and emits bytes from a
//! filled typed store.
//!
//! Mirrors the decoder walk. For any buffer the decoder accepts, encoding
//! the resulting store without mutation reproduces the input byte for byte.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use encoding_rs::WINDOWS_1252;
use log::{debug, trace};

use super::error::{CodecError, Result};
use super::halffloat;
use super::schema::{Endianness, Field, FieldKind, Structure};
use super::store::{PathKey, TypedStore, Value};

/// Serialize a store against a structure description.
///
/// Repeater counts come from the distinct indices present in the store;
/// repetitions are emitted in ascending index order regardless of how the
/// store was filled.
pub fn encode(structure: &Structure, store: &TypedStore) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_fields(
        &structure.fields,
        structure.byte_order,
        store,
        &PathKey::root(),
        &mut out,
    )?;
    debug!(
        "Encoded '{}': {} bytes from {} store entries",
        structure.name,
        out.len(),
        store.len()
    );
    Ok(out)
}

fn write_fields(
    fields: &[Field],
    order: Endianness,
    store: &TypedStore,
    prefix: &PathKey,
    out: &mut Vec<u8>,
) -> Result<()> {
    for field in fields {
        match &field.kind {
            FieldKind::Delimiter { size, fill } => {
                // Padding is emitted from the schema, never from the store.
                out.resize(out.len() + *size, *fill);
            }
            FieldKind::Repeater { fields: subfields } => {
                let indices = store.indices_under(prefix, &field.name);
                trace!("repeater '{}' x{}", field.name, indices.len());
                for index in indices {
                    let scoped = prefix.clone().item(field.name.as_str(), index);
                    write_fields(subfields, order, store, &scoped, out)?;
                }
            }
            kind => {
                let key = prefix.clone().child(field.name.as_str());
                let value = store.get(&key).ok_or_else(|| CodecError::MissingStoreEntry {
                    path: key.to_string(),
                })?;
                write_scalar(kind, order, &key, value, out)?;
            }
        }
    }
    Ok(())
}

/// Serialize one scalar value to exactly the field's declared size.
fn write_scalar(
    kind: &FieldKind,
    order: Endianness,
    key: &PathKey,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<()> {
    let mismatch = || CodecError::ValueKindMismatch {
        path: key.to_string(),
        expected: kind.tag(),
        found: value.kind(),
    };

    match (kind, value) {
        (FieldKind::FixedText { size }, Value::Text(text)) => {
            let (bytes, _, had_errors) = WINDOWS_1252.encode(text);
            if had_errors {
                // The encoder substitutes numeric character references for
                // unmappable characters; never let that reach the file.
                return Err(CodecError::UnencodableText {
                    path: key.to_string(),
                });
            }
            if bytes.len() > *size {
                return Err(CodecError::ValueTooLarge {
                    path: key.to_string(),
                    size: *size,
                    reason: format!("text encodes to {} bytes", bytes.len()),
                });
            }
            out.extend_from_slice(&bytes);
            out.resize(out.len() + (*size - bytes.len()), 0);
        }
        (FieldKind::Integer { size, signed: true }, Value::Int(v)) => {
            if *size < 8 {
                let min = -(1i64 << (size * 8 - 1));
                let max = (1i64 << (size * 8 - 1)) - 1;
                if *v < min || *v > max {
                    return Err(CodecError::ValueTooLarge {
                        path: key.to_string(),
                        size: *size,
                        reason: format!("{} outside {}..={}", v, min, max),
                    });
                }
            }
            put_int(out, order, *size, *v);
        }
        (
            FieldKind::Integer {
                size,
                signed: false,
            },
            Value::UInt(v),
        ) => {
            if *size < 8 && *v >> (size * 8) != 0 {
                return Err(CodecError::ValueTooLarge {
                    path: key.to_string(),
                    size: *size,
                    reason: format!("{} exceeds {} bits", v, size * 8),
                });
            }
            put_uint(out, order, *size, *v);
        }
        (FieldKind::Float { size }, Value::Float(v)) => match *size {
            2 => put_uint(out, order, 2, halffloat::f64_to_f16(*v) as u64),
            4 => {
                let mut buf = [0u8; 4];
                match order {
                    Endianness::Little => LittleEndian::write_f32(&mut buf, *v as f32),
                    Endianness::Big => BigEndian::write_f32(&mut buf, *v as f32),
                }
                out.extend_from_slice(&buf);
            }
            _ => {
                let mut buf = [0u8; 8];
                match order {
                    Endianness::Little => LittleEndian::write_f64(&mut buf, *v),
                    Endianness::Big => BigEndian::write_f64(&mut buf, *v),
                }
                out.extend_from_slice(&buf);
            }
        },
        (FieldKind::Raw { size }, Value::Bytes(bytes)) => {
            if bytes.len() != *size {
                return Err(CodecError::ValueTooLarge {
                    path: key.to_string(),
                    size: *size,
                    reason: format!("raw value holds {} bytes", bytes.len()),
                });
            }
            out.extend_from_slice(bytes);
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

fn put_uint(out: &mut Vec<u8>, order: Endianness, size: usize, v: u64) {
    let mut buf = [0u8; 8];
    match order {
        Endianness::Little => LittleEndian::write_uint(&mut buf[..size], v, size),
        Endianness::Big => BigEndian::write_uint(&mut buf[..size], v, size),
    }
    out.extend_from_slice(&buf[..size]);
}

fn put_int(out: &mut Vec<u8>, order: Endianness, size: usize, v: i64) {
    let mut buf = [0u8; 8];
    match order {
        Endianness::Little => LittleEndian::write_int(&mut buf[..size], v, size),
        Endianness::Big => BigEndian::write_int(&mut buf[..size], v, size),
    }
    out.extend_from_slice(&buf[..size]);
}
