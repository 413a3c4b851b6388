//! Core schema-driven codec module.
//!
//! A structure resource (XML) describes a binary layout field by field; the
//! decoder turns bytes into a [`TypedStore`] and the encoder turns a store
//! back into bytes. Collaborators supply the structure resource and the
//! domain mapping on top of the store; the codec knows nothing about what
//! the fields mean.

pub mod checksum;
pub mod cursor;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod schema;
pub mod store;
mod halffloat;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::info;

pub use checksum::compute_checksum;
pub use cursor::ByteCursor;
pub use error::{CodecError, Result};
pub use schema::{Endianness, Field, FieldKind, SchemaCache, Structure};
pub use store::{PathKey, Segment, TypedStore, Value};

/// Codec front door owning the structure-resource cache.
///
/// Decode and encode calls are synchronous and run to completion; the only
/// state shared between calls is the read-only schema cache, so one `Codec`
/// can serve concurrent lookups as long as each unit of work uses its own
/// store and cursor.
pub struct Codec {
    schemas: SchemaCache,
}

impl Codec {
    pub fn new() -> Self {
        Self {
            schemas: SchemaCache::new(),
        }
    }

    /// Load (or fetch from cache) the structure description for a resource.
    pub fn structure(&self, resource: impl AsRef<Path>) -> Result<Arc<Structure>> {
        self.schemas.load(resource)
    }

    /// Decode a byte buffer against a structure resource.
    pub fn decode(&self, resource: impl AsRef<Path>, data: &[u8]) -> Result<TypedStore> {
        self.decode_with_counts(resource, data, &HashMap::new())
    }

    /// Decode with explicit repeat-count overrides keyed by repeater name.
    pub fn decode_with_counts(
        &self,
        resource: impl AsRef<Path>,
        data: &[u8],
        counts: &HashMap<String, usize>,
    ) -> Result<TypedStore> {
        let structure = self.schemas.load(resource)?;
        let mut cursor = ByteCursor::new(data);
        let store = decoder::decode_with_counts(&structure, &mut cursor, counts)?;
        info!(
            "Decoded '{}': {} store entries from {} bytes",
            structure.name,
            store.len(),
            data.len()
        );
        Ok(store)
    }

    /// Encode a filled store against a structure resource.
    pub fn encode(&self, resource: impl AsRef<Path>, store: &TypedStore) -> Result<Vec<u8>> {
        let structure = self.schemas.load(resource)?;
        let bytes = encoder::encode(&structure, store)?;
        info!(
            "Encoded '{}': {} bytes from {} store entries",
            structure.name,
            bytes.len(),
            store.len()
        );
        Ok(bytes)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}
