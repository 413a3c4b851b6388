//! # racebin
//!
//! Schema-driven reader/writer for the proprietary binary data files of
//! Synetic racing games (bank maps, camera sets, save-game blocks, world
//! spots).
//!
//! Binary layouts are described declaratively in XML structure resources
//! instead of one hand-written parser per format: the generic decoder walks
//! a [`Structure`] and fills a [`TypedStore`], and the generic encoder turns
//! a store back into bytes. Decoding a file and re-encoding the unmodified
//! store reproduces the input byte for byte.
pub mod codec;

// Re-export the main types for convenience
pub use codec::{
    compute_checksum, ByteCursor, Codec, CodecError, Endianness, Field, FieldKind, PathKey,
    Result, SchemaCache, Segment, Structure, TypedStore, Value,
};
