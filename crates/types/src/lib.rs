//! Data types, runtime values, and wire codecs for the tessera object mapper.
//!
//! This crate is the bottom layer of the workspace. It knows nothing about
//! records, tables, or statements; it answers two questions:
//!
//! - what CQL types exist and how they relate ([`CqlType`]), and
//! - how a runtime value ([`CqlValue`]) moves between its in-memory form,
//!   its wire form, and its CQL literal form ([`codec::Codec`]).
//!
//! Codecs for collections, tuples, and user-defined types are composed from
//! element codecs by the [`codec::CodecRegistry`]. Two wrappers adjust codec
//! behavior without changing the wire format: [`codec::MandatoryCodec`]
//! rewrites null to the empty collection, and [`codec::PersisterCodec`]
//! deflates an encoded value into a blob.

pub mod codec;
mod data_type;
mod row;
mod value;

pub use data_type::{CqlType, UdtDef};
pub use row::{RowError, RowValues};
pub use value::CqlValue;
