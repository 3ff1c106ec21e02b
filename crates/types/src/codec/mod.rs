//! Codecs move [`CqlValue`]s between three forms: the in-memory value, the
//! protocol-v4 wire encoding, and the CQL literal text used when a statement
//! inlines its values.
//!
//! Primitive codecs are self-contained; collection, tuple, and user-defined
//! type codecs are composed from element codecs by the [`CodecRegistry`],
//! which caches every composition it builds.

mod collection;
mod literal;
mod primitive;
mod wrappers;

pub use collection::{ListCodec, MapCodec, SetCodec, TupleCodec, UdtCodec};
pub use primitive::PrimitiveCodec;
pub use wrappers::{MandatoryCodec, PersisterCodec};

use crate::{CqlType, CqlValue};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("value of kind `{found}` does not fit CQL type `{expected}`")]
    Mismatch { expected: CqlType, found: &'static str },
    #[error("malformed bytes for `{ty}`: {reason}")]
    Malformed { ty: CqlType, reason: String },
    #[error("cannot parse `{text}` as `{ty}`")]
    Unparsable { ty: CqlType, text: String },
    #[error("no codec is available for CQL type `{0}`")]
    Unavailable(CqlType),
    #[error("user type `{udt}` has no field `{field}`")]
    UnknownUdtField { udt: String, field: String },
    #[error("`{0}` cannot be rendered as a CQL literal")]
    Unformattable(&'static str),
    #[error("persisted blob failed to {op}: {reason}")]
    Persister { op: &'static str, reason: String },
}

/// Two-way bridge between a [`CqlValue`] and one CQL column type.
///
/// `encode` returns `None` for an absent value; `decode` accepts `None` for
/// the same reason. `format` and `parse` work on CQL literal text.
pub trait Codec: Send + Sync + fmt::Debug {
    fn cql_type(&self) -> &CqlType;

    fn encode(&self, value: &CqlValue) -> Result<Option<Bytes>, CodecError>;

    fn decode(&self, bytes: Option<&[u8]>) -> Result<CqlValue, CodecError>;

    fn format(&self, value: &CqlValue) -> Result<String, CodecError>;

    fn parse(&self, text: &str) -> Result<CqlValue, CodecError>;
}

/// Builds and caches codecs per [`CqlType`].
///
/// The cache is insert-only; a composed codec is shared by every column that
/// declares the same type.
#[derive(Debug, Default)]
pub struct CodecRegistry {
    cache: RwLock<HashMap<CqlType, Arc<dyn Codec>>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn codec_for(&self, ty: &CqlType) -> Result<Arc<dyn Codec>, CodecError> {
        if let Some(codec) = self.cache.read().get(ty) {
            return Ok(codec.clone());
        }
        let codec: Arc<dyn Codec> = match ty {
            CqlType::Frozen(inner) => return self.codec_for(inner),
            CqlType::List(elem) => Arc::new(ListCodec::new(ty.clone(), self.codec_for(elem)?)),
            CqlType::Set(elem) => Arc::new(SetCodec::new(ty.clone(), self.codec_for(elem)?)),
            CqlType::Map(k, v) | CqlType::SortedMap(k, v) => {
                Arc::new(MapCodec::new(ty.clone(), self.codec_for(k)?, self.codec_for(v)?))
            }
            CqlType::Tuple(elems) => {
                let codecs = elems.iter().map(|e| self.codec_for(e)).collect::<Result<Vec<_>, _>>()?;
                Arc::new(TupleCodec::new(ty.clone(), codecs))
            }
            CqlType::Udt(def) => {
                let fields = def
                    .fields
                    .iter()
                    .map(|(name, fty)| Ok((name.clone(), self.codec_for(fty)?)))
                    .collect::<Result<Vec<_>, CodecError>>()?;
                Arc::new(UdtCodec::new(ty.clone(), def.clone(), fields))
            }
            primitive => Arc::new(PrimitiveCodec::new(primitive.clone())?),
        };
        self.cache.write().entry(ty.clone()).or_insert(codec.clone());
        Ok(codec)
    }

    /// A codec that treats null and the empty collection as the same value.
    pub fn mandatory(&self, ty: &CqlType) -> Result<Arc<dyn Codec>, CodecError> {
        Ok(Arc::new(MandatoryCodec::new(self.codec_for(ty)?)?))
    }

    /// A codec that deflates the inner encoding into a blob column.
    pub fn persister(&self, ty: &CqlType) -> Result<Arc<dyn Codec>, CodecError> {
        Ok(Arc::new(PersisterCodec::new(self.codec_for(ty)?)))
    }
}
