use super::{Codec, CodecError};
use crate::{CqlType, CqlValue};
use bytes::Bytes;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::sync::Arc;

/// Treats absence and the empty collection as the same value.
///
/// Wide-column stores drop a collection column entirely once its last
/// element is removed; a mandatory column reads that back as the empty
/// collection instead of null, and writes the empty collection rather than
/// deleting the column.
#[derive(Debug)]
pub struct MandatoryCodec {
    inner: Arc<dyn Codec>,
}

impl MandatoryCodec {
    pub(crate) fn new(inner: Arc<dyn Codec>) -> Result<Self, CodecError> {
        if !inner.cql_type().is_collection() {
            return Err(CodecError::Unavailable(inner.cql_type().clone()));
        }
        Ok(Self { inner })
    }

    fn empty(&self) -> CqlValue {
        CqlValue::empty_of(self.inner.cql_type())
    }
}

impl Codec for MandatoryCodec {
    fn cql_type(&self) -> &CqlType {
        self.inner.cql_type()
    }

    fn encode(&self, value: &CqlValue) -> Result<Option<Bytes>, CodecError> {
        if value.is_null() {
            return self.inner.encode(&self.empty());
        }
        self.inner.encode(value)
    }

    fn decode(&self, bytes: Option<&[u8]>) -> Result<CqlValue, CodecError> {
        let value = self.inner.decode(bytes)?;
        if value.is_null() {
            return Ok(self.empty());
        }
        Ok(value)
    }

    fn format(&self, value: &CqlValue) -> Result<String, CodecError> {
        if value.is_null() {
            return self.inner.format(&self.empty());
        }
        self.inner.format(value)
    }

    fn parse(&self, text: &str) -> Result<CqlValue, CodecError> {
        let value = self.inner.parse(text)?;
        if value.is_null() {
            return Ok(self.empty());
        }
        Ok(value)
    }
}

/// Deflates the inner codec's encoding into a `blob` column.
///
/// The column's declared type becomes `blob`; the inner codec still defines
/// what the value looks like in memory.
#[derive(Debug)]
pub struct PersisterCodec {
    inner: Arc<dyn Codec>,
    blob: CqlType,
}

impl PersisterCodec {
    pub(crate) fn new(inner: Arc<dyn Codec>) -> Self {
        Self {
            inner,
            blob: CqlType::Blob,
        }
    }

    fn compress(&self, input: &[u8]) -> Result<Bytes, CodecError> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(input).map_err(|e| CodecError::Persister {
            op: "compress",
            reason: e.to_string(),
        })?;
        let out = encoder.finish().map_err(|e| CodecError::Persister {
            op: "compress",
            reason: e.to_string(),
        })?;
        Ok(out.into())
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        DeflateDecoder::new(input)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Persister {
                op: "decompress",
                reason: e.to_string(),
            })?;
        Ok(out)
    }
}

impl Codec for PersisterCodec {
    fn cql_type(&self) -> &CqlType {
        &self.blob
    }

    fn encode(&self, value: &CqlValue) -> Result<Option<Bytes>, CodecError> {
        match self.inner.encode(value)? {
            None => Ok(None),
            Some(plain) => Ok(Some(self.compress(&plain)?)),
        }
    }

    fn decode(&self, bytes: Option<&[u8]>) -> Result<CqlValue, CodecError> {
        match bytes {
            None => self.inner.decode(None),
            Some(compressed) => {
                let plain = self.decompress(compressed)?;
                self.inner.decode(Some(&plain))
            }
        }
    }

    fn format(&self, value: &CqlValue) -> Result<String, CodecError> {
        match self.encode(value)? {
            None => Ok("null".to_owned()),
            Some(blob) => Ok(format!("0x{}", hex::encode(&blob))),
        }
    }

    fn parse(&self, text: &str) -> Result<CqlValue, CodecError> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("null") {
            return self.inner.decode(None);
        }
        let hex_part = text.strip_prefix("0x").ok_or_else(|| CodecError::Unparsable {
            ty: CqlType::Blob,
            text: text.to_owned(),
        })?;
        let compressed = hex::decode(hex_part).map_err(|_| CodecError::Unparsable {
            ty: CqlType::Blob,
            text: text.to_owned(),
        })?;
        self.decode(Some(&compressed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecRegistry;
    use pretty_assertions::assert_eq;

    #[test]
    fn mandatory_rewrites_null_both_ways() {
        let registry = CodecRegistry::new();
        let codec = registry.mandatory(&CqlType::set(CqlType::Text)).unwrap();

        // Encoding null produces the empty set, not an absent cell.
        let bytes = codec.encode(&CqlValue::Null).unwrap();
        assert!(bytes.is_some());

        // Decoding an absent cell produces the empty set.
        assert_eq!(codec.decode(None).unwrap(), CqlValue::Set(vec![]));
        assert_eq!(codec.format(&CqlValue::Null).unwrap(), "{}");
    }

    #[test]
    fn mandatory_rejects_scalars() {
        let registry = CodecRegistry::new();
        assert!(registry.mandatory(&CqlType::Int).is_err());
    }

    #[test]
    fn persister_round_trips_through_a_blob() {
        let registry = CodecRegistry::new();
        let codec = registry.persister(&CqlType::Text).unwrap();
        assert_eq!(codec.cql_type(), &CqlType::Blob);

        let value = CqlValue::Text("a ".repeat(512));
        let compressed = codec.encode(&value).unwrap().unwrap();
        // Deflate should beat the 1 KiB of repeated input comfortably.
        assert!(compressed.len() < 256);
        assert_eq!(codec.decode(Some(&compressed)).unwrap(), value);

        let literal = codec.format(&value).unwrap();
        assert!(literal.starts_with("0x"));
        assert_eq!(codec.parse(&literal).unwrap(), value);
    }
}
