use super::literal::{split_top_level, unwrap_delimited};
use super::{Codec, CodecError};
use crate::data_type::UdtDef;
use crate::{CqlType, CqlValue};
use bytes::Bytes;
use itertools::Itertools;
use std::sync::Arc;

/// Appends `[len][bytes]`, using length -1 for an absent element.
fn write_element(buf: &mut Vec<u8>, element: Option<&[u8]>) {
    match element {
        Some(bytes) => {
            buf.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
            buf.extend_from_slice(bytes);
        }
        None => buf.extend_from_slice(&(-1i32).to_be_bytes()),
    }
}

fn read_i32(input: &mut &[u8], ty: &CqlType) -> Result<i32, CodecError> {
    if input.len() < 4 {
        return Err(CodecError::Malformed {
            ty: ty.clone(),
            reason: "truncated length prefix".into(),
        });
    }
    let (head, rest) = input.split_at(4);
    *input = rest;
    Ok(i32::from_be_bytes(head.try_into().unwrap()))
}

fn read_element<'a>(input: &mut &'a [u8], ty: &CqlType) -> Result<Option<&'a [u8]>, CodecError> {
    let len = read_i32(input, ty)?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    if input.len() < len {
        return Err(CodecError::Malformed {
            ty: ty.clone(),
            reason: format!("element claims {len} bytes, {} remain", input.len()),
        });
    }
    let (head, rest) = input.split_at(len);
    *input = rest;
    Ok(Some(head))
}

fn encode_counted(elems: &[CqlValue], elem_codec: &Arc<dyn Codec>) -> Result<Option<Bytes>, CodecError> {
    let mut buf = (elems.len() as i32).to_be_bytes().to_vec();
    for elem in elems {
        let encoded = elem_codec.encode(elem)?;
        write_element(&mut buf, encoded.as_deref());
    }
    Ok(Some(buf.into()))
}

fn decode_counted(ty: &CqlType, mut input: &[u8], elem_codec: &Arc<dyn Codec>) -> Result<Vec<CqlValue>, CodecError> {
    let n = read_i32(&mut input, ty)?;
    let mut out = Vec::with_capacity(n.max(0) as usize);
    for _ in 0..n {
        let elem = read_element(&mut input, ty)?;
        out.push(elem_codec.decode(elem)?);
    }
    Ok(out)
}

macro_rules! collection_codec {
    ($name:ident, $variant:ident, $open:literal, $close:literal) => {
        #[derive(Debug)]
        pub struct $name {
            ty: CqlType,
            elem: Arc<dyn Codec>,
        }

        impl $name {
            pub(crate) fn new(ty: CqlType, elem: Arc<dyn Codec>) -> Self {
                Self { ty, elem }
            }

            fn mismatch(&self, value: &CqlValue) -> CodecError {
                CodecError::Mismatch {
                    expected: self.ty.clone(),
                    found: value.kind(),
                }
            }
        }

        impl Codec for $name {
            fn cql_type(&self) -> &CqlType {
                &self.ty
            }

            fn encode(&self, value: &CqlValue) -> Result<Option<Bytes>, CodecError> {
                match value {
                    CqlValue::Null => Ok(None),
                    CqlValue::$variant(elems) => encode_counted(elems, &self.elem),
                    other => Err(self.mismatch(other)),
                }
            }

            fn decode(&self, bytes: Option<&[u8]>) -> Result<CqlValue, CodecError> {
                match bytes {
                    None => Ok(CqlValue::Null),
                    Some(input) => Ok(CqlValue::$variant(decode_counted(&self.ty, input, &self.elem)?)),
                }
            }

            fn format(&self, value: &CqlValue) -> Result<String, CodecError> {
                match value {
                    CqlValue::Null => Ok("null".to_owned()),
                    CqlValue::$variant(elems) => {
                        let body: Result<Vec<_>, _> = elems.iter().map(|e| self.elem.format(e)).collect();
                        Ok(format!("{}{}{}", $open, body?.iter().join(", "), $close))
                    }
                    other => Err(self.mismatch(other)),
                }
            }

            fn parse(&self, text: &str) -> Result<CqlValue, CodecError> {
                let text = text.trim();
                if text.eq_ignore_ascii_case("null") {
                    return Ok(CqlValue::Null);
                }
                let open = $open.chars().next().unwrap();
                let close = $close.chars().next().unwrap();
                let inner = unwrap_delimited(text, open, close).ok_or_else(|| CodecError::Unparsable {
                    ty: self.ty.clone(),
                    text: text.to_owned(),
                })?;
                let elems = split_top_level(inner, ',')
                    .into_iter()
                    .map(|part| self.elem.parse(part))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CqlValue::$variant(elems))
            }
        }
    };
}

collection_codec!(ListCodec, List, "[", "]");
collection_codec!(SetCodec, Set, "{", "}");

/// Codec for `map` and the frozen sorted map; both share the wire layout.
#[derive(Debug)]
pub struct MapCodec {
    ty: CqlType,
    key: Arc<dyn Codec>,
    value: Arc<dyn Codec>,
}

impl MapCodec {
    pub(crate) fn new(ty: CqlType, key: Arc<dyn Codec>, value: Arc<dyn Codec>) -> Self {
        Self { ty, key, value }
    }

    fn mismatch(&self, value: &CqlValue) -> CodecError {
        CodecError::Mismatch {
            expected: self.ty.clone(),
            found: value.kind(),
        }
    }
}

impl Codec for MapCodec {
    fn cql_type(&self) -> &CqlType {
        &self.ty
    }

    fn encode(&self, value: &CqlValue) -> Result<Option<Bytes>, CodecError> {
        match value {
            CqlValue::Null => Ok(None),
            CqlValue::Map(entries) => {
                let mut buf = (entries.len() as i32).to_be_bytes().to_vec();
                for (k, v) in entries {
                    write_element(&mut buf, self.key.encode(k)?.as_deref());
                    write_element(&mut buf, self.value.encode(v)?.as_deref());
                }
                Ok(Some(buf.into()))
            }
            other => Err(self.mismatch(other)),
        }
    }

    fn decode(&self, bytes: Option<&[u8]>) -> Result<CqlValue, CodecError> {
        let Some(mut input) = bytes else {
            return Ok(CqlValue::Null);
        };
        let n = read_i32(&mut input, &self.ty)?;
        let mut entries = Vec::with_capacity(n.max(0) as usize);
        for _ in 0..n {
            let k = self.key.decode(read_element(&mut input, &self.ty)?)?;
            let v = self.value.decode(read_element(&mut input, &self.ty)?)?;
            entries.push((k, v));
        }
        Ok(CqlValue::Map(entries))
    }

    fn format(&self, value: &CqlValue) -> Result<String, CodecError> {
        match value {
            CqlValue::Null => Ok("null".to_owned()),
            CqlValue::Map(entries) => {
                let body: Result<Vec<_>, CodecError> = entries
                    .iter()
                    .map(|(k, v)| Ok(format!("{}: {}", self.key.format(k)?, self.value.format(v)?)))
                    .collect();
                Ok(format!("{{{}}}", body?.iter().join(", ")))
            }
            other => Err(self.mismatch(other)),
        }
    }

    fn parse(&self, text: &str) -> Result<CqlValue, CodecError> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("null") {
            return Ok(CqlValue::Null);
        }
        let unparsable = || CodecError::Unparsable {
            ty: self.ty.clone(),
            text: text.to_owned(),
        };
        let inner = unwrap_delimited(text, '{', '}').ok_or_else(unparsable)?;
        let entries = split_top_level(inner, ',')
            .into_iter()
            .map(|entry| {
                let parts = split_top_level(entry, ':');
                let [k, v] = parts.as_slice() else {
                    return Err(unparsable());
                };
                Ok((self.key.parse(k)?, self.value.parse(v)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CqlValue::Map(entries))
    }
}

/// Codec for tuples: elements back to back, each length-prefixed, no count.
#[derive(Debug)]
pub struct TupleCodec {
    ty: CqlType,
    elems: Vec<Arc<dyn Codec>>,
}

impl TupleCodec {
    pub(crate) fn new(ty: CqlType, elems: Vec<Arc<dyn Codec>>) -> Self {
        Self { ty, elems }
    }

    fn mismatch(&self, value: &CqlValue) -> CodecError {
        CodecError::Mismatch {
            expected: self.ty.clone(),
            found: value.kind(),
        }
    }
}

impl Codec for TupleCodec {
    fn cql_type(&self) -> &CqlType {
        &self.ty
    }

    fn encode(&self, value: &CqlValue) -> Result<Option<Bytes>, CodecError> {
        match value {
            CqlValue::Null => Ok(None),
            CqlValue::Tuple(values) if values.len() == self.elems.len() => {
                let mut buf = Vec::new();
                for (codec, v) in self.elems.iter().zip(values) {
                    write_element(&mut buf, codec.encode(v)?.as_deref());
                }
                Ok(Some(buf.into()))
            }
            other => Err(self.mismatch(other)),
        }
    }

    fn decode(&self, bytes: Option<&[u8]>) -> Result<CqlValue, CodecError> {
        let Some(mut input) = bytes else {
            return Ok(CqlValue::Null);
        };
        let mut out = Vec::with_capacity(self.elems.len());
        for codec in &self.elems {
            // A tuple value may be truncated after any element.
            if input.is_empty() {
                out.push(CqlValue::Null);
                continue;
            }
            out.push(codec.decode(read_element(&mut input, &self.ty)?)?);
        }
        Ok(CqlValue::Tuple(out))
    }

    fn format(&self, value: &CqlValue) -> Result<String, CodecError> {
        match value {
            CqlValue::Null => Ok("null".to_owned()),
            CqlValue::Tuple(values) if values.len() == self.elems.len() => {
                let body: Result<Vec<_>, _> = self.elems.iter().zip(values).map(|(c, v)| c.format(v)).collect();
                Ok(format!("({})", body?.iter().join(", ")))
            }
            other => Err(self.mismatch(other)),
        }
    }

    fn parse(&self, text: &str) -> Result<CqlValue, CodecError> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("null") {
            return Ok(CqlValue::Null);
        }
        let unparsable = || CodecError::Unparsable {
            ty: self.ty.clone(),
            text: text.to_owned(),
        };
        let inner = unwrap_delimited(text, '(', ')').ok_or_else(unparsable)?;
        let parts = split_top_level(inner, ',');
        if parts.len() != self.elems.len() {
            return Err(unparsable());
        }
        let values = self
            .elems
            .iter()
            .zip(parts)
            .map(|(c, p)| c.parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CqlValue::Tuple(values))
    }
}

/// Codec for user-defined types; wire layout matches tuples, field order
/// comes from the type definition.
#[derive(Debug)]
pub struct UdtCodec {
    ty: CqlType,
    def: Arc<UdtDef>,
    fields: Vec<(String, Arc<dyn Codec>)>,
}

impl UdtCodec {
    pub(crate) fn new(ty: CqlType, def: Arc<UdtDef>, fields: Vec<(String, Arc<dyn Codec>)>) -> Self {
        Self { ty, def, fields }
    }

    fn mismatch(&self, value: &CqlValue) -> CodecError {
        CodecError::Mismatch {
            expected: self.ty.clone(),
            found: value.kind(),
        }
    }

    /// Reorders a value's fields into definition order, erroring on unknowns.
    fn ordered_values<'v>(&self, fields: &'v [(String, CqlValue)]) -> Result<Vec<&'v CqlValue>, CodecError> {
        for (name, _) in fields {
            if !self.fields.iter().any(|(f, _)| f == name) {
                return Err(CodecError::UnknownUdtField {
                    udt: self.def.name.clone(),
                    field: name.clone(),
                });
            }
        }
        Ok(self
            .fields
            .iter()
            .map(|(name, _)| {
                fields
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v)
                    .unwrap_or(&CqlValue::Null)
            })
            .collect())
    }
}

impl Codec for UdtCodec {
    fn cql_type(&self) -> &CqlType {
        &self.ty
    }

    fn encode(&self, value: &CqlValue) -> Result<Option<Bytes>, CodecError> {
        match value {
            CqlValue::Null => Ok(None),
            CqlValue::Udt { fields, .. } => {
                let ordered = self.ordered_values(fields)?;
                let mut buf = Vec::new();
                for ((_, codec), v) in self.fields.iter().zip(ordered) {
                    write_element(&mut buf, codec.encode(v)?.as_deref());
                }
                Ok(Some(buf.into()))
            }
            other => Err(self.mismatch(other)),
        }
    }

    fn decode(&self, bytes: Option<&[u8]>) -> Result<CqlValue, CodecError> {
        let Some(mut input) = bytes else {
            return Ok(CqlValue::Null);
        };
        let mut fields = Vec::with_capacity(self.fields.len());
        for (name, codec) in &self.fields {
            let value = if input.is_empty() {
                CqlValue::Null
            } else {
                codec.decode(read_element(&mut input, &self.ty)?)?
            };
            fields.push((name.clone(), value));
        }
        Ok(CqlValue::Udt {
            type_name: self.def.name.clone(),
            fields,
        })
    }

    fn format(&self, value: &CqlValue) -> Result<String, CodecError> {
        match value {
            CqlValue::Null => Ok("null".to_owned()),
            CqlValue::Udt { fields, .. } => {
                let ordered = self.ordered_values(fields)?;
                let body: Result<Vec<_>, CodecError> = self
                    .fields
                    .iter()
                    .zip(ordered)
                    .map(|((name, codec), v)| Ok(format!("{name}: {}", codec.format(v)?)))
                    .collect();
                Ok(format!("{{{}}}", body?.iter().join(", ")))
            }
            other => Err(self.mismatch(other)),
        }
    }

    fn parse(&self, text: &str) -> Result<CqlValue, CodecError> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("null") {
            return Ok(CqlValue::Null);
        }
        let unparsable = || CodecError::Unparsable {
            ty: self.ty.clone(),
            text: text.to_owned(),
        };
        let inner = unwrap_delimited(text, '{', '}').ok_or_else(unparsable)?;
        let mut fields = Vec::new();
        for entry in split_top_level(inner, ',') {
            let parts = split_top_level(entry, ':');
            let [name, value] = parts.as_slice() else {
                return Err(unparsable());
            };
            let codec = self
                .fields
                .iter()
                .find(|(f, _)| f.eq_ignore_ascii_case(name))
                .map(|(_, c)| c)
                .ok_or_else(|| CodecError::UnknownUdtField {
                    udt: self.def.name.clone(),
                    field: (*name).to_owned(),
                })?;
            fields.push(((*name).to_owned(), codec.parse(value)?));
        }
        Ok(CqlValue::Udt {
            type_name: self.def.name.clone(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecRegistry;
    use pretty_assertions::assert_eq;

    #[test]
    fn list_wire_and_literal_round_trip() {
        let registry = CodecRegistry::new();
        let codec = registry.codec_for(&CqlType::list(CqlType::Int)).unwrap();
        let value = CqlValue::List(vec![CqlValue::Int(1), CqlValue::Int(2), CqlValue::Null]);

        let bytes = codec.encode(&value).unwrap().unwrap();
        assert_eq!(codec.decode(Some(&bytes)).unwrap(), value);

        assert_eq!(codec.format(&value).unwrap(), "[1, 2, null]");
        assert_eq!(codec.parse("[1, 2, null]").unwrap(), value);
    }

    #[test]
    fn map_of_text_round_trips() {
        let registry = CodecRegistry::new();
        let codec = registry.codec_for(&CqlType::map(CqlType::Text, CqlType::BigInt)).unwrap();
        let value = CqlValue::Map(vec![
            (CqlValue::Text("a".into()), CqlValue::BigInt(1)),
            (CqlValue::Text("b, c".into()), CqlValue::BigInt(2)),
        ]);

        let bytes = codec.encode(&value).unwrap().unwrap();
        assert_eq!(codec.decode(Some(&bytes)).unwrap(), value);

        let formatted = codec.format(&value).unwrap();
        assert_eq!(formatted, "{'a': 1, 'b, c': 2}");
        assert_eq!(codec.parse(&formatted).unwrap(), value);
    }

    #[test]
    fn udt_encodes_in_definition_order() {
        let registry = CodecRegistry::new();
        let def = UdtDef::new(
            "address",
            vec![("street".into(), CqlType::Text), ("zip".into(), CqlType::Int)],
        );
        let codec = registry.codec_for(&CqlType::Udt(def)).unwrap();

        // Fields supplied out of order still land in definition order.
        let value = CqlValue::Udt {
            type_name: "address".into(),
            fields: vec![
                ("zip".into(), CqlValue::Int(12345)),
                ("street".into(), CqlValue::Text("main".into())),
            ],
        };
        let bytes = codec.encode(&value).unwrap().unwrap();
        let decoded = codec.decode(Some(&bytes)).unwrap();
        assert_eq!(
            decoded,
            CqlValue::Udt {
                type_name: "address".into(),
                fields: vec![
                    ("street".into(), CqlValue::Text("main".into())),
                    ("zip".into(), CqlValue::Int(12345)),
                ],
            }
        );
    }

    #[test]
    fn unknown_udt_field_is_an_error() {
        let registry = CodecRegistry::new();
        let def = UdtDef::new("point", vec![("x".into(), CqlType::Int)]);
        let codec = registry.codec_for(&CqlType::Udt(def)).unwrap();
        let bad = CqlValue::Udt {
            type_name: "point".into(),
            fields: vec![("y".into(), CqlValue::Int(1))],
        };
        assert!(matches!(codec.encode(&bad), Err(CodecError::UnknownUdtField { .. })));
    }

    #[test]
    fn tuple_tolerates_truncated_tail() {
        let registry = CodecRegistry::new();
        let codec = registry
            .codec_for(&CqlType::Tuple(vec![CqlType::Int, CqlType::Text]))
            .unwrap();
        let full = CqlValue::Tuple(vec![CqlValue::Int(1), CqlValue::Text("x".into())]);
        let bytes = codec.encode(&full).unwrap().unwrap();

        // Drop the second element entirely; it should decode as null.
        let truncated = &bytes[..8];
        assert_eq!(
            codec.decode(Some(truncated)).unwrap(),
            CqlValue::Tuple(vec![CqlValue::Int(1), CqlValue::Null])
        );
    }
}
