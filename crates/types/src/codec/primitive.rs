use super::literal::{quote_string, unquote_string};
use super::{Codec, CodecError};
use crate::{CqlType, CqlValue};
use bytes::Bytes;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::net::IpAddr;
use uuid::Uuid;

/// Epoch bias for the `date` wire format: day zero is 1970-01-01 at `1 << 31`.
const DATE_EPOCH_BIAS: i64 = 1 << 31;

/// Codec for the scalar CQL types.
#[derive(Debug)]
pub struct PrimitiveCodec {
    ty: CqlType,
}

impl PrimitiveCodec {
    pub(crate) fn new(ty: CqlType) -> Result<Self, CodecError> {
        match ty {
            CqlType::List(_)
            | CqlType::Set(_)
            | CqlType::Map(..)
            | CqlType::SortedMap(..)
            | CqlType::Tuple(_)
            | CqlType::Udt(_)
            | CqlType::Frozen(_) => Err(CodecError::Unavailable(ty)),
            primitive => Ok(Self { ty: primitive }),
        }
    }

    fn mismatch(&self, value: &CqlValue) -> CodecError {
        CodecError::Mismatch {
            expected: self.ty.clone(),
            found: value.kind(),
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::Malformed {
            ty: self.ty.clone(),
            reason: reason.into(),
        }
    }

    fn unparsable(&self, text: &str) -> CodecError {
        CodecError::Unparsable {
            ty: self.ty.clone(),
            text: text.to_owned(),
        }
    }
}

fn take_exact<const N: usize>(bytes: &[u8], codec: &PrimitiveCodec) -> Result<[u8; N], CodecError> {
    bytes
        .try_into()
        .map_err(|_| codec.malformed(format!("expected {N} bytes, found {}", bytes.len())))
}

fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

impl Codec for PrimitiveCodec {
    fn cql_type(&self) -> &CqlType {
        &self.ty
    }

    fn encode(&self, value: &CqlValue) -> Result<Option<Bytes>, CodecError> {
        use CqlType as T;
        use CqlValue as V;
        if value.is_null() {
            return Ok(None);
        }
        let out: Vec<u8> = match (&self.ty, value) {
            (T::Boolean, V::Boolean(b)) => vec![*b as u8],
            (T::TinyInt, V::TinyInt(v)) => v.to_be_bytes().into(),
            (T::SmallInt, V::SmallInt(v)) => v.to_be_bytes().into(),
            (T::Int, V::Int(v)) => v.to_be_bytes().into(),
            (T::BigInt, V::BigInt(v)) | (T::Counter, V::Counter(v)) | (T::Counter, V::BigInt(v)) => {
                v.to_be_bytes().into()
            }
            (T::VarInt, V::VarInt(raw)) => raw.clone(),
            (T::VarInt, V::BigInt(v)) => v.to_be_bytes().into(),
            (T::Float, V::Float(v)) => v.to_be_bytes().into(),
            (T::Double, V::Double(v)) => v.to_be_bytes().into(),
            (T::Decimal, V::Decimal { scale, unscaled }) => {
                let mut buf = scale.to_be_bytes().to_vec();
                buf.extend_from_slice(unscaled);
                buf
            }
            (T::Ascii | T::Text | T::VarChar, V::Text(s)) => s.as_bytes().into(),
            (T::Blob, V::Blob(b)) => b.to_vec(),
            (T::Uuid, V::Uuid(u) | V::TimeUuid(u)) | (T::TimeUuid, V::TimeUuid(u)) => u.as_bytes().to_vec(),
            (T::Timestamp, V::Timestamp(t)) => t.timestamp_millis().to_be_bytes().into(),
            (T::Date, V::Date(d)) => {
                let days = (*d - epoch_date()).num_days() + DATE_EPOCH_BIAS;
                (days as u32).to_be_bytes().into()
            }
            (T::Time, V::Time(ns)) => ns.to_be_bytes().into(),
            (T::Inet, V::Inet(addr)) => match addr {
                IpAddr::V4(v4) => v4.octets().into(),
                IpAddr::V6(v6) => v6.octets().into(),
            },
            _ => return Err(self.mismatch(value)),
        };
        Ok(Some(out.into()))
    }

    fn decode(&self, bytes: Option<&[u8]>) -> Result<CqlValue, CodecError> {
        use CqlType as T;
        let Some(bytes) = bytes else {
            return Ok(CqlValue::Null);
        };
        Ok(match &self.ty {
            T::Boolean => CqlValue::Boolean(*bytes.first().ok_or_else(|| self.malformed("empty"))? != 0),
            T::TinyInt => CqlValue::TinyInt(i8::from_be_bytes(take_exact(bytes, self)?)),
            T::SmallInt => CqlValue::SmallInt(i16::from_be_bytes(take_exact(bytes, self)?)),
            T::Int => CqlValue::Int(i32::from_be_bytes(take_exact(bytes, self)?)),
            T::BigInt => CqlValue::BigInt(i64::from_be_bytes(take_exact(bytes, self)?)),
            T::Counter => CqlValue::Counter(i64::from_be_bytes(take_exact(bytes, self)?)),
            T::VarInt => CqlValue::VarInt(bytes.to_vec()),
            T::Float => CqlValue::Float(f32::from_be_bytes(take_exact(bytes, self)?)),
            T::Double => CqlValue::Double(f64::from_be_bytes(take_exact(bytes, self)?)),
            T::Decimal => {
                if bytes.len() < 4 {
                    return Err(self.malformed("decimal shorter than its scale prefix"));
                }
                let scale = i32::from_be_bytes(bytes[..4].try_into().unwrap());
                CqlValue::Decimal {
                    scale,
                    unscaled: bytes[4..].to_vec(),
                }
            }
            T::Ascii | T::Text | T::VarChar => CqlValue::Text(
                std::str::from_utf8(bytes)
                    .map_err(|e| self.malformed(e.to_string()))?
                    .to_owned(),
            ),
            T::Blob => CqlValue::Blob(Bytes::copy_from_slice(bytes)),
            T::Uuid => CqlValue::Uuid(Uuid::from_bytes(take_exact(bytes, self)?)),
            T::TimeUuid => CqlValue::TimeUuid(Uuid::from_bytes(take_exact(bytes, self)?)),
            T::Timestamp => {
                let millis = i64::from_be_bytes(take_exact(bytes, self)?);
                CqlValue::Timestamp(
                    Utc.timestamp_millis_opt(millis)
                        .single()
                        .ok_or_else(|| self.malformed("timestamp out of range"))?,
                )
            }
            T::Date => {
                let raw = u32::from_be_bytes(take_exact(bytes, self)?);
                let days = raw as i64 - DATE_EPOCH_BIAS;
                CqlValue::Date(epoch_date() + Duration::days(days))
            }
            T::Time => CqlValue::Time(i64::from_be_bytes(take_exact(bytes, self)?)),
            T::Inet => match bytes.len() {
                4 => CqlValue::Inet(IpAddr::from(<[u8; 4]>::try_from(bytes).unwrap())),
                16 => CqlValue::Inet(IpAddr::from(<[u8; 16]>::try_from(bytes).unwrap())),
                n => return Err(self.malformed(format!("inet must be 4 or 16 bytes, found {n}"))),
            },
            other => return Err(CodecError::Unavailable(other.clone())),
        })
    }

    fn format(&self, value: &CqlValue) -> Result<String, CodecError> {
        use CqlValue as V;
        Ok(match value {
            V::Null => "null".to_owned(),
            V::Boolean(b) => b.to_string(),
            V::TinyInt(v) => v.to_string(),
            V::SmallInt(v) => v.to_string(),
            V::Int(v) => v.to_string(),
            V::BigInt(v) | V::Counter(v) | V::Time(v) => v.to_string(),
            V::VarInt(raw) => format_varint(raw).ok_or(CodecError::Unformattable("varint wider than 128 bits"))?,
            V::Float(v) => v.to_string(),
            V::Double(v) => v.to_string(),
            V::Decimal { scale, unscaled } => {
                let digits = format_varint(unscaled).ok_or(CodecError::Unformattable("decimal wider than 128 bits"))?;
                if *scale == 0 {
                    digits
                } else {
                    format!("{digits}e{}", -scale)
                }
            }
            V::Text(s) => quote_string(s),
            V::Blob(b) => format!("0x{}", hex::encode(b)),
            V::Uuid(u) | V::TimeUuid(u) => u.to_string(),
            V::Timestamp(t) => t.timestamp_millis().to_string(),
            V::Date(d) => quote_string(&d.format("%Y-%m-%d").to_string()),
            V::Inet(addr) => quote_string(&addr.to_string()),
            other => return Err(self.mismatch(other)),
        })
    }

    fn parse(&self, text: &str) -> Result<CqlValue, CodecError> {
        use CqlType as T;
        let text = text.trim();
        if text.eq_ignore_ascii_case("null") {
            return Ok(CqlValue::Null);
        }
        Ok(match &self.ty {
            T::Boolean => CqlValue::Boolean(text.parse::<bool>().map_err(|_| self.unparsable(text))?),
            T::TinyInt => CqlValue::TinyInt(text.parse().map_err(|_| self.unparsable(text))?),
            T::SmallInt => CqlValue::SmallInt(text.parse().map_err(|_| self.unparsable(text))?),
            T::Int => CqlValue::Int(text.parse().map_err(|_| self.unparsable(text))?),
            T::BigInt => CqlValue::BigInt(text.parse().map_err(|_| self.unparsable(text))?),
            T::Counter => CqlValue::Counter(text.parse().map_err(|_| self.unparsable(text))?),
            T::VarInt => {
                let v: i64 = text.parse().map_err(|_| self.unparsable(text))?;
                CqlValue::VarInt(v.to_be_bytes().into())
            }
            T::Float => CqlValue::Float(text.parse().map_err(|_| self.unparsable(text))?),
            T::Double => CqlValue::Double(text.parse().map_err(|_| self.unparsable(text))?),
            T::Ascii | T::Text | T::VarChar => {
                CqlValue::Text(unquote_string(text).ok_or_else(|| self.unparsable(text))?)
            }
            T::Blob => {
                let hex_part = text.strip_prefix("0x").ok_or_else(|| self.unparsable(text))?;
                CqlValue::Blob(hex::decode(hex_part).map_err(|_| self.unparsable(text))?.into())
            }
            T::Uuid => CqlValue::Uuid(text.parse().map_err(|_| self.unparsable(text))?),
            T::TimeUuid => CqlValue::TimeUuid(text.parse().map_err(|_| self.unparsable(text))?),
            T::Timestamp => {
                if let Ok(millis) = text.parse::<i64>() {
                    CqlValue::Timestamp(
                        Utc.timestamp_millis_opt(millis)
                            .single()
                            .ok_or_else(|| self.unparsable(text))?,
                    )
                } else {
                    let quoted = unquote_string(text).ok_or_else(|| self.unparsable(text))?;
                    CqlValue::Timestamp(
                        DateTime::parse_from_rfc3339(&quoted)
                            .map_err(|_| self.unparsable(text))?
                            .with_timezone(&Utc),
                    )
                }
            }
            T::Date => {
                let quoted = unquote_string(text).ok_or_else(|| self.unparsable(text))?;
                CqlValue::Date(NaiveDate::parse_from_str(&quoted, "%Y-%m-%d").map_err(|_| self.unparsable(text))?)
            }
            T::Time => CqlValue::Time(text.parse().map_err(|_| self.unparsable(text))?),
            T::Inet => {
                let quoted = unquote_string(text).ok_or_else(|| self.unparsable(text))?;
                CqlValue::Inet(quoted.parse().map_err(|_| self.unparsable(text))?)
            }
            T::Decimal => return Err(self.unparsable(text)),
            other => return Err(CodecError::Unavailable(other.clone())),
        })
    }
}

/// Renders a big-endian two's-complement integer no wider than 128 bits.
fn format_varint(raw: &[u8]) -> Option<String> {
    if raw.is_empty() {
        return Some("0".to_owned());
    }
    if raw.len() > 16 {
        return None;
    }
    let negative = raw[0] & 0x80 != 0;
    let fill = if negative { 0xff } else { 0x00 };
    let mut wide = [fill; 16];
    wide[16 - raw.len()..].copy_from_slice(raw);
    Some(i128::from_be_bytes(wide).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn codec(ty: CqlType) -> PrimitiveCodec {
        PrimitiveCodec::new(ty).unwrap()
    }

    #[test]
    fn scalar_wire_round_trips() {
        let cases: Vec<(CqlType, CqlValue)> = vec![
            (CqlType::Boolean, CqlValue::Boolean(true)),
            (CqlType::Int, CqlValue::Int(-42)),
            (CqlType::BigInt, CqlValue::BigInt(1 << 40)),
            (CqlType::Text, CqlValue::Text("héllo".into())),
            (CqlType::Uuid, CqlValue::Uuid(Uuid::from_u128(7))),
            (CqlType::Inet, CqlValue::Inet("127.0.0.1".parse().unwrap())),
            (
                CqlType::Date,
                CqlValue::Date(NaiveDate::from_ymd_opt(2019, 6, 3).unwrap()),
            ),
        ];
        for (ty, value) in cases {
            let c = codec(ty);
            let bytes = c.encode(&value).unwrap().unwrap();
            assert_eq!(c.decode(Some(&bytes)).unwrap(), value);
        }
    }

    #[test]
    fn null_round_trips_as_absent() {
        let c = codec(CqlType::Int);
        assert_eq!(c.encode(&CqlValue::Null).unwrap(), None);
        assert_eq!(c.decode(None).unwrap(), CqlValue::Null);
    }

    #[test]
    fn text_literals_escape_quotes() {
        let c = codec(CqlType::Text);
        let formatted = c.format(&CqlValue::Text("it's".into())).unwrap();
        assert_eq!(formatted, "'it''s'");
        assert_eq!(c.parse(&formatted).unwrap(), CqlValue::Text("it's".into()));
    }

    #[test]
    fn mismatched_value_is_rejected() {
        let c = codec(CqlType::Int);
        assert!(matches!(
            c.encode(&CqlValue::Text("7".into())),
            Err(CodecError::Mismatch { .. })
        ));
    }

    #[test]
    fn varint_formatting() {
        assert_eq!(format_varint(&[]).unwrap(), "0");
        assert_eq!(format_varint(&255u64.to_be_bytes()).unwrap(), "255");
        assert_eq!(format_varint(&(-2i64).to_be_bytes()).unwrap(), "-2");
        assert!(format_varint(&[0u8; 17]).is_none());
    }

    proptest! {
        #[test]
        fn bigint_literal_round_trip(v in any::<i64>()) {
            let c = codec(CqlType::BigInt);
            let formatted = c.format(&CqlValue::BigInt(v)).unwrap();
            prop_assert_eq!(c.parse(&formatted).unwrap(), CqlValue::BigInt(v));
        }

        #[test]
        fn text_literal_round_trip(s in ".*") {
            let c = codec(CqlType::Text);
            let formatted = c.format(&CqlValue::Text(s.clone())).unwrap();
            prop_assert_eq!(c.parse(&formatted).unwrap(), CqlValue::Text(s));
        }
    }
}
