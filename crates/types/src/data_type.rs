use std::fmt;
use std::sync::Arc;

/// A user-defined type: a named, ordered set of typed fields.
///
/// The field order is the wire order. UDTs referencing other UDTs are
/// supported; schema generation orders their `CREATE TYPE` statements by
/// dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UdtDef {
    pub name: String,
    pub fields: Vec<(String, CqlType)>,
}

impl UdtDef {
    pub fn new(name: impl Into<String>, fields: Vec<(String, CqlType)>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            fields,
        })
    }

    /// The UDTs this UDT's fields refer to, directly or through collections.
    pub fn references(&self) -> Vec<Arc<UdtDef>> {
        let mut out = Vec::new();
        for (_, ty) in &self.fields {
            ty.collect_udts(&mut out);
        }
        out
    }
}

/// The catalog of CQL column types.
///
/// `SortedMap` is a frozen `map` that iterates in key order; it renders as
/// `frozen<map<..>>` and is kept distinct so schema diffing can tell the two
/// apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CqlType {
    Ascii,
    BigInt,
    Blob,
    Boolean,
    Counter,
    Date,
    Decimal,
    Double,
    Float,
    Inet,
    Int,
    SmallInt,
    Text,
    Time,
    Timestamp,
    TimeUuid,
    TinyInt,
    Uuid,
    VarChar,
    VarInt,
    List(Box<CqlType>),
    Set(Box<CqlType>),
    Map(Box<CqlType>, Box<CqlType>),
    SortedMap(Box<CqlType>, Box<CqlType>),
    Tuple(Vec<CqlType>),
    Udt(Arc<UdtDef>),
    Frozen(Box<CqlType>),
}

impl CqlType {
    pub fn list(elem: CqlType) -> Self {
        CqlType::List(Box::new(elem))
    }

    pub fn set(elem: CqlType) -> Self {
        CqlType::Set(Box::new(elem))
    }

    pub fn map(key: CqlType, value: CqlType) -> Self {
        CqlType::Map(Box::new(key), Box::new(value))
    }

    pub fn sorted_map(key: CqlType, value: CqlType) -> Self {
        CqlType::SortedMap(Box::new(key), Box::new(value))
    }

    pub fn frozen(inner: CqlType) -> Self {
        CqlType::Frozen(Box::new(inner))
    }

    pub fn is_counter(&self) -> bool {
        matches!(self.unfrozen(), CqlType::Counter)
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self.unfrozen(),
            CqlType::List(_) | CqlType::Set(_) | CqlType::Map(..) | CqlType::SortedMap(..)
        )
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self, CqlType::Frozen(_) | CqlType::SortedMap(..))
    }

    /// Strips `Frozen` wrappers.
    pub fn unfrozen(&self) -> &CqlType {
        match self {
            CqlType::Frozen(inner) => inner.unfrozen(),
            other => other,
        }
    }

    /// Whether a column of this type can be `ALTER`ed to `to` in place.
    ///
    /// Follows the CQL compatibility matrix: identity always holds, text
    /// types interchange, fixed-layout scalars may widen to `blob`, and
    /// `timeuuid` may relax to `uuid`. Numeric widening is not allowed.
    pub fn is_alterable_to(&self, to: &CqlType) -> bool {
        use CqlType::*;
        let (from, to) = (self.unfrozen(), to.unfrozen());
        if from == to {
            return true;
        }
        match (from, to) {
            (Ascii, Text) | (Ascii, VarChar) | (Text, VarChar) | (VarChar, Text) => true,
            (TimeUuid, Uuid) => true,
            (Int, VarInt) | (BigInt, VarInt) | (Timestamp, BigInt) | (Timestamp, VarInt) => true,
            // Anything with a stable byte layout can be reinterpreted as a blob.
            (
                Ascii | BigInt | Boolean | Date | Decimal | Double | Float | Inet | Int | SmallInt | Text | Time
                | Timestamp | TimeUuid | TinyInt | Uuid | VarChar | VarInt,
                Blob,
            ) => true,
            _ => false,
        }
    }

    fn collect_udts(&self, out: &mut Vec<Arc<UdtDef>>) {
        match self {
            CqlType::Udt(def) => {
                for (_, ty) in &def.fields {
                    ty.collect_udts(out);
                }
                if !out.iter().any(|d| d.name == def.name) {
                    out.push(def.clone());
                }
            }
            CqlType::List(e) | CqlType::Set(e) | CqlType::Frozen(e) => e.collect_udts(out),
            CqlType::Map(k, v) | CqlType::SortedMap(k, v) => {
                k.collect_udts(out);
                v.collect_udts(out);
            }
            CqlType::Tuple(elems) => {
                for e in elems {
                    e.collect_udts(out);
                }
            }
            _ => {}
        }
    }

    /// Every UDT reachable from this type, dependencies first.
    pub fn referenced_udts(&self) -> Vec<Arc<UdtDef>> {
        let mut out = Vec::new();
        self.collect_udts(&mut out);
        out
    }
}

impl fmt::Display for CqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlType::Ascii => f.write_str("ascii"),
            CqlType::BigInt => f.write_str("bigint"),
            CqlType::Blob => f.write_str("blob"),
            CqlType::Boolean => f.write_str("boolean"),
            CqlType::Counter => f.write_str("counter"),
            CqlType::Date => f.write_str("date"),
            CqlType::Decimal => f.write_str("decimal"),
            CqlType::Double => f.write_str("double"),
            CqlType::Float => f.write_str("float"),
            CqlType::Inet => f.write_str("inet"),
            CqlType::Int => f.write_str("int"),
            CqlType::SmallInt => f.write_str("smallint"),
            CqlType::Text => f.write_str("text"),
            CqlType::Time => f.write_str("time"),
            CqlType::Timestamp => f.write_str("timestamp"),
            CqlType::TimeUuid => f.write_str("timeuuid"),
            CqlType::TinyInt => f.write_str("tinyint"),
            CqlType::Uuid => f.write_str("uuid"),
            CqlType::VarChar => f.write_str("varchar"),
            CqlType::VarInt => f.write_str("varint"),
            CqlType::List(e) => write!(f, "list<{e}>"),
            CqlType::Set(e) => write!(f, "set<{e}>"),
            CqlType::Map(k, v) => write!(f, "map<{k}, {v}>"),
            CqlType::SortedMap(k, v) => write!(f, "frozen<map<{k}, {v}>>"),
            CqlType::Tuple(elems) => {
                f.write_str("tuple<")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str(">")
            }
            CqlType::Udt(def) => write!(f, "frozen<{}>", def.name),
            CqlType::Frozen(inner) => write!(f, "frozen<{inner}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_nested_types() {
        assert_eq!(CqlType::set(CqlType::Text).to_string(), "set<text>");
        assert_eq!(
            CqlType::map(CqlType::Text, CqlType::list(CqlType::Int)).to_string(),
            "map<text, list<int>>"
        );
        assert_eq!(
            CqlType::sorted_map(CqlType::Int, CqlType::Text).to_string(),
            "frozen<map<int, text>>"
        );
    }

    #[test]
    fn alterability_matrix() {
        assert!(CqlType::Ascii.is_alterable_to(&CqlType::Text));
        assert!(CqlType::Text.is_alterable_to(&CqlType::VarChar));
        assert!(CqlType::TimeUuid.is_alterable_to(&CqlType::Uuid));
        assert!(CqlType::BigInt.is_alterable_to(&CqlType::Blob));
        assert!(CqlType::Int.is_alterable_to(&CqlType::Int));

        assert!(!CqlType::Uuid.is_alterable_to(&CqlType::TimeUuid));
        assert!(!CqlType::Int.is_alterable_to(&CqlType::BigInt));
        assert!(!CqlType::Blob.is_alterable_to(&CqlType::Text));
        assert!(!CqlType::list(CqlType::Int).is_alterable_to(&CqlType::list(CqlType::Text)));
    }

    #[test]
    fn udt_reference_collection_is_dependency_first() {
        let inner = UdtDef::new("address", vec![("street".into(), CqlType::Text)]);
        let outer = UdtDef::new(
            "profile",
            vec![
                ("name".into(), CqlType::Text),
                ("home".into(), CqlType::Udt(inner.clone())),
            ],
        );
        let refs = CqlType::Udt(outer).referenced_udts();
        let names: Vec<_> = refs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["address", "profile"]);
    }
}
