use indexmap::IndexMap;
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;
use tessera_types::CqlValue;
use thiserror::Error;

/// Keyspaces rarely declare more than a couple of keys.
pub(crate) type KeyspaceKeys = SmallVec<[KeyspaceKey; 2]>;

/// Replication descriptor for a keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replication {
    Simple { replication_factor: u8 },
    NetworkTopology { data_centers: Vec<(String, u8)> },
}

impl Replication {
    pub fn simple(replication_factor: u8) -> Self {
        Replication::Simple { replication_factor }
    }

    pub fn network(data_centers: impl IntoIterator<Item = (String, u8)>) -> Self {
        Replication::NetworkTopology {
            data_centers: data_centers.into_iter().collect(),
        }
    }

    /// Renders the `replication = {...}` map literal.
    pub fn to_cql(&self) -> String {
        match self {
            Replication::Simple { replication_factor } => {
                format!("{{'class': 'SimpleStrategy', 'replication_factor': {replication_factor}}}")
            }
            Replication::NetworkTopology { data_centers } => {
                let mut out = String::from("{'class': 'NetworkTopologyStrategy'");
                for (dc, rf) in data_centers {
                    out.push_str(&format!(", '{dc}': {rf}"));
                }
                out.push('}');
                out
            }
        }
    }
}

/// One keyspace key: a record field whose value selects the physical
/// keyspace. Values listed in `exclude` are rejected at statement time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceKey {
    pub column: String,
    pub exclude: Vec<String>,
}

/// Declarative keyspace description on a record descriptor.
///
/// Leaving replication unset defers to the session-level default.
#[derive(Debug, Clone)]
pub struct KeyspaceDef {
    pub(crate) base: String,
    pub(crate) keys: KeyspaceKeys,
    pub(crate) replication: Option<Replication>,
    pub(crate) durable_writes: bool,
}

impl KeyspaceDef {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            keys: KeyspaceKeys::new(),
            replication: None,
            durable_writes: true,
        }
    }

    pub fn replication(mut self, replication: Replication) -> Self {
        self.replication = Some(replication);
        self
    }

    pub fn durable_writes(mut self, durable: bool) -> Self {
        self.durable_writes = durable;
        self
    }

    pub fn key(mut self, column: impl Into<String>) -> Self {
        self.keys.push(KeyspaceKey {
            column: column.into(),
            exclude: Vec::new(),
        });
        self
    }

    pub fn key_excluding(mut self, column: impl Into<String>, exclude: Vec<String>) -> Self {
        self.keys.push(KeyspaceKey {
            column: column.into(),
            exclude,
        });
        self
    }
}

/// Keyspace-key values supplied at statement time, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyspaceKeyMap {
    values: IndexMap<String, CqlValue>,
}

impl KeyspaceKeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<CqlValue>) -> Self {
        self.insert(key, value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: CqlValue) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&CqlValue> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CqlValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Key names as a set, for exact/subset selection over registered types.
    pub fn names(&self) -> BTreeSet<&str> {
        self.values.keys().map(String::as_str).collect()
    }
}

impl<K: Into<String>, V: Into<CqlValue>> FromIterator<(K, V)> for KeyspaceKeyMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum SubstituteError {
    #[error("no value supplied for keyspace key `{key}`")]
    Missing { key: String },
    #[error("value `{value}` is excluded for keyspace key `{key}`")]
    Excluded { key: String, value: String },
}

/// Compiled keyspace template: base name plus the ordered keyspace keys.
#[derive(Debug, Clone)]
pub struct KeyspaceSpec {
    base: String,
    keys: KeyspaceKeys,
    replication: Option<Replication>,
    durable_writes: bool,
}

impl KeyspaceSpec {
    pub(crate) fn from_def(def: KeyspaceDef) -> Self {
        Self {
            base: def.base,
            keys: def.keys,
            replication: def.replication,
            durable_writes: def.durable_writes,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn keys(&self) -> &[KeyspaceKey] {
        &self.keys
    }

    pub fn key_names(&self) -> BTreeSet<&str> {
        self.keys.iter().map(|k| k.column.as_str()).collect()
    }

    pub fn replication(&self) -> Option<&Replication> {
        self.replication.as_ref()
    }

    pub fn durable_writes(&self) -> bool {
        self.durable_writes
    }

    /// Substitutes keyspace-key values into the physical keyspace name.
    ///
    /// Total on the declared key set: every declared key must be present in
    /// `values`, and no excluded value may appear. Keys are appended to the
    /// base name in declaration order.
    pub fn physical_name(&self, values: &KeyspaceKeyMap) -> Result<String, SubstituteError> {
        let mut name = self.base.clone();
        for key in &self.keys {
            let value = values.get(&key.column).ok_or_else(|| SubstituteError::Missing {
                key: key.column.clone(),
            })?;
            let fragment = keyspace_fragment(value);
            if key.exclude.iter().any(|e| e.eq_ignore_ascii_case(&fragment)) {
                return Err(SubstituteError::Excluded {
                    key: key.column.clone(),
                    value: fragment,
                });
            }
            name.push('_');
            name.push_str(&fragment);
        }
        Ok(name)
    }
}

/// Renders a key value as a keyspace-name fragment: lower-cased, with
/// anything outside `[a-z0-9_]` squashed to `_`.
fn keyspace_fragment(value: &CqlValue) -> String {
    value
        .to_string()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

impl fmt::Display for KeyspaceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for key in &self.keys {
            write!(f, "_{{{}}}", key.column)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec() -> KeyspaceSpec {
        KeyspaceSpec::from_def(
            KeyspaceDef::new("app")
                .key("tenant")
                .key_excluding("region", vec!["test".into()]),
        )
    }

    #[test]
    fn substitution_is_order_sensitive() {
        let values: KeyspaceKeyMap = [("region", "eu"), ("tenant", "acme")].into_iter().collect();
        assert_eq!(spec().physical_name(&values).unwrap(), "app_acme_eu");
    }

    #[test]
    fn missing_key_is_rejected() {
        let values: KeyspaceKeyMap = [("tenant", "acme")].into_iter().collect();
        assert_eq!(
            spec().physical_name(&values),
            Err(SubstituteError::Missing { key: "region".into() })
        );
    }

    #[test]
    fn excluded_value_is_rejected() {
        let values: KeyspaceKeyMap = [("tenant", "acme"), ("region", "TEST")].into_iter().collect();
        assert_eq!(
            spec().physical_name(&values),
            Err(SubstituteError::Excluded {
                key: "region".into(),
                value: "test".into(),
            })
        );
    }

    #[test]
    fn fragments_are_sanitized() {
        let values: KeyspaceKeyMap = [("tenant", "Ac me-7"), ("region", "eu")].into_iter().collect();
        assert_eq!(spec().physical_name(&values).unwrap(), "app_ac_me_7_eu");
    }

    #[test]
    fn replication_literals() {
        assert_eq!(
            Replication::simple(3).to_cql(),
            "{'class': 'SimpleStrategy', 'replication_factor': 3}"
        );
        assert_eq!(
            Replication::network([("dc1".to_owned(), 3), ("dc2".to_owned(), 2)]).to_cql(),
            "{'class': 'NetworkTopologyStrategy', 'dc1': 3, 'dc2': 2}"
        );
    }
}
