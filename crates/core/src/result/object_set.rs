use super::CompositeResultSet;
use crate::error::Error;
use crate::transport::RawRow;
use std::sync::Arc;
use tessera_schema::{ClassInfo, TableInfo};
use tessera_types::RowValues;

/// A lazy, ordered stream of decoded records over a composite result set.
///
/// Rows decode one at a time through the class-info bindings of the table
/// they came from. A row that fails to decode surfaces its error from that
/// `one()` call only; the cursor has already moved past it, so the next
/// call tries the next row.
pub struct ObjectSet<T> {
    class: Arc<ClassInfo<T>>,
    table: Option<Arc<TableInfo>>,
    results: CompositeResultSet,
}

impl<T> std::fmt::Debug for ObjectSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectSet")
            .field("table", &self.table.is_some())
            .field("results", &self.results)
            .finish()
    }
}

impl<T: Send + Sync + 'static> ObjectSet<T> {
    pub(crate) fn new(class: Arc<ClassInfo<T>>, results: CompositeResultSet) -> Self {
        Self {
            class,
            table: None,
            results,
        }
    }

    pub(crate) fn with_table(class: Arc<ClassInfo<T>>, table: Arc<TableInfo>, results: CompositeResultSet) -> Self {
        Self {
            class,
            table: Some(table),
            results,
        }
    }

    pub(crate) fn empty(class: Arc<ClassInfo<T>>) -> Self {
        Self {
            class,
            table: None,
            results: CompositeResultSet::new(Vec::new()),
        }
    }

    fn decode(&self, raw: &RawRow) -> Result<RowValues, Error> {
        let table = self
            .table
            .as_deref()
            .or_else(|| self.class.tables().first().map(|t| &**t));
        let mut values = RowValues::new();
        for (column, bytes) in raw.iter() {
            let binding = table.and_then(|t| t.column(column));
            let Some(binding) = binding else {
                tracing::trace!(column, "row carries a column with no binding; skipped");
                continue;
            };
            let value = binding
                .codec
                .decode(bytes.map(|b| b.as_ref()))
                .map_err(|e| Error::ObjectConversion {
                    table: table.map(TableInfo::name).unwrap_or_default().to_owned(),
                    message: format!("column `{column}`: {e}"),
                })?;
            values.insert(binding.column.clone(), value);
        }
        Ok(values)
    }

    /// The next record, or `None` when the stream is exhausted.
    pub async fn one(&mut self) -> Result<Option<T>, Error> {
        let Some(raw) = self.results.one().await.map_err(Error::from_execution_on_read)? else {
            return Ok(None);
        };
        let values = self.decode(&raw)?;
        let record = self.class.build_row(&values).map_err(|e| Error::ObjectConversion {
            table: self
                .table
                .as_deref()
                .map(TableInfo::name)
                .unwrap_or_default()
                .to_owned(),
            message: e.to_string(),
        })?;
        Ok(Some(record))
    }

    /// The next row as raw decoded values, without building a record.
    pub async fn one_raw_values(&mut self) -> Result<Option<RowValues>, Error> {
        let Some(raw) = self.results.one().await.map_err(Error::from_execution_on_read)? else {
            return Ok(None);
        };
        Ok(Some(self.decode(&raw)?))
    }

    /// Drains the stream into a vector.
    pub async fn all(&mut self) -> Result<Vec<T>, Error> {
        let mut out = Vec::new();
        while let Some(record) = self.one().await? {
            out.push(record);
        }
        Ok(out)
    }

    pub fn available_without_fetching(&self) -> usize {
        self.results.available_without_fetching()
    }

    pub fn is_exhausted(&self) -> bool {
        self.results.is_exhausted()
    }

    /// AND over every backing statement's conditional outcome.
    pub fn was_applied(&self) -> bool {
        self.results.was_applied()
    }

    pub fn class(&self) -> &Arc<ClassInfo<T>> {
        &self.class
    }
}
