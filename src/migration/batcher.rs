// ABOUTME: Row batcher streaming source rows in bounded, converted batches
// ABOUTME: Lazy and restartable; conversion failures name the row index and column

use super::descriptor::TableDescriptor;
use super::typemap::DestinationType;
use super::SourceDatabase;
use crate::error::{MigrationError, Result};
use crate::sqlite::converter::{convert_value, TimestampUnit};
use mysql_async::Value as MysqlValue;

/// Converted rows ready for one insert, positionally aligned to the table's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub table: String,
    /// Zero-based index of the first row of the batch within the table
    pub start_row: u64,
    pub rows: Vec<Vec<MysqlValue>>,
}

impl RowBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Lazy sequence of [`RowBatch`] for one table.
///
/// Each call to `next` reads at most `batch_size` rows from the source, so
/// memory is bounded by one batch regardless of table size. The sequence ends
/// after the first short page or the first error.
pub struct RowBatcher<'a, S: SourceDatabase + ?Sized> {
    source: &'a S,
    table: &'a TableDescriptor,
    column_types: Vec<DestinationType>,
    batch_size: usize,
    timestamp_unit: TimestampUnit,
    offset: u64,
    finished: bool,
}

impl<'a, S: SourceDatabase + ?Sized> RowBatcher<'a, S> {
    /// `column_types` must hold one destination type per column of `table`.
    pub fn new(
        source: &'a S,
        table: &'a TableDescriptor,
        column_types: Vec<DestinationType>,
        batch_size: usize,
        timestamp_unit: TimestampUnit,
    ) -> Self {
        Self {
            source,
            table,
            column_types,
            batch_size: batch_size.max(1),
            timestamp_unit,
            offset: 0,
            finished: false,
        }
    }

    /// Start over from the first row.
    pub fn rewind(&mut self) {
        self.offset = 0;
        self.finished = false;
    }

    fn next_batch(&mut self) -> Result<Option<RowBatch>> {
        if self.column_types.len() != self.table.columns.len() {
            return Err(MigrationError::schema_translation(
                &self.table.name,
                format!(
                    "{} destination types for {} columns",
                    self.column_types.len(),
                    self.table.columns.len()
                ),
            ));
        }

        let raw = self
            .source
            .fetch_rows(self.table, self.offset, self.batch_size)?;
        if raw.is_empty() {
            return Ok(None);
        }

        let start_row = self.offset;
        let fetched = raw.len();
        let mut rows = Vec::with_capacity(fetched);

        for (i, values) in raw.into_iter().enumerate() {
            let row_index = start_row as usize + i;
            if values.len() != self.column_types.len() {
                return Err(MigrationError::SourceRead {
                    table: self.table.name.clone(),
                    message: format!(
                        "row {} has {} values, expected {}",
                        row_index,
                        values.len(),
                        self.column_types.len()
                    ),
                });
            }

            let converted = values
                .into_iter()
                .zip(&self.column_types)
                .zip(&self.table.columns)
                .map(|((value, target), column)| {
                    convert_value(value, *target, self.timestamp_unit).map_err(|e| {
                        MigrationError::RowConversion {
                            table: self.table.name.clone(),
                            row: row_index,
                            column: column.name.clone(),
                            message: e.to_string(),
                        }
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(converted);
        }

        self.offset += fetched as u64;
        if fetched < self.batch_size {
            self.finished = true;
        }

        Ok(Some(RowBatch {
            table: self.table.name.clone(),
            start_row,
            rows,
        }))
    }
}

impl<S: SourceDatabase + ?Sized> Iterator for RowBatcher<'_, S> {
    type Item = Result<RowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::descriptor::ColumnDescriptor;
    use crate::migration::SourceValue;
    use std::cell::Cell;

    /// In-memory source with a single table of `(id INTEGER, label TEXT)` rows.
    struct VecSource {
        rows: Vec<Vec<SourceValue>>,
        fetches: Cell<usize>,
    }

    impl VecSource {
        fn with_rows(count: i64) -> Self {
            Self {
                rows: (0..count)
                    .map(|i| {
                        vec![
                            SourceValue::Integer(i),
                            SourceValue::Text(format!("row-{}", i)),
                        ]
                    })
                    .collect(),
                fetches: Cell::new(0),
            }
        }
    }

    impl SourceDatabase for VecSource {
        fn list_tables(&self) -> Result<Vec<String>> {
            Ok(vec!["items".to_string()])
        }

        fn describe_table(&self, _table: &str) -> Result<TableDescriptor> {
            Ok(items())
        }

        fn fetch_rows(
            &self,
            _table: &TableDescriptor,
            offset: u64,
            limit: usize,
        ) -> Result<Vec<Vec<SourceValue>>> {
            self.fetches.set(self.fetches.get() + 1);
            Ok(self
                .rows
                .iter()
                .skip(offset as usize)
                .take(limit)
                .cloned()
                .collect())
        }

        fn count_rows(&self, _table: &str) -> Result<u64> {
            Ok(self.rows.len() as u64)
        }

        fn close(self) -> Result<()> {
            Ok(())
        }
    }

    fn items() -> TableDescriptor {
        TableDescriptor::new(
            "items",
            vec![
                ColumnDescriptor::new("id", "INTEGER"),
                ColumnDescriptor::new("label", "TEXT"),
            ],
        )
    }

    fn types() -> Vec<DestinationType> {
        vec![DestinationType::Int, DestinationType::Text]
    }

    fn batches(source: &VecSource, table: &TableDescriptor, size: usize) -> Vec<RowBatch> {
        RowBatcher::new(source, table, types(), size, TimestampUnit::Milliseconds)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_exactly_batch_size_rows_is_one_batch() {
        let source = VecSource::with_rows(500);
        let table = items();
        let batches = batches(&source, &table, 500);

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 500);
    }

    #[test]
    fn test_batch_size_plus_one_rows_is_two_batches() {
        let source = VecSource::with_rows(501);
        let table = items();
        let batches = batches(&source, &table, 500);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 500);
        assert_eq!(batches[1].len(), 1);
        assert_eq!(batches[1].start_row, 500);
    }

    #[test]
    fn test_empty_table_yields_no_batches() {
        let source = VecSource::with_rows(0);
        let table = items();
        assert!(batches(&source, &table, 10).is_empty());
    }

    #[test]
    fn test_batches_preserve_source_order() {
        let source = VecSource::with_rows(23);
        let table = items();
        let ids: Vec<MysqlValue> = batches(&source, &table, 4)
            .into_iter()
            .flat_map(|b| b.rows)
            .map(|row| row[0].clone())
            .collect();

        let expected: Vec<MysqlValue> = (0..23).map(MysqlValue::Int).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_short_page_ends_without_extra_fetch() {
        let source = VecSource::with_rows(7);
        let table = items();
        let _ = batches(&source, &table, 5);
        assert_eq!(source.fetches.get(), 2);
    }

    #[test]
    fn test_rewind_restarts_from_zero() {
        let source = VecSource::with_rows(6);
        let table = items();
        let mut batcher =
            RowBatcher::new(&source, &table, types(), 4, TimestampUnit::Milliseconds);

        let first = batcher.next().unwrap().unwrap();
        batcher.rewind();
        let again = batcher.next().unwrap().unwrap();

        assert_eq!(first, again);
        assert_eq!(again.start_row, 0);
    }

    #[test]
    fn test_conversion_failure_names_row_and_column() {
        let mut source = VecSource::with_rows(3);
        source.rows[2][0] = SourceValue::Integer(i64::MAX);
        let table = items();
        let mut batcher =
            RowBatcher::new(&source, &table, types(), 10, TimestampUnit::Milliseconds);

        match batcher.next() {
            Some(Err(MigrationError::RowConversion { row, column, .. })) => {
                assert_eq!(row, 2);
                assert_eq!(column, "id");
            }
            other => panic!("expected a row conversion error, got {:?}", other),
        }
        assert!(batcher.next().is_none());
    }
}
