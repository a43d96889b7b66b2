/// Query Execution Module
///
/// This module turns a sent statement into rows. Three strategies share one
/// scoped cursor over the driver's result-set handle:
/// - [`Rows`]: streaming, one reused [`Row`] buffer per step
/// - [`InstantRows`]: streaming, zero-copy [`InstantRow`] views, optional
///   column metadata
/// - [`Connection::all_rows`]: fully buffered
///
/// Whatever way a streaming iteration ends (exhaustion, early `break`, `?`,
/// or unwinding) the cursor drains the remaining native rows and frees the
/// handle when dropped, so the connection is ready for the next statement.

use crate::core::db::connection::Connection;
use crate::core::db::driver::{Driver, NativeResult, NativeRow};
use crate::core::db::schema::DbColumns;
use crate::core::db::sqlite::SqliteDriver;
use crate::core::db::template::{Arg, QueryTemplate};
use crate::core::Result;
use serde::Serialize;
use std::borrow::Cow;
use std::ops::Index;
use tracing::{debug, warn};

/// One result row: nullable text fields, `None` being NULL.
///
/// Field bytes are decoded as UTF-8, invalid sequences becoming U+FFFD.
/// Read binary columns through [`InstantRow::bytes`] instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Row {
    fields: Vec<Option<String>>,
}

impl Row {
    pub fn new(fields: Vec<Option<String>>) -> Self {
        Row { fields }
    }

    /// A row of `count` NULL fields.
    pub fn nulls(count: usize) -> Self {
        Row {
            fields: vec![None; count],
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Text of a field, `None` for NULL.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields[index].as_deref()
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.fields[index].is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.fields.iter().map(|f| f.as_deref())
    }

    pub fn fields(&self) -> &[Option<String>] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<Option<String>> {
        self.fields
    }

    /// Copies a native row into this buffer, reusing its allocations.
    fn fill_from(&mut self, native: NativeRow<'_>) {
        self.fields.resize(native.len(), None);
        for (index, slot) in self.fields.iter_mut().enumerate() {
            match native.get(index) {
                Some(bytes) => {
                    let text = slot.get_or_insert_with(String::new);
                    text.clear();
                    text.push_str(&String::from_utf8_lossy(bytes));
                }
                None => *slot = None,
            }
        }
    }

    fn from_native(native: NativeRow<'_>) -> Self {
        let mut row = Row::default();
        row.fill_from(native);
        row
    }
}

impl Index<usize> for Row {
    type Output = Option<String>;

    fn index(&self, index: usize) -> &Option<String> {
        &self.fields[index]
    }
}

impl From<Vec<Option<String>>> for Row {
    fn from(fields: Vec<Option<String>>) -> Self {
        Row { fields }
    }
}

/// Owns the single outstanding result-set handle of a connection.
struct ResultCursor<'c, D: Driver> {
    driver: &'c mut D,
    result: Option<D::ResultSet>,
}

impl<'c, D: Driver> ResultCursor<'c, D> {
    fn open(conn: &'c mut Connection<D>, template: &QueryTemplate, args: &[Arg]) -> Result<Self> {
        let driver = conn.send(template, args)?;
        let result = driver.use_result();
        Ok(ResultCursor { driver, result })
    }

    fn column_count(&self) -> usize {
        self.result.as_ref().map_or(0, |r| r.num_fields())
    }

    fn fetch(&mut self) -> Option<NativeRow<'_>> {
        self.result.as_mut()?.fetch_row()
    }
}

impl<D: Driver> Drop for ResultCursor<'_, D> {
    fn drop(&mut self) {
        if let Some(mut result) = self.result.take() {
            let mut drained = 0usize;
            while result.fetch_row().is_some() {
                drained += 1;
            }
            if drained > 0 {
                debug!("Discarded {} unread rows", drained);
            }
            self.driver.free_result(result);
        }
    }
}

/// Streaming rows over a live cursor.
///
/// `next` lends out one reused [`Row`] buffer, so a returned row cannot be
/// held across steps; clone it to keep it.
pub struct Rows<'c, D: Driver = SqliteDriver> {
    cursor: ResultCursor<'c, D>,
    row: Row,
}

impl<'c, D: Driver> Rows<'c, D> {
    /// Fetches the next row, `None` once the result set is exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&Row> {
        let native = self.cursor.fetch()?;
        self.row.fill_from(native);
        Some(&self.row)
    }

    pub fn column_count(&self) -> usize {
        self.cursor.column_count()
    }

    /// Adapts the stream into an owning iterator.
    pub fn mapped<F, T>(self, f: F) -> MappedRows<'c, D, F>
    where
        F: FnMut(&Row) -> T,
    {
        MappedRows { rows: self, f }
    }
}

/// Iterator returned by [`Rows::mapped`]
pub struct MappedRows<'c, D: Driver, F> {
    rows: Rows<'c, D>,
    f: F,
}

impl<D: Driver, F, T> Iterator for MappedRows<'_, D, F>
where
    F: FnMut(&Row) -> T,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let row = self.rows.next()?;
        Some((self.f)(row))
    }
}

/// Zero-copy view of the driver's current row buffer.
///
/// Borrowed from the [`InstantRows`] that produced it, so it cannot outlive
/// the iteration step.
#[derive(Debug, Clone, Copy)]
pub struct InstantRow<'r> {
    native: NativeRow<'r>,
    columns: usize,
}

impl<'r> InstantRow<'r> {
    pub fn len(&self) -> usize {
        self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns == 0
    }

    /// Text of column `index`, `None` for NULL. Valid UTF-8 is borrowed.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn get(&self, index: usize) -> Option<Cow<'r, str>> {
        self.bytes(index).map(String::from_utf8_lossy)
    }

    /// Raw bytes of column `index`, `None` for NULL.
    pub fn bytes(&self, index: usize) -> Option<&'r [u8]> {
        assert!(index < self.columns, "column index {} out of range for {} columns", index, self.columns);
        self.native.get(index)
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.bytes(index).is_none()
    }

    /// Copies the view into an owned row.
    pub fn to_row(&self) -> Row {
        Row::from_native(self.native)
    }
}

/// Streaming [`InstantRow`] views over a live cursor.
pub struct InstantRows<'c, D: Driver = SqliteDriver> {
    cursor: ResultCursor<'c, D>,
    columns: Option<DbColumns>,
}

impl<'c, D: Driver> InstantRows<'c, D> {
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<InstantRow<'_>> {
        let columns = self.cursor.column_count();
        let native = self.cursor.fetch()?;
        Some(InstantRow { native, columns })
    }

    pub fn column_count(&self) -> usize {
        self.cursor.column_count()
    }

    /// Column metadata, present when opened through
    /// [`Connection::instant_rows_with_columns`].
    pub fn columns(&self) -> Option<&DbColumns> {
        self.columns.as_ref()
    }
}

impl<D: Driver> Connection<D> {
    /// Streams the rows of a statement.
    ///
    /// # Examples
    ///
    /// ```
    /// use unidb::Connection;
    /// let mut conn = Connection::open("localhost", "", "", ":memory:").unwrap();
    /// let mut rows = conn.rows("SELECT 'a' UNION ALL SELECT NULL", &[]).unwrap();
    /// assert_eq!(rows.next().unwrap().get(0), Some("a"));
    /// assert!(rows.next().unwrap().is_null(0));
    /// assert!(rows.next().is_none());
    /// ```
    pub fn rows(&mut self, template: impl Into<QueryTemplate>, args: &[Arg]) -> Result<Rows<'_, D>> {
        let cursor = ResultCursor::open(self, &template.into(), args)?;
        Ok(Rows {
            cursor,
            row: Row::default(),
        })
    }

    /// Streams zero-copy row views of a statement.
    pub fn instant_rows(&mut self, template: impl Into<QueryTemplate>, args: &[Arg]) -> Result<InstantRows<'_, D>> {
        let cursor = ResultCursor::open(self, &template.into(), args)?;
        Ok(InstantRows { cursor, columns: None })
    }

    /// Like [`Connection::instant_rows`], extracting column metadata before
    /// the first row.
    ///
    /// # Errors
    ///
    /// `DbError::UnmappedType` when the driver reports a type code with no
    /// portable kind.
    pub fn instant_rows_with_columns(
        &mut self,
        template: impl Into<QueryTemplate>,
        args: &[Arg],
    ) -> Result<InstantRows<'_, D>> {
        let cursor = ResultCursor::open(self, &template.into(), args)?;
        let columns = match cursor.result.as_ref() {
            Some(result) => DbColumns::from_result(result)?,
            None => DbColumns::default(),
        };
        Ok(InstantRows {
            cursor,
            columns: Some(columns),
        })
    }

    /// Reads the whole result set into memory.
    pub fn all_rows(&mut self, template: impl Into<QueryTemplate>, args: &[Arg]) -> Result<Vec<Row>> {
        let (_, rows) = self.buffer(&template.into(), args)?;
        Ok(rows)
    }

    /// First row, or a row of NULLs (one per column) when there are no rows.
    pub fn get_row(&mut self, template: impl Into<QueryTemplate>, args: &[Arg]) -> Result<Row> {
        let (column_count, rows) = self.buffer(&template.into(), args)?;
        Ok(rows.into_iter().next().unwrap_or_else(|| Row::nulls(column_count)))
    }

    /// First column of the first row; `None` when that field is NULL, an
    /// empty string when there are no rows.
    pub fn get_value(&mut self, template: impl Into<QueryTemplate>, args: &[Arg]) -> Result<Option<String>> {
        let (_, rows) = self.buffer(&template.into(), args)?;
        let value = rows
            .into_iter()
            .next()
            .and_then(|row| row.into_fields().into_iter().next())
            .unwrap_or_else(|| Some(String::new()));
        Ok(value)
    }

    /// Runs an INSERT and returns the generated id, or -1 on failure.
    pub fn try_insert_id(&mut self, template: impl Into<QueryTemplate>, args: &[Arg]) -> i64 {
        if !self.try_exec(template, args) {
            return -1;
        }
        match self.driver_mut() {
            Ok(driver) => driver.insert_id(),
            Err(e) => {
                warn!("{}", e);
                -1
            }
        }
    }

    /// Runs an INSERT and returns the generated id.
    ///
    /// # Errors
    ///
    /// `DbError::Database` with the driver's error text.
    pub fn insert_id(&mut self, template: impl Into<QueryTemplate>, args: &[Arg]) -> Result<i64> {
        self.exec(template, args)?;
        Ok(self.driver_mut()?.insert_id())
    }

    /// Runs a statement and returns the number of rows it changed.
    pub fn exec_affected_rows(&mut self, template: impl Into<QueryTemplate>, args: &[Arg]) -> Result<u64> {
        self.exec(template, args)?;
        Ok(self.driver_mut()?.affected_rows())
    }

    fn buffer(&mut self, template: &QueryTemplate, args: &[Arg]) -> Result<(usize, Vec<Row>)> {
        let mut cursor = ResultCursor::open(self, template, args)?;
        let column_count = cursor.column_count();
        let mut rows = Vec::new();
        while let Some(native) = cursor.fetch() {
            rows.push(Row::from_native(native));
        }
        Ok((column_count, rows))
    }
}
