/// SQLite Driver Module
///
/// An embedded driver that speaks the native cursor protocol on top of
/// rusqlite. A row-returning statement becomes the pending result when it is
/// sent; the caller claims it with `use_result`, walks it with `fetch_row`
/// and must hand it back with `free_result` before the next statement, just
/// as with a network server streaming rows over one socket.

use crate::core::db::driver::{field_flags, Driver, NativeField, NativeResult, NativeRow, NativeType};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection as SqliteConnection};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, error};

const OUT_OF_SYNC: &str = "Commands out of sync; you can't run this command now";
const NOT_CONNECTED: &str = "Not connected to a database";

/// `VARCHAR(40)`, `DECIMAL(10, 2)`, `INT UNSIGNED`, `ENUM('a','b')`
static DECLARED_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9_ ]*?)\s*(?:\((.*)\))?\s*(UNSIGNED)?\s*$")
        .expect("declared type pattern is valid")
});

/// Single-table `SELECT ... FROM t [alias] [WHERE|ORDER|GROUP|LIMIT|HAVING ...]`
static SINGLE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)^\s*SELECT\b.+?\bFROM\s+[`"\[]?([A-Za-z_][A-Za-z0-9_]*)[`"\]]?\s*(?:(?:AS\s+)?[A-Za-z_][A-Za-z0-9_]*\s*)?(?:$|;|\b(?:WHERE|ORDER|GROUP|LIMIT|HAVING)\b)"#,
    )
    .expect("single table pattern is valid")
});

/// Select list of a `SELECT`, up to the first `FROM`
static SELECT_LIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*SELECT\s+(?:DISTINCT\s+|ALL\s+)?(.+?)\s+FROM\b").expect("select list pattern is valid")
});

/// Trailing alias of a select-list item: `expr AS name` or `expr name`
static ITEM_ALIAS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)^.+?\s(?:AS\s+)?[`"\[]?([A-Za-z_][A-Za-z0-9_]*)[`"\]]?$"#).expect("alias pattern is valid")
});

/// Statement classification used for insert-id bookkeeping
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementType {
    Select,
    Insert,
    Replace,
    Update,
    Delete,
    Other,
}

impl StatementType {
    pub fn from_sql(sql: &str) -> Self {
        let sql_upper = sql.trim_start().to_uppercase();

        if sql_upper.starts_with("SELECT") {
            StatementType::Select
        } else if sql_upper.starts_with("INSERT") {
            StatementType::Insert
        } else if sql_upper.starts_with("REPLACE") {
            StatementType::Replace
        } else if sql_upper.starts_with("UPDATE") {
            StatementType::Update
        } else if sql_upper.starts_with("DELETE") {
            StatementType::Delete
        } else {
            StatementType::Other
        }
    }
}

/// Result set produced by a row-returning statement
#[derive(Debug)]
pub struct SqliteResult {
    fields: Vec<NativeField>,
    rows: VecDeque<Vec<Option<Vec<u8>>>>,
    current: Option<Vec<Option<Vec<u8>>>>,
}

impl NativeResult for SqliteResult {
    fn num_fields(&self) -> usize {
        self.fields.len()
    }

    fn fetch_row(&mut self) -> Option<NativeRow<'_>> {
        self.current = self.rows.pop_front();
        self.current.as_deref().map(NativeRow::new)
    }

    fn fetch_field_direct(&self, index: usize) -> Option<NativeField> {
        self.fields.get(index).cloned()
    }
}

enum Outcome {
    Rows(SqliteResult),
    Changed { rows: u64, insert_id: i64 },
}

#[derive(Debug, Error)]
enum StatementError {
    #[error("Query was empty")]
    Empty,
    #[error("Only one statement per query is allowed")]
    Multiple,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Declared type and constraints of one table column
#[derive(Debug)]
struct TableColumn {
    declared: String,
    not_null: bool,
    primary_key: bool,
}

/// Driver session over one SQLite database file (or `:memory:`)
#[derive(Debug, Default)]
pub struct SqliteDriver {
    conn: Option<SqliteConnection>,
    /// Result of the last statement, not yet claimed by `use_result`
    pending: Option<SqliteResult>,
    /// A claimed result has not been freed yet
    outstanding: bool,
    last_error: String,
    insert_id: i64,
    affected_rows: u64,
    encoding: Option<String>,
}

impl SqliteDriver {
    pub fn new() -> Self {
        SqliteDriver::default()
    }

    /// Encoding applied by the last successful `set_character_set`
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    fn busy(&mut self) -> bool {
        if self.pending.is_some() || self.outstanding {
            self.last_error = OUT_OF_SYNC.to_string();
            true
        } else {
            false
        }
    }
}

impl Driver for SqliteDriver {
    type ResultSet = SqliteResult;

    fn real_connect(&mut self, host: &str, user: &str, _password: &str, database: &str, port: u16) -> bool {
        debug!(host, user, port, database, "opening sqlite database");
        let conn = match SqliteConnection::open(database) {
            Ok(conn) => conn,
            Err(e) => {
                self.last_error = e.to_string();
                return false;
            }
        };

        if let Err(e) = conn.execute_batch("PRAGMA foreign_keys = ON;") {
            self.last_error = e.to_string();
            return false;
        }

        self.conn = Some(conn);
        self.pending = None;
        self.outstanding = false;
        self.last_error.clear();
        true
    }

    fn real_query(&mut self, sql: &str) -> bool {
        if self.busy() {
            return false;
        }
        let conn = match self.conn.as_ref() {
            Some(conn) => conn,
            None => {
                self.last_error = NOT_CONNECTED.to_string();
                return false;
            }
        };

        match run_statement(conn, sql) {
            Ok(Outcome::Rows(result)) => {
                self.affected_rows = result.rows.len() as u64;
                self.insert_id = 0;
                self.pending = Some(result);
            }
            Ok(Outcome::Changed { rows, insert_id }) => {
                self.affected_rows = rows;
                self.insert_id = insert_id;
            }
            Err(e) => {
                self.last_error = e.to_string();
                return false;
            }
        }
        self.last_error.clear();
        true
    }

    fn use_result(&mut self) -> Option<SqliteResult> {
        let result = self.pending.take();
        if result.is_some() {
            self.outstanding = true;
        }
        result
    }

    fn free_result(&mut self, result: SqliteResult) {
        self.outstanding = false;
        drop(result);
    }

    fn insert_id(&self) -> i64 {
        self.insert_id
    }

    fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    fn error(&self) -> String {
        self.last_error.clone()
    }

    fn close(&mut self) {
        self.pending = None;
        self.outstanding = false;
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                error!("Failed to close sqlite database: {}", e);
            }
        }
    }

    fn set_character_set(&mut self, name: &str) -> bool {
        let encoding = match name.to_ascii_lowercase().as_str() {
            "utf8" | "utf8mb3" | "utf8mb4" | "utf-8" => "UTF-8",
            "utf16" | "utf-16" => "UTF-16",
            "utf16le" | "utf-16le" => "UTF-16le",
            "utf16be" | "utf-16be" => "UTF-16be",
            _ => {
                self.last_error = format!("Can't initialize character set {}", name);
                return false;
            }
        };
        if self.busy() {
            return false;
        }
        let conn = match self.conn.as_ref() {
            Some(conn) => conn,
            None => {
                self.last_error = NOT_CONNECTED.to_string();
                return false;
            }
        };

        // Ignored by SQLite once the database file has content.
        match conn.execute_batch(&format!("PRAGMA encoding = '{}';", encoding)) {
            Ok(()) => {
                self.encoding = Some(encoding.to_string());
                true
            }
            Err(e) => {
                self.last_error = e.to_string();
                false
            }
        }
    }
}

fn run_statement(conn: &SqliteConnection, sql: &str) -> Result<Outcome, StatementError> {
    let mut batch = Batch::new(conn, sql);
    let mut stmt = batch.next()?.ok_or(StatementError::Empty)?;
    if batch.next()?.is_some() {
        return Err(StatementError::Multiple);
    }
    let column_count = stmt.column_count();

    if column_count == 0 {
        let changed = stmt.execute([])?;
        let insert_id = match StatementType::from_sql(sql) {
            StatementType::Insert | StatementType::Replace if changed > 0 => conn.last_insert_rowid(),
            _ => 0,
        };
        return Ok(Outcome::Changed {
            rows: changed as u64,
            insert_id,
        });
    }

    let declared: Vec<(String, Option<String>)> = stmt
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
        .collect();

    let mut rows = VecDeque::new();
    let mut first_types = vec![NativeType::Null; column_count];
    let mut widths = vec![0u64; column_count];
    {
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut buffer = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value = row.get_ref(i)?;
                if rows.is_empty() {
                    first_types[i] = value_type(value);
                }
                let bytes = value_bytes(value);
                if let Some(b) = &bytes {
                    widths[i] = widths[i].max(b.len() as u64);
                }
                buffer.push(bytes);
            }
            rows.push_back(buffer);
        }
    }

    let table = single_table(sql);
    let (table_info, aliased) = match table {
        Some(name) => {
            let names: Vec<&str> = declared.iter().map(|(name, _)| name.as_str()).collect();
            (table_columns(conn, name).unwrap_or_default(), aliased_columns(sql, &names))
        }
        None => (HashMap::new(), vec![false; column_count]),
    };

    let fields = declared
        .into_iter()
        .enumerate()
        .map(|(i, (name, decl))| match decl {
            Some(decl) => {
                // Only a plain reference to the table column carries its constraints
                let key = name.to_ascii_lowercase();
                let constraints = table_info
                    .get(&key)
                    .filter(|column| column.declared.eq_ignore_ascii_case(decl.trim()) && !aliased[i])
                    .map(|column| (column.not_null, column.primary_key));
                describe_declared(name, &decl, table.filter(|_| constraints.is_some()), constraints)
            }
            None => NativeField {
                name,
                table: String::new(),
                field_type: first_types[i] as u8,
                flags: 0,
                max_length: widths[i],
            },
        })
        .collect();

    Ok(Outcome::Rows(SqliteResult {
        fields,
        rows,
        current: None,
    }))
}

fn value_type(value: ValueRef<'_>) -> NativeType {
    match value {
        ValueRef::Null => NativeType::Null,
        ValueRef::Integer(_) => NativeType::LongLong,
        ValueRef::Real(_) => NativeType::Double,
        ValueRef::Text(_) => NativeType::VarString,
        ValueRef::Blob(_) => NativeType::Blob,
    }
}

fn value_bytes(value: ValueRef<'_>) -> Option<Vec<u8>> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string().into_bytes()),
        ValueRef::Real(f) => Some(f.to_string().into_bytes()),
        ValueRef::Text(t) => Some(t.to_vec()),
        ValueRef::Blob(b) => Some(b.to_vec()),
    }
}

/// Table name when `sql` reads from exactly one table.
fn single_table(sql: &str) -> Option<&str> {
    SINGLE_TABLE
        .captures(sql)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// For each result column, whether the select list names it through an alias.
///
/// Items map to columns by position unless a `*` expands the list, in which
/// case any column sharing a name with an alias counts as aliased.
fn aliased_columns(sql: &str, names: &[&str]) -> Vec<bool> {
    let items = match SELECT_LIST.captures(sql).and_then(|caps| caps.get(1)) {
        Some(m) => select_items(m.as_str()),
        None => return vec![false; names.len()],
    };
    let aliases: Vec<Option<String>> = items
        .iter()
        .map(|item| {
            ITEM_ALIAS
                .captures(item)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_ascii_lowercase())
        })
        .collect();

    if aliases.len() == names.len() && !items.iter().any(|item| item.ends_with('*')) {
        aliases.iter().map(Option::is_some).collect()
    } else {
        let aliases: HashSet<String> = aliases.into_iter().flatten().collect();
        names
            .iter()
            .map(|name| aliases.contains(&name.to_ascii_lowercase()))
            .collect()
    }
}

/// Splits a select list on commas outside parentheses and quotes.
fn select_items(list: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                items.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(list[start..].trim());
    items
}

/// Lowercased column name to declared type and constraints for `table`.
fn table_columns(conn: &SqliteConnection, table: &str) -> rusqlite::Result<HashMap<String, TableColumn>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info('{}')", table.replace('\'', "''")))?;
    let column_iter = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(1)?.to_ascii_lowercase(),
            TableColumn {
                declared: row.get::<_, String>(2)?.trim().to_string(),
                not_null: row.get::<_, bool>(3)?,
                primary_key: row.get::<_, i64>(5)? > 0, // pk position
            },
        ))
    })?;

    let mut columns = HashMap::new();
    for column_result in column_iter {
        let (name, column) = column_result?;
        columns.insert(name, column);
    }
    Ok(columns)
}

fn describe_declared(name: String, decl: &str, table: Option<&str>, constraints: Option<(bool, bool)>) -> NativeField {
    let (native, max_length, mut flags) = declared_type(decl);

    if let Some((notnull, pk)) = constraints {
        if notnull {
            flags |= field_flags::NOT_NULL;
        }
        if pk {
            flags |= field_flags::PRI_KEY;
            // INTEGER PRIMARY KEY aliases the rowid
            if decl.trim().eq_ignore_ascii_case("INTEGER") {
                flags |= field_flags::NOT_NULL | field_flags::AUTO_INCREMENT;
            }
        }
    }

    NativeField {
        name,
        table: table.unwrap_or_default().to_string(),
        field_type: native as u8,
        flags,
        max_length,
    }
}

/// Native type, display width and flags for a declared column type.
fn declared_type(decl: &str) -> (NativeType, u64, u32) {
    let caps = match DECLARED_TYPE.captures(decl) {
        Some(caps) => caps,
        None => return affinity_type(decl),
    };
    let base = caps[1].split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
    let params = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    let numbers: Vec<u64> = params.split(',').filter_map(|p| p.trim().parse().ok()).collect();
    let first = numbers.first().copied();
    let unsigned = if caps.get(3).is_some() { field_flags::UNSIGNED } else { 0 };
    let num = field_flags::NUM | unsigned;

    match base.as_str() {
        "TINYINT" | "BOOL" | "BOOLEAN" => (NativeType::Tiny, first.unwrap_or(4), num),
        "SMALLINT" => (NativeType::Short, first.unwrap_or(6), num),
        "MEDIUMINT" => (NativeType::Int24, first.unwrap_or(9), num),
        "INT" | "INTEGER" => (NativeType::Long, first.unwrap_or(11), num),
        "BIGINT" | "INT8" | "UNSIGNED BIG INT" => (NativeType::LongLong, first.unwrap_or(20), num),
        "DECIMAL" | "NUMERIC" => (NativeType::NewDecimal, first.unwrap_or(10) + 2, num),
        "FLOAT" => (NativeType::Float, first.unwrap_or(12), num),
        "DOUBLE" | "DOUBLE PRECISION" | "REAL" => (NativeType::Double, first.unwrap_or(22), num),
        "DATE" => (NativeType::Date, 10, 0),
        "TIME" => (NativeType::Time, 10, 0),
        "DATETIME" => (NativeType::DateTime, 19, 0),
        "TIMESTAMP" => (NativeType::Timestamp, 19, field_flags::TIMESTAMP),
        "YEAR" => (NativeType::Year, 4, num),
        "CHAR" | "CHARACTER" | "NCHAR" => (NativeType::String, first.unwrap_or(1), 0),
        "VARCHAR" | "CHARACTER VARYING" | "VARYING CHARACTER" | "NVARCHAR" | "NATIVE CHARACTER" => {
            (NativeType::VarString, first.unwrap_or(255), 0)
        }
        "TINYTEXT" => (NativeType::TinyBlob, 255, field_flags::BLOB),
        "TEXT" | "CLOB" => (NativeType::Blob, 65535, field_flags::BLOB),
        "MEDIUMTEXT" => (NativeType::MediumBlob, 16_777_215, field_flags::BLOB),
        "LONGTEXT" => (NativeType::LongBlob, 4_294_967_295, field_flags::BLOB),
        "TINYBLOB" => (NativeType::TinyBlob, 255, field_flags::BLOB | field_flags::BINARY),
        "BLOB" => (NativeType::Blob, 65535, field_flags::BLOB | field_flags::BINARY),
        "MEDIUMBLOB" => (NativeType::MediumBlob, 16_777_215, field_flags::BLOB | field_flags::BINARY),
        "LONGBLOB" => (NativeType::LongBlob, 4_294_967_295, field_flags::BLOB | field_flags::BINARY),
        "JSON" => (NativeType::Json, 4_294_967_295, field_flags::BLOB | field_flags::BINARY),
        "BIT" => (NativeType::Bit, first.unwrap_or(1), field_flags::UNSIGNED),
        "ENUM" => {
            let width = members(params).map(str::len).max().unwrap_or(0);
            (NativeType::Enum, width as u64, field_flags::ENUM)
        }
        "SET" => {
            let lens: Vec<usize> = members(params).map(str::len).collect();
            let width = lens.iter().sum::<usize>() + lens.len().saturating_sub(1);
            (NativeType::Set, width as u64, field_flags::SET)
        }
        "GEOMETRY" | "POINT" | "LINESTRING" | "POLYGON" => {
            (NativeType::Geometry, 4_294_967_295, field_flags::BLOB | field_flags::BINARY)
        }
        _ => affinity_type(&base),
    }
}

fn members(params: &str) -> impl Iterator<Item = &str> {
    params
        .split(',')
        .map(|m| m.trim().trim_matches('\''))
        .filter(|m| !m.is_empty())
}

/// Falls back to SQLite's column affinity rules for unfamiliar type names.
fn affinity_type(decl: &str) -> (NativeType, u64, u32) {
    let upper = decl.to_ascii_uppercase();
    if upper.contains("INT") {
        (NativeType::LongLong, 20, field_flags::NUM)
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        (NativeType::VarString, 255, 0)
    } else if upper.contains("BLOB") || upper.is_empty() {
        (NativeType::Blob, 65535, field_flags::BLOB | field_flags::BINARY)
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        (NativeType::Double, 22, field_flags::NUM)
    } else {
        (NativeType::NewDecimal, 12, field_flags::NUM)
    }
}
