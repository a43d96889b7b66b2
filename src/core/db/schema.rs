/// Column Metadata Module
///
/// This module maps native field descriptors onto a portable column-type
/// description. The mapping from native type code to kind and byte size is
/// a fixed table; codes with no entry are reported as
/// `DbError::UnmappedType` rather than defaulted.

use crate::core::db::driver::{field_flags, NativeField, NativeResult, NativeType};
use crate::core::{DbError, Result};
use serde::Serialize;
use std::fmt;
use std::ops::Deref;

/// Portable column kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DbTypeKind {
    Decimal,
    Int,
    Float,
    Null,
    Timestamp,
    Date,
    Time,
    Datetime,
    Varchar,
    Bit,
    Enum,
    Set,
    Blob,
    Geometry,
}

impl DbTypeKind {
    /// Kind and storage size in bytes for a native type. Variable-width
    /// types report 0.
    pub fn from_native(native: NativeType) -> (DbTypeKind, usize) {
        match native {
            NativeType::Decimal | NativeType::NewDecimal => (DbTypeKind::Decimal, 0),
            NativeType::Tiny => (DbTypeKind::Int, 1),
            NativeType::Short => (DbTypeKind::Int, 2),
            NativeType::Int24 => (DbTypeKind::Int, 3),
            NativeType::Long => (DbTypeKind::Int, 4),
            NativeType::LongLong => (DbTypeKind::Int, 8),
            NativeType::Year => (DbTypeKind::Int, 1),
            NativeType::Float => (DbTypeKind::Float, 4),
            NativeType::Double => (DbTypeKind::Float, 8),
            NativeType::Null => (DbTypeKind::Null, 0),
            NativeType::Timestamp | NativeType::Timestamp2 => (DbTypeKind::Timestamp, 4),
            NativeType::Date | NativeType::NewDate => (DbTypeKind::Date, 3),
            NativeType::Time | NativeType::Time2 => (DbTypeKind::Time, 3),
            NativeType::DateTime | NativeType::DateTime2 => (DbTypeKind::Datetime, 8),
            NativeType::VarChar | NativeType::VarString | NativeType::String => (DbTypeKind::Varchar, 0),
            NativeType::Bit => (DbTypeKind::Bit, 8),
            NativeType::Enum => (DbTypeKind::Enum, 2),
            NativeType::Set => (DbTypeKind::Set, 8),
            NativeType::TinyBlob
            | NativeType::MediumBlob
            | NativeType::LongBlob
            | NativeType::Blob
            | NativeType::Json => (DbTypeKind::Blob, 0),
            NativeType::Geometry => (DbTypeKind::Geometry, 0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DbTypeKind::Decimal => "decimal",
            DbTypeKind::Int => "int",
            DbTypeKind::Float => "float",
            DbTypeKind::Null => "null",
            DbTypeKind::Timestamp => "timestamp",
            DbTypeKind::Date => "date",
            DbTypeKind::Time => "time",
            DbTypeKind::Datetime => "datetime",
            DbTypeKind::Varchar => "varchar",
            DbTypeKind::Bit => "bit",
            DbTypeKind::Enum => "enum",
            DbTypeKind::Set => "set",
            DbTypeKind::Blob => "blob",
            DbTypeKind::Geometry => "geometry",
        }
    }
}

impl fmt::Display for DbTypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Portable type descriptor of one result column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DbType {
    pub kind: DbTypeKind,
    /// Storage size in bytes, 0 for variable-width kinds
    pub size: usize,
    /// Maximum representable length (display width)
    pub length: u64,
    pub not_null: bool,
}

impl DbType {
    pub fn from_native(field: &NativeField) -> Result<Self> {
        let native = NativeType::try_from(field.field_type)?;
        let (kind, size) = DbTypeKind::from_native(native);
        Ok(DbType {
            kind,
            size,
            length: field.max_length,
            not_null: field.has_flag(field_flags::NOT_NULL),
        })
    }
}

/// Metadata of one result column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbColumn {
    pub name: String,
    /// Owning table, empty for computed columns
    pub table: String,
    pub primary_key: bool,
    pub db_type: DbType,
}

impl DbColumn {
    pub fn from_native(field: &NativeField) -> Result<Self> {
        Ok(DbColumn {
            name: field.name.clone(),
            table: field.table.clone(),
            primary_key: field.has_flag(field_flags::PRI_KEY),
            db_type: DbType::from_native(field)?,
        })
    }
}

/// Ordered column metadata of a result set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DbColumns {
    columns: Vec<DbColumn>,
}

impl DbColumns {
    pub fn new(columns: Vec<DbColumn>) -> Self {
        DbColumns { columns }
    }

    /// Extracts the descriptor of every field of `result`.
    pub fn from_result<R: NativeResult>(result: &R) -> Result<Self> {
        let count = result.num_fields();
        let mut columns = Vec::with_capacity(count);
        for index in 0..count {
            let field = result
                .fetch_field_direct(index)
                .ok_or_else(|| DbError::Database(format!("no metadata for field {}", index)))?;
            columns.push(DbColumn::from_native(&field)?);
        }
        Ok(DbColumns { columns })
    }

    pub fn by_name(&self, name: &str) -> Option<&DbColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn into_inner(self) -> Vec<DbColumn> {
        self.columns
    }
}

impl Deref for DbColumns {
    type Target = [DbColumn];

    fn deref(&self) -> &[DbColumn] {
        &self.columns
    }
}

impl<'a> IntoIterator for &'a DbColumns {
    type Item = &'a DbColumn;
    type IntoIter = std::slice::Iter<'a, DbColumn>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
