/// Driver Boundary Module
///
/// The native driver is an opaque collaborator speaking a cursor-based,
/// row-at-a-time protocol. This module describes that protocol as two traits
/// plus the raw values it hands back: row buffers, field descriptors, type
/// codes and field flags. Everything above this module works against these
/// traits only.

use crate::core::DbError;

/// A live driver session.
///
/// Methods mirror the native client API: status-returning calls report
/// failure as `false` and leave the message in [`Driver::error`].
pub trait Driver {
    /// Result-set handle returned by [`Driver::use_result`]
    type ResultSet: NativeResult;

    /// Establishes the session. `port == 0` means the driver default.
    fn real_connect(&mut self, host: &str, user: &str, password: &str, database: &str, port: u16) -> bool;

    /// Sends one statement.
    fn real_query(&mut self, sql: &str) -> bool;

    /// Claims the unbuffered result of the last statement, if it produced rows.
    fn use_result(&mut self) -> Option<Self::ResultSet>;

    /// Releases a result-set handle.
    fn free_result(&mut self, result: Self::ResultSet);

    /// Id generated by the last INSERT, 0 if none.
    fn insert_id(&self) -> i64;

    /// Rows changed by the last statement.
    fn affected_rows(&self) -> u64;

    /// Error text of the last failed call.
    fn error(&self) -> String;

    fn close(&mut self);

    fn set_character_set(&mut self, name: &str) -> bool;
}

/// A result-set handle owned by whoever called [`Driver::use_result`].
pub trait NativeResult {
    fn num_fields(&self) -> usize;

    /// Advances the cursor. The returned row buffer is only valid until the
    /// next call.
    fn fetch_row(&mut self) -> Option<NativeRow<'_>>;

    fn fetch_field_direct(&self, index: usize) -> Option<NativeField>;
}

/// Zero-copy view of the driver's current row buffer.
#[derive(Debug, Clone, Copy)]
pub struct NativeRow<'r> {
    fields: &'r [Option<Vec<u8>>],
}

impl<'r> NativeRow<'r> {
    pub fn new(fields: &'r [Option<Vec<u8>>]) -> Self {
        NativeRow { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw bytes of a field, `None` for NULL.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn get(&self, index: usize) -> Option<&'r [u8]> {
        self.fields[index].as_deref()
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.fields[index].is_none()
    }
}

/// Native per-field descriptor, as returned by `fetch_field_direct`.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeField {
    pub name: String,
    /// Owning table, empty for expressions
    pub table: String,
    /// Native type code, see [`NativeType`]
    pub field_type: u8,
    /// Bit set of [`field_flags`]
    pub flags: u32,
    /// Maximum display width of the column
    pub max_length: u64,
}

impl NativeField {
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

/// Native field flag bits.
pub mod field_flags {
    pub const NOT_NULL: u32 = 1;
    pub const PRI_KEY: u32 = 2;
    pub const UNIQUE_KEY: u32 = 4;
    pub const MULTIPLE_KEY: u32 = 8;
    pub const BLOB: u32 = 16;
    pub const UNSIGNED: u32 = 32;
    pub const ZEROFILL: u32 = 64;
    pub const BINARY: u32 = 128;
    pub const ENUM: u32 = 256;
    pub const AUTO_INCREMENT: u32 = 512;
    pub const TIMESTAMP: u32 = 1024;
    pub const SET: u32 = 2048;
    pub const NUM: u32 = 32768;
}

/// Native column type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NativeType {
    Decimal = 0,
    Tiny = 1,
    Short = 2,
    Long = 3,
    Float = 4,
    Double = 5,
    Null = 6,
    Timestamp = 7,
    LongLong = 8,
    Int24 = 9,
    Date = 10,
    Time = 11,
    DateTime = 12,
    Year = 13,
    NewDate = 14,
    VarChar = 15,
    Bit = 16,
    Timestamp2 = 17,
    DateTime2 = 18,
    Time2 = 19,
    Json = 245,
    NewDecimal = 246,
    Enum = 247,
    Set = 248,
    TinyBlob = 249,
    MediumBlob = 250,
    LongBlob = 251,
    Blob = 252,
    VarString = 253,
    String = 254,
    Geometry = 255,
}

impl TryFrom<u8> for NativeType {
    type Error = DbError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        let native = match code {
            0 => NativeType::Decimal,
            1 => NativeType::Tiny,
            2 => NativeType::Short,
            3 => NativeType::Long,
            4 => NativeType::Float,
            5 => NativeType::Double,
            6 => NativeType::Null,
            7 => NativeType::Timestamp,
            8 => NativeType::LongLong,
            9 => NativeType::Int24,
            10 => NativeType::Date,
            11 => NativeType::Time,
            12 => NativeType::DateTime,
            13 => NativeType::Year,
            14 => NativeType::NewDate,
            15 => NativeType::VarChar,
            16 => NativeType::Bit,
            17 => NativeType::Timestamp2,
            18 => NativeType::DateTime2,
            19 => NativeType::Time2,
            245 => NativeType::Json,
            246 => NativeType::NewDecimal,
            247 => NativeType::Enum,
            248 => NativeType::Set,
            249 => NativeType::TinyBlob,
            250 => NativeType::MediumBlob,
            251 => NativeType::LongBlob,
            252 => NativeType::Blob,
            253 => NativeType::VarString,
            254 => NativeType::String,
            255 => NativeType::Geometry,
            other => return Err(DbError::UnmappedType(other)),
        };
        Ok(native)
    }
}

impl From<NativeType> for u8 {
    fn from(native: NativeType) -> u8 {
        native as u8
    }
}
