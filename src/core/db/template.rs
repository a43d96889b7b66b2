/// Query Template Module
///
/// Parameterized SQL with positional `?` placeholders, and the formatter that
/// turns a template plus arguments into executable SQL text.

use crate::core::{DbError, Result};
use std::fmt;

/// One stringified statement argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Substituted as the bare token `NULL`
    Null,
    /// Substituted as a quoted, escaped literal
    Text(String),
}

/// The NULL sentinel argument.
pub const NULL: Arg = Arg::Null;

impl Arg {
    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Null)
    }

    fn write_literal(&self, sql: &mut String) {
        match self {
            Arg::Null => sql.push_str("NULL"),
            Arg::Text(text) => {
                sql.reserve(text.len() + 2);
                sql.push('\'');
                for ch in text.chars() {
                    if ch == '\'' {
                        sql.push('\'');
                    }
                    sql.push(ch);
                }
                sql.push('\'');
            }
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Text(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Text(value)
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Arg::Text(value.clone())
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Text(if value { "1" } else { "0" }.to_string())
    }
}

macro_rules! arg_from_display {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Text(value.to_string())
                }
            }
        )*
    };
}

arg_from_display!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Arg::Null, Into::into)
    }
}

/// Builds a `Vec<Arg>` from heterogeneous values.
///
/// ```
/// use unidb::{args, Arg};
/// let values = args!["O'Brien", 42, None::<&str>];
/// assert_eq!(values[2], Arg::Null);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Arg>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Arg::from($value)),+]
    };
}

/// An immutable SQL string with zero or more `?` placeholders.
///
/// Every `?` is a placeholder; keeping `?` out of literals in the template
/// text is up to the author.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryTemplate {
    sql: String,
}

impl QueryTemplate {
    pub fn new(sql: impl Into<String>) -> Self {
        QueryTemplate { sql: sql.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.sql
    }

    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }

    /// Substitutes `args` positionally.
    ///
    /// # Panics
    ///
    /// Panics if the argument count differs from the placeholder count. Use
    /// [`QueryTemplate::try_format`] to get an error instead.
    pub fn format(&self, args: &[Arg]) -> String {
        match self.try_format(args) {
            Ok(sql) => sql,
            Err(e) => panic!("{}: {:?}", e, self.sql),
        }
    }

    /// Substitutes `args` positionally, reporting a count mismatch as
    /// `DbError::Placeholder`.
    pub fn try_format(&self, args: &[Arg]) -> Result<String> {
        let expected = self.placeholder_count();
        if expected != args.len() {
            return Err(DbError::Placeholder {
                expected,
                given: args.len(),
            });
        }

        let mut sql = String::with_capacity(self.sql.len() + args.len() * 8);
        let mut pieces = self.sql.split('?');
        if let Some(head) = pieces.next() {
            sql.push_str(head);
        }
        for (piece, arg) in pieces.zip(args) {
            arg.write_literal(&mut sql);
            sql.push_str(piece);
        }
        Ok(sql)
    }
}

impl fmt::Display for QueryTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

impl From<&str> for QueryTemplate {
    fn from(sql: &str) -> Self {
        QueryTemplate::new(sql)
    }
}

impl From<String> for QueryTemplate {
    fn from(sql: String) -> Self {
        QueryTemplate::new(sql)
    }
}

impl AsRef<str> for QueryTemplate {
    fn as_ref(&self) -> &str {
        &self.sql
    }
}
