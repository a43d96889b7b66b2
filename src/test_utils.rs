/// # Test Utilities Module
///
/// Shared fixtures for unit tests: isolated in-memory databases with a small
/// sample schema, plus helpers for asserting on `DbError` values.

use crate::args;
use crate::core::db::driver::{Driver, NativeField, NativeResult, NativeRow};
use crate::core::Result;
use crate::Connection;
use std::collections::VecDeque;

/// Isolated in-memory database test fixture
pub struct DatabaseFixture {
    pub connection: Connection,
}

impl DatabaseFixture {
    /// Create a new empty in-memory database
    pub fn new() -> Result<Self> {
        let connection = Connection::open("localhost", "test", "", ":memory:")?;
        Ok(DatabaseFixture { connection })
    }

    /// Create fixture with sample data schema
    pub fn with_sample_data() -> Result<Self> {
        let mut fixture = Self::new()?;
        fixture.setup_standard_schema()?;
        fixture.populate_sample_data()?;
        Ok(fixture)
    }

    /// Set up standard test schema
    pub fn setup_standard_schema(&mut self) -> Result<()> {
        self.connection.exec(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                username VARCHAR(32) NOT NULL UNIQUE,
                nickname TEXT,
                score REAL
            )",
            &[],
        )
    }

    /// Populate with rows covering text, empty string, NULL and quotes
    pub fn populate_sample_data(&mut self) -> Result<()> {
        let users = vec![
            ("alice", Some("Al"), Some(1.5)),
            ("bob", Some(""), Some(2.25)),
            ("o'connor", None, None),
        ];

        for (username, nickname, score) in users {
            self.connection.exec(
                "INSERT INTO users (username, nickname, score) VALUES (?, ?, ?)",
                &args![username, nickname, score],
            )?;
        }
        Ok(())
    }
}

/// In-process driver that replays one canned result set for every statement
/// and records what it was asked to do
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    /// Host and port received by `real_connect`
    pub connected_to: Option<(String, u16)>,
    pub statements: Vec<String>,
    pub fields: Vec<NativeField>,
    pub rows: Vec<Vec<Option<Vec<u8>>>>,
    /// Handles given out and not yet freed
    pub outstanding: usize,
    /// Unread rows left in each handle when it was freed
    pub unread_at_free: Vec<usize>,
    pending: bool,
}

impl ScriptedDriver {
    pub fn returning(fields: Vec<NativeField>, rows: Vec<Vec<Option<Vec<u8>>>>) -> Self {
        ScriptedDriver {
            fields,
            rows,
            ..ScriptedDriver::default()
        }
    }
}

#[derive(Debug)]
pub struct ScriptedResult {
    fields: Vec<NativeField>,
    rows: VecDeque<Vec<Option<Vec<u8>>>>,
    current: Option<Vec<Option<Vec<u8>>>>,
}

impl NativeResult for ScriptedResult {
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

impl Driver for ScriptedDriver {
    type ResultSet = ScriptedResult;

    fn real_connect(&mut self, host: &str, _user: &str, _password: &str, _database: &str, port: u16) -> bool {
        self.connected_to = Some((host.to_string(), port));
        true
    }

    fn real_query(&mut self, sql: &str) -> bool {
        if self.pending || self.outstanding > 0 {
            return false;
        }
        self.statements.push(sql.to_string());
        self.pending = !self.fields.is_empty();
        true
    }

    fn use_result(&mut self) -> Option<ScriptedResult> {
        if !std::mem::take(&mut self.pending) {
            return None;
        }
        self.outstanding += 1;
        Some(ScriptedResult {
            fields: self.fields.clone(),
            rows: self.rows.iter().cloned().collect(),
            current: None,
        })
    }

    fn free_result(&mut self, result: ScriptedResult) {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.unread_at_free.push(result.rows.len());
    }

    fn insert_id(&self) -> i64 {
        0
    }

    fn affected_rows(&self) -> u64 {
        0
    }

    fn error(&self) -> String {
        if self.pending || self.outstanding > 0 {
            "Commands out of sync; you can't run this command now".to_string()
        } else {
            String::new()
        }
    }

    fn close(&mut self) {
        self.pending = false;
    }

    fn set_character_set(&mut self, _name: &str) -> bool {
        true
    }
}

/// Error testing utilities specific to DbError patterns
pub mod error_testing {
    use std::fmt::Display;

    /// Test that a result is an error whose message contains a fragment
    pub fn assert_error_contains<T, E: Display>(
        result: &std::result::Result<T, E>,
        expected_message_fragment: &str,
        context: &str,
    ) {
        match result {
            Ok(_) => panic!("Expected error but got Ok in {}", context),
            Err(e) => {
                let error_str = e.to_string();
                assert!(
                    error_str.to_lowercase().contains(&expected_message_fragment.to_lowercase()),
                    "Expected '{}' in error message '{}' context: {}",
                    expected_message_fragment,
                    error_str,
                    context
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_data_fixture() {
        let mut fixture = DatabaseFixture::with_sample_data().unwrap();
        let count = fixture.connection.get_value("SELECT COUNT(*) FROM users", &[]).unwrap();
        assert_eq!(count.as_deref(), Some("3"));
    }

    #[test]
    fn test_error_contains() {
        let mut fixture = DatabaseFixture::new().unwrap();
        let result = fixture.connection.exec("SELECT * FROM users", &[]);
        error_testing::assert_error_contains(&result, "no such table", "empty fixture");
    }
}
