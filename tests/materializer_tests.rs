//! End-to-end tests of the public database-access surface against the
//! embedded SQLite driver.

use unidb::{args, Connection, ConnectionTarget, DbError, DbTypeKind, Row, NULL};

fn sample_connection() -> Connection {
    let mut conn = Connection::open("localhost", "test", "", ":memory:").unwrap();
    conn.exec(
        "CREATE TABLE people (
            id INTEGER PRIMARY KEY,
            name VARCHAR(40) NOT NULL,
            city TEXT,
            born DATE
        )",
        &[],
    )
    .unwrap();
    for (name, city, born) in [
        ("Ada", Some("London"), Some("1815-12-10")),
        ("Grace", Some(""), None),
        ("O'Brien", None, None),
    ] {
        conn.exec("INSERT INTO people (name, city, born) VALUES (?, ?, ?)", &args![name, city, born])
            .unwrap();
    }
    conn
}

#[test]
fn test_abandoned_streaming_then_next_statement() {
    let mut conn = sample_connection();

    for _ in 0..3 {
        let mut rows = conn.rows("SELECT name FROM people ORDER BY id", &[]).unwrap();
        let first = rows.next().unwrap();
        assert_eq!(first.get(0), Some("Ada"));
        // dropped with two unread rows
    }

    {
        let mut rows = conn.instant_rows("SELECT * FROM people", &[]).unwrap();
        assert!(rows.next().is_some());
    }

    let id = conn.insert_id("INSERT INTO people (name) VALUES (?)", &args!["Linus"]).unwrap();
    assert_eq!(id, 4);
    assert_eq!(conn.all_rows("SELECT * FROM people", &[]).unwrap().len(), 4);
}

#[test]
fn test_stream_abandoned_by_error_propagation() {
    fn first_with_city(conn: &mut Connection) -> unidb::Result<String> {
        let mut rows = conn.rows("SELECT name, city FROM people ORDER BY id", &[])?;
        while let Some(row) = rows.next() {
            if row.is_null(1) {
                return Err(DbError::Database(format!("{} has no city", row.get(0).unwrap_or_default())));
            }
        }
        Ok(String::new())
    }

    let mut conn = sample_connection();
    assert!(first_with_city(&mut conn).is_err());
    assert!(conn.try_exec("DELETE FROM people WHERE city IS NULL", &[]));
    assert_eq!(first_with_city(&mut conn).unwrap(), "");
}

#[test]
fn test_null_and_empty_string_are_distinct() {
    let mut conn = sample_connection();
    let rows = conn.all_rows("SELECT city FROM people ORDER BY id", &[]).unwrap();

    assert_eq!(rows[0], Row::new(vec![Some("London".to_string())]));
    assert_eq!(rows[1].get(0), Some(""));
    assert!(!rows[1].is_null(0));
    assert!(rows[2].is_null(0));
}

#[test]
fn test_quoted_argument_round_trips() {
    let mut conn = sample_connection();
    let name = conn
        .get_value("SELECT name FROM people WHERE name = ?", &args!["O'Brien"])
        .unwrap();
    assert_eq!(name.as_deref(), Some("O'Brien"));

    let injected = conn
        .all_rows("SELECT name FROM people WHERE name = ?", &args!["x' OR '1'='1"])
        .unwrap();
    assert!(injected.is_empty());
}

#[test]
fn test_zero_row_conventions() {
    let mut conn = sample_connection();
    let sql = "SELECT id, name, city, born FROM people WHERE name = ?";

    let row = conn.get_row(sql, &args!["nobody"]).unwrap();
    assert_eq!(row.len(), 4);
    assert!(row.iter().all(|f| f.is_none()));

    assert!(conn.all_rows(sql, &args!["nobody"]).unwrap().is_empty());
    assert_eq!(conn.get_value(sql, &args!["nobody"]).unwrap(), Some(String::new()));
}

#[test]
fn test_non_select_statements_yield_no_rows() {
    let mut conn = sample_connection();
    let mut rows = conn.rows("UPDATE people SET city = ? WHERE id = 1", &args!["Paris"]).unwrap();
    assert_eq!(rows.column_count(), 0);
    assert!(rows.next().is_none());
    drop(rows);

    assert_eq!(conn.get_row("DELETE FROM people WHERE id = 99", &[]).unwrap(), Row::default());
    assert_eq!(
        conn.get_value("SELECT city FROM people WHERE id = 1", &[]).unwrap().as_deref(),
        Some("Paris")
    );
}

#[test]
fn test_insert_id_tiers() {
    let mut conn = sample_connection();
    let failing = "INSERT INTO people (name) VALUES (?)";

    assert_eq!(conn.try_insert_id(failing, &[NULL]), -1);
    match conn.insert_id(failing, &[NULL]) {
        Err(DbError::Database(msg)) => assert!(msg.contains("NOT NULL")),
        other => panic!("Expected Database error, got {:?}", other),
    }

    assert_eq!(conn.try_insert_id(failing, &args!["Barbara"]), 4);
}

#[test]
fn test_affected_rows() {
    let mut conn = sample_connection();
    assert_eq!(conn.exec_affected_rows("UPDATE people SET born = NULL", &[]).unwrap(), 3);
    assert_eq!(
        conn.exec_affected_rows("DELETE FROM people WHERE name LIKE ?", &args!["G%"]).unwrap(),
        1
    );
}

#[test]
fn test_column_metadata() {
    let mut conn = sample_connection();
    let mut rows = conn
        .instant_rows_with_columns("SELECT id, name, born, COUNT(*) AS n FROM people", &[])
        .unwrap();

    let columns = rows.columns().cloned().unwrap();
    assert_eq!(columns.len(), 4);
    assert_eq!(columns[0].db_type.kind, DbTypeKind::Int);
    assert!(columns[0].primary_key);
    assert_eq!(columns[1].db_type.kind, DbTypeKind::Varchar);
    assert_eq!(columns[1].db_type.length, 40);
    assert!(columns[1].db_type.not_null);
    assert_eq!(columns[2].db_type.kind, DbTypeKind::Date);
    assert_eq!(columns[2].table, "people");
    assert_eq!(columns[3].db_type.kind, DbTypeKind::Int);
    assert_eq!(columns[3].table, "");

    let row = rows.next().unwrap();
    assert_eq!(row.get(3).as_deref(), Some("3"));
}

#[test]
fn test_aliased_column_metadata() {
    let mut conn = sample_connection();
    let rows = conn
        .instant_rows_with_columns("SELECT city AS id, id FROM people", &[])
        .unwrap();

    let columns = rows.columns().cloned().unwrap();
    assert_eq!(columns[0].name, "id");
    assert_eq!(columns[0].table, "");
    assert!(!columns[0].primary_key);
    assert_eq!(columns[0].db_type.kind, DbTypeKind::Blob);
    assert_eq!(columns[1].table, "people");
    assert!(columns[1].primary_key);
}

#[test]
fn test_insert_id_after_select_is_zero() {
    let mut conn = sample_connection();
    assert_eq!(conn.insert_id("INSERT INTO people (name) VALUES (?)", &args!["Linus"]).unwrap(), 4);
    assert_eq!(conn.insert_id("SELECT name FROM people", &[]).unwrap(), 0);
    assert_eq!(conn.try_insert_id("SELECT name FROM people", &[]), 0);
}

#[test]
fn test_multiple_statements_fail_without_running() {
    let mut conn = sample_connection();
    let err = conn.exec("DELETE FROM people; DROP TABLE people", &[]).unwrap_err();
    assert!(matches!(err, DbError::Database(_)));
    assert!(!conn.try_exec("DELETE FROM people; DELETE FROM people", &[]));
    assert_eq!(conn.get_value("SELECT COUNT(*) FROM people", &[]).unwrap().as_deref(), Some("3"));

    assert!(matches!(conn.exec("  ", &[]), Err(DbError::Database(m)) if m == "Query was empty"));
}

#[test]
fn test_transactions_pass_through() {
    let mut conn = sample_connection();
    conn.exec("BEGIN", &[]).unwrap();
    conn.exec("DELETE FROM people", &[]).unwrap();
    conn.exec("ROLLBACK", &[]).unwrap();
    assert_eq!(conn.get_value("SELECT COUNT(*) FROM people", &[]).unwrap().as_deref(), Some("3"));
}

#[test]
fn test_closed_connection() {
    let mut conn = sample_connection();
    conn.close();
    conn.close();

    assert!(matches!(conn.exec("SELECT 1", &[]), Err(DbError::NotConnected)));
    assert!(matches!(conn.get_row("SELECT 1", &[]), Err(DbError::NotConnected)));
    assert!(!conn.try_exec("SELECT 1", &[]));
    assert!(!conn.set_encoding("utf8"));
}

#[test]
fn test_descriptor_parsing_example() {
    let target = ConnectionTarget::parse("db.example.com:3307").unwrap();
    assert_eq!(target.host, "db.example.com");
    assert_eq!(target.port, 3307);

    let conn = Connection::open("db.example.com:3307", "app", "secret", ":memory:").unwrap();
    assert!(conn.is_open());
}
