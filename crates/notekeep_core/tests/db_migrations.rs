use notekeep_core::db::migrations::latest_version;
use notekeep_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in ["users", "notes", "tags", "note_tags", "versions"] {
        assert_table_exists(&conn, table);
    }
    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 1);
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notekeep.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    conn_first
        .execute(
            "INSERT INTO users (username, email) VALUES ('ann', 'ann@example.com');",
            [],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let users: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM users;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(users, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn versions_table_ignores_update_and_delete() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO versions (
            entity_type, entity_id, version_number, fields, creator_id, comment, created_us
        ) VALUES ('note', 'n1', 1, '{\"title\":\"A\"}', 1, NULL, 0);",
        [],
    )
    .unwrap();

    let updated = conn
        .execute("UPDATE versions SET fields = '{}' WHERE entity_id = 'n1';", [])
        .unwrap();
    let deleted = conn
        .execute("DELETE FROM versions WHERE entity_id = 'n1';", [])
        .unwrap();
    assert_eq!(updated, 0);
    assert_eq!(deleted, 0);

    let fields: String = conn
        .query_row(
            "SELECT fields FROM versions WHERE entity_id = 'n1';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(fields, "{\"title\":\"A\"}");
}

#[test]
fn versions_reject_non_positive_numbers() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO versions (
            entity_type, entity_id, version_number, fields, creator_id, comment, created_us
        ) VALUES ('note', 'n1', 0, '{}', 1, NULL, 0);",
        [],
    );
    assert!(result.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
