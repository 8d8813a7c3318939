use golden_graph_core::db::migrations::latest_version;
use golden_graph_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::{params, Connection};
use uuid::Uuid;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in ["domains", "principles", "principle_domains", "edges", "edge_domains"] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn reopening_file_database_is_idempotent_and_uses_wal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");

    let first = open_db(&path).unwrap();
    assert_eq!(schema_version(&first), latest_version());
    drop(first);

    let second = open_db(&path).unwrap();
    assert_eq!(schema_version(&second), latest_version());
    let journal_mode: String = second
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(journal_mode.to_lowercase(), "wal");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
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
fn schema_rejects_non_canonical_and_zero_weight_edges() {
    let conn = open_db_in_memory().unwrap();
    let (low, high) = ordered_pair();
    insert_principle_row(&conn, low);
    insert_principle_row(&conn, high);

    let reversed = conn.execute(
        "INSERT INTO edges (principle_a, principle_b, weight) VALUES (?1, ?2, 1);",
        params![high.to_string(), low.to_string()],
    );
    assert!(reversed.is_err(), "a > b must violate the CHECK");

    let zero = conn.execute(
        "INSERT INTO edges (principle_a, principle_b, weight) VALUES (?1, ?2, 0);",
        params![low.to_string(), high.to_string()],
    );
    assert!(zero.is_err(), "zero weight must violate the CHECK");
}

#[test]
fn referenced_domain_cannot_be_deleted_at_storage_boundary() {
    let conn = open_db_in_memory().unwrap();
    let domain_id = Uuid::new_v4();
    let principle_id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO domains (id, name, name_key, created_by) VALUES (?1, 'Physics', 'physics', 'ana');",
        [domain_id.to_string()],
    )
    .unwrap();
    insert_principle_row(&conn, principle_id);
    conn.execute(
        "INSERT INTO principle_domains (principle_id, domain_id, position) VALUES (?1, ?2, 0);",
        params![principle_id.to_string(), domain_id.to_string()],
    )
    .unwrap();

    let deleted = conn.execute("DELETE FROM domains WHERE id = ?1;", [domain_id.to_string()]);
    assert!(deleted.is_err(), "RESTRICT must block deleting a used domain");

    conn.execute("DELETE FROM principles WHERE id = ?1;", [principle_id.to_string()])
        .unwrap();
    conn.execute("DELETE FROM domains WHERE id = ?1;", [domain_id.to_string()])
        .unwrap();
}

#[test]
fn domain_name_key_is_unique_at_storage_boundary() {
    let conn = open_db_in_memory().unwrap();
    let insert = "INSERT INTO domains (id, name, name_key, created_by) VALUES (?1, ?2, ?3, 'ana');";
    conn.execute(insert, params![Uuid::new_v4().to_string(), "Économie", "économie"])
        .unwrap();
    let duplicate = conn.execute(
        insert,
        params![Uuid::new_v4().to_string(), "ÉCONOMIE", "économie"],
    );
    assert!(duplicate.is_err(), "name_key must be UNIQUE");
}

#[test]
fn uuid_text_order_matches_uuid_order() {
    let conn = open_db_in_memory().unwrap();
    for _ in 0..64 {
        let (low, high) = ordered_pair();
        let text_less: i64 = conn
            .query_row(
                "SELECT ?1 < ?2;",
                params![low.to_string(), high.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(text_less, 1);
    }
}

fn ordered_pair() -> (Uuid, Uuid) {
    let x = Uuid::new_v4();
    let y = Uuid::new_v4();
    if x < y {
        (x, y)
    } else {
        (y, x)
    }
}

fn insert_principle_row(conn: &Connection, id: Uuid) {
    conn.execute(
        "INSERT INTO principles (id, text, created_by) VALUES (?1, 'p', 'ana');",
        [id.to_string()],
    )
    .unwrap();
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
