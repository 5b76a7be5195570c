// ABOUTME: Integration tests for the SQLite-to-MySQL migration against a real MySQL server
// ABOUTME: Set TEST_MYSQL_URL (with a database name) and run with --ignored

use mysql_async::prelude::*;
use rusqlite::Connection;
use sqlite_mysql_migrator::error::ErrorKind;
use sqlite_mysql_migrator::migration::{
    migrate, verify_tables, CancelFlag, Destination, MigrationOptions, TableOutcome,
    Verification,
};
use mysql_async::Opts;
use sqlite_mysql_migrator::mysql::{connect_mysql, validate_mysql_url, MysqlDestination};
use sqlite_mysql_migrator::sqlite::SqliteSource;
use std::env;

/// Helper to get test MySQL destination options from environment
fn get_test_mysql_url() -> Option<Opts> {
    let url = env::var("TEST_MYSQL_URL").ok()?;
    Some(validate_mysql_url(&url).expect("TEST_MYSQL_URL must be a valid mysql:// URL"))
}

/// Drop the given tables so each test starts from an empty destination
async fn cleanup_test_tables(opts: &Opts, tables: &[&str]) -> anyhow::Result<()> {
    let mut conn = connect_mysql(opts.clone(), 0).await?;
    conn.query_drop("SET FOREIGN_KEY_CHECKS = 0").await?;
    for table in tables {
        conn.query_drop(format!("DROP TABLE IF EXISTS `{}`", table))
            .await?;
    }
    conn.query_drop("SET FOREIGN_KEY_CHECKS = 1").await?;
    conn.disconnect().await?;
    Ok(())
}

/// Create a SQLite source with a realistic mix of column types
fn create_test_sqlite_source(sql: &str) -> SqliteSource {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(sql).unwrap();
    SqliteSource::from_connection(conn, true)
}

const BLOG: &str = "
    CREATE TABLE it_users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email VARCHAR(255) NOT NULL,
        active INTEGER DEFAULT 1,
        balance DECIMAL(10,2),
        created_at DATETIME
    );
    CREATE TABLE it_posts (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES it_users(id) ON DELETE CASCADE,
        body TEXT,
        attachment BLOB
    );
    INSERT INTO it_users VALUES (1, 'ann@example.com', 1, 12.50, '2024-07-03 19:00:01');
    INSERT INTO it_users VALUES (2, 'bo@example.com', 0, NULL, 1720033201000);
    INSERT INTO it_posts VALUES (1, 1, 'héllo wörld', X'00FF10');
    INSERT INTO it_posts VALUES (2, 2, NULL, NULL);
";

#[tokio::test]
#[ignore]
async fn test_mysql_full_migration_integration() {
    let Some(url) = get_test_mysql_url() else {
        println!("Skipping: TEST_MYSQL_URL not set");
        return;
    };
    cleanup_test_tables(&url, &["it_posts", "it_users"])
        .await
        .unwrap();

    let destination = MysqlDestination::connect(url.clone(), 0).await.unwrap();
    let report = migrate(
        create_test_sqlite_source(BLOG),
        destination,
        &MigrationOptions::default(),
        &CancelFlag::new(),
    )
    .await
    .expect("migration should not abort");

    println!("{}", report);
    assert!(report.is_success());
    assert_eq!(
        report.get("it_users").unwrap().verification,
        Some(Verification::Matched { rows: 2 })
    );

    let mut conn = connect_mysql(url.clone(), 0).await.unwrap();
    let users: Vec<(i64, String, i64, Option<String>, String)> = conn
        .query(
            "SELECT id, email, active, CAST(balance AS CHAR), \
             DATE_FORMAT(created_at, '%Y-%m-%d %H:%i:%s') FROM it_users ORDER BY id",
        )
        .await
        .unwrap();
    assert_eq!(
        users,
        vec![
            (
                1,
                "ann@example.com".to_string(),
                1,
                Some("12.50".to_string()),
                "2024-07-03 19:00:01".to_string()
            ),
            (
                2,
                "bo@example.com".to_string(),
                0,
                None,
                "2024-07-03 19:00:01".to_string()
            ),
        ]
    );

    let posts: Vec<(i64, Option<String>, Option<Vec<u8>>)> = conn
        .query("SELECT id, body, attachment FROM it_posts ORDER BY id")
        .await
        .unwrap();
    assert_eq!(posts[0].1.as_deref(), Some("héllo wörld"));
    assert_eq!(posts[0].2.as_deref(), Some(&[0x00, 0xFF, 0x10][..]));
    assert_eq!(posts[1], (2, None, None));

    let constraints: Vec<String> = conn
        .query(
            "SELECT CONSTRAINT_NAME FROM information_schema.REFERENTIAL_CONSTRAINTS \
             WHERE CONSTRAINT_SCHEMA = DATABASE() AND TABLE_NAME = 'it_posts'",
        )
        .await
        .unwrap();
    assert_eq!(constraints, vec!["fk_it_posts_0".to_string()]);
    conn.disconnect().await.unwrap();

    cleanup_test_tables(&url, &["it_posts", "it_users"])
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn test_mysql_indexes_and_schema_drift() {
    let Some(url) = get_test_mysql_url() else {
        println!("Skipping: TEST_MYSQL_URL not set");
        return;
    };
    let sql = "CREATE TABLE it_accounts (
                   id INTEGER PRIMARY KEY,
                   email TEXT NOT NULL UNIQUE,
                   tenant INTEGER
               );
               CREATE INDEX ix_it_accounts_tenant ON it_accounts (tenant);
               INSERT INTO it_accounts VALUES (1, 'a@example.com', 7);";
    cleanup_test_tables(&url, &["it_accounts"]).await.unwrap();

    let report = migrate(
        create_test_sqlite_source(sql),
        MysqlDestination::connect(url.clone(), 0).await.unwrap(),
        &MigrationOptions::default(),
        &CancelFlag::new(),
    )
    .await
    .unwrap();
    assert_eq!(
        report.get("it_accounts").unwrap().verification,
        Some(Verification::Matched { rows: 1 })
    );

    let mut conn = connect_mysql(url.clone(), 0).await.unwrap();
    let indexes: Vec<(String, i64)> = conn
        .query(
            "SELECT DISTINCT INDEX_NAME, NON_UNIQUE FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = 'it_accounts' \
             AND INDEX_NAME <> 'PRIMARY' ORDER BY INDEX_NAME",
        )
        .await
        .unwrap();
    assert_eq!(
        indexes,
        vec![
            ("ix_it_accounts_tenant".to_string(), 1),
            ("uq_it_accounts_0".to_string(), 0)
        ]
    );

    // A second insert of the same email now violates the unique key
    let duplicate = conn
        .query_drop("INSERT INTO it_accounts (id, email) VALUES (2, 'a@example.com')")
        .await;
    assert!(duplicate.is_err());

    conn.query_drop("ALTER TABLE it_accounts MODIFY tenant VARCHAR(10)")
        .await
        .unwrap();
    conn.disconnect().await.unwrap();

    let source = create_test_sqlite_source(sql);
    let mut destination = MysqlDestination::connect(url.clone(), 0).await.unwrap();
    let results = verify_tables(&source, &mut destination, &["it_accounts".to_string()])
        .await
        .unwrap();
    assert!(matches!(
        &results[0].1,
        Verification::SchemaMismatch { differences } if differences[0].contains("tenant")
    ));
    destination.close().await.unwrap();

    cleanup_test_tables(&url, &["it_accounts"]).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_mysql_rerun_fails_on_existing_tables() {
    let Some(url) = get_test_mysql_url() else {
        println!("Skipping: TEST_MYSQL_URL not set");
        return;
    };
    let sql = "CREATE TABLE it_rerun (id INTEGER PRIMARY KEY, name TEXT);
               INSERT INTO it_rerun VALUES (1, 'x');";
    cleanup_test_tables(&url, &["it_rerun"]).await.unwrap();

    let options = MigrationOptions::default();
    let first = migrate(
        create_test_sqlite_source(sql),
        MysqlDestination::connect(url.clone(), 0).await.unwrap(),
        &options,
        &CancelFlag::new(),
    )
    .await
    .unwrap();
    assert!(first.is_success());

    let second = migrate(
        create_test_sqlite_source(sql),
        MysqlDestination::connect(url.clone(), 0).await.unwrap(),
        &options,
        &CancelFlag::new(),
    )
    .await
    .unwrap();
    assert!(matches!(
        second.get("it_rerun").unwrap().outcome,
        TableOutcome::Failed {
            kind: ErrorKind::SchemaTranslation,
            ..
        }
    ));

    let mut conn = connect_mysql(url.clone(), 0).await.unwrap();
    let count: Option<i64> = conn
        .query_first("SELECT COUNT(*) FROM it_rerun")
        .await
        .unwrap();
    assert_eq!(count, Some(1), "re-run must not duplicate rows");
    conn.disconnect().await.unwrap();

    cleanup_test_tables(&url, &["it_rerun"]).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_mysql_wide_table_is_split_under_placeholder_limit() {
    let Some(url) = get_test_mysql_url() else {
        println!("Skipping: TEST_MYSQL_URL not set");
        return;
    };
    cleanup_test_tables(&url, &["it_wide"]).await.unwrap();

    let columns: Vec<String> = (0..200).map(|i| format!("c{} INTEGER", i)).collect();
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("CREATE TABLE it_wide ({});", columns.join(", ")))
        .unwrap();
    let values = vec!["7"; 200].join(", ");
    for _ in 0..400 {
        conn.execute(&format!("INSERT INTO it_wide VALUES ({})", values), [])
            .unwrap();
    }

    // 400 rows x 200 columns is over the 65535 placeholder limit for one statement
    let options = MigrationOptions {
        batch_size: 400,
        ..MigrationOptions::default()
    };
    let report = migrate(
        SqliteSource::from_connection(conn, true),
        MysqlDestination::connect(url.clone(), 0).await.unwrap(),
        &options,
        &CancelFlag::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        report.get("it_wide").unwrap().outcome,
        TableOutcome::Migrated { rows: 400 }
    );
    cleanup_test_tables(&url, &["it_wide"]).await.unwrap();
}

#[test]
fn test_mysql_invalid_url_fails() {
    assert!(validate_mysql_url("postgresql://localhost:5432/app").is_err());
}

#[tokio::test]
async fn test_mysql_missing_database_name_fails() {
    let opts = Opts::from_url("mysql://root@localhost:3306").unwrap();
    let result = MysqlDestination::connect(opts, 0).await;
    let message = format!("{:#}", result.err().unwrap());
    assert!(message.contains("must name the target database"));
}
