#[cfg(test)]
mod tests {
    use crate::database::migrations::{normalize_sql, sync_schema};
    use rocket::tokio;
    use sqlx::{Row, SqlitePool};

    const SINGLE_TABLE_SCHEMA: &str = r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            phone TEXT NOT NULL
        );
    "#;

    const EXTENDED_TABLE_SCHEMA: &str = r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            phone TEXT NOT NULL,
            name TEXT
        );
    "#;

    const WITH_INDEX_SCHEMA: &str = r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            phone TEXT NOT NULL
        );

        CREATE INDEX idx_users_phone ON users (phone);
    "#;

    async fn table_names(pool: &SqlitePool) -> Vec<String> {
        sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(pool)
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.get::<String, _>(0))
            .collect()
    }

    #[tokio::test]
    async fn test_creates_tables_from_empty_database() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();

        let changed = sync_schema(pool.clone(), SINGLE_TABLE_SCHEMA, false)
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(table_names(&pool).await, vec!["users".to_string()]);

        // A second run must be a no-op.
        let changed = sync_schema(pool.clone(), SINGLE_TABLE_SCHEMA, false)
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_adds_column_and_preserves_rows() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sync_schema(pool.clone(), SINGLE_TABLE_SCHEMA, false)
            .await
            .unwrap();
        sqlx::query("INSERT INTO users (phone) VALUES ('+15550001111')")
            .execute(&pool)
            .await
            .unwrap();

        sync_schema(pool.clone(), EXTENDED_TABLE_SCHEMA, false)
            .await
            .unwrap();

        let row = sqlx::query("SELECT phone, name FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>(0), "+15550001111");
        assert_eq!(row.get::<Option<String>, _>(1), None);
    }

    #[tokio::test]
    async fn test_refuses_column_removal_without_flag() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sync_schema(pool.clone(), EXTENDED_TABLE_SCHEMA, false)
            .await
            .unwrap();

        let result = sync_schema(pool.clone(), SINGLE_TABLE_SCHEMA, false).await;
        assert!(result.is_err(), "Dropping a column must require allow_deletions");

        let result = sync_schema(pool.clone(), SINGLE_TABLE_SCHEMA, true).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_creates_and_drops_indices() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sync_schema(pool.clone(), WITH_INDEX_SCHEMA, false)
            .await
            .unwrap();

        let indices: Vec<String> =
            sqlx::query("SELECT name FROM sqlite_master WHERE type = 'index' AND sql IS NOT NULL")
                .fetch_all(&pool)
                .await
                .unwrap()
                .into_iter()
                .map(|row| row.get::<String, _>(0))
                .collect();
        assert_eq!(indices, vec!["idx_users_phone".to_string()]);

        let result = sync_schema(pool.clone(), SINGLE_TABLE_SCHEMA, false).await;
        assert!(result.is_err(), "Dropping an index must require allow_deletions");

        sync_schema(pool.clone(), SINGLE_TABLE_SCHEMA, true)
            .await
            .unwrap();
        let count = sqlx::query(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND sql IS NOT NULL",
        )
        .fetch_one(&pool)
        .await
        .unwrap()
        .get::<i64, _>(0);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_normalize_sql_ignores_formatting() {
        let a = "CREATE TABLE users (\n    id INTEGER PRIMARY KEY,\n    phone TEXT\n)";
        let b = "CREATE TABLE users (id INTEGER PRIMARY KEY, phone TEXT)";
        assert_eq!(normalize_sql(a), normalize_sql(b));

        let quoted = r#"CREATE TABLE "users" (id INTEGER PRIMARY KEY)"#;
        let plain = "CREATE TABLE users (id INTEGER PRIMARY KEY)";
        assert_eq!(normalize_sql(quoted), normalize_sql(plain));
    }
}
