use crate::error::AppError;
use regex::Regex;
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument};

/// Diffs the live database against `target_schema` and applies the
/// difference. The target is instantiated into a pristine in-memory
/// database so SQLite itself settles formatting questions; comparison
/// happens on normalized CREATE statements from sqlite_master.
pub struct SchemaSync {
    pool: Pool<Sqlite>,
    target_schema: String,
    allow_deletions: bool,
    changes_applied: u32,
}

#[derive(Debug)]
struct SchemaObjects {
    tables: HashMap<String, String>,
    indices: HashMap<String, String>,
    columns: HashMap<String, Vec<String>>,
}

impl SchemaSync {
    pub fn new(pool: Pool<Sqlite>, target_schema: &str, allow_deletions: bool) -> Self {
        Self {
            pool,
            target_schema: target_schema.to_string(),
            allow_deletions,
            changes_applied: 0,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Result<bool, AppError> {
        info!("Synchronizing database schema");

        let pristine = SqlitePool::connect("sqlite::memory:").await?;
        if !self.target_schema.trim().is_empty() {
            sqlx::raw_sql(&self.target_schema)
                .execute(&pristine)
                .await
                .map_err(|e| AppError::Internal(format!("Target schema is invalid: {}", e)))?;
        }
        let target = read_schema_objects(&pristine).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("PRAGMA defer_foreign_keys = TRUE")
            .execute(&mut *tx)
            .await?;

        let current = read_schema_objects_tx(&mut tx).await?;

        let result = self.apply(&mut tx, &current, &target).await;
        match result {
            Ok(()) => {
                tx.commit().await?;
                if self.changes_applied > 0 {
                    info!("Running VACUUM after schema changes");
                    sqlx::query("VACUUM").execute(&self.pool).await?;
                }
                info!("Schema sync complete, {} changes applied", self.changes_applied);
                Ok(self.changes_applied > 0)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    async fn apply(
        &mut self,
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        current: &SchemaObjects,
        target: &SchemaObjects,
    ) -> Result<(), AppError> {
        // New tables first so rebuilt tables can reference them.
        for (name, sql) in &target.tables {
            if !current.tables.contains_key(name) {
                self.execute(&format!("Create table {}", name), sql, tx).await?;
            }
        }

        // Changed tables are rebuilt through a temporary copy, SQLite
        // has no ALTER covering constraint or column-type changes.
        for (name, target_sql) in &target.tables {
            let Some(current_sql) = current.tables.get(name) else {
                continue;
            };
            if normalize_sql(current_sql) == normalize_sql(target_sql) {
                continue;
            }
            let current_cols: HashSet<&String> = current.columns[name].iter().collect();
            let target_cols: HashSet<&String> = target.columns[name].iter().collect();
            let removed: Vec<_> = current_cols.difference(&target_cols).collect();
            if !removed.is_empty() && !self.allow_deletions {
                return Err(AppError::Internal(format!(
                    "Refusing to drop columns {:?} from table {} while allow_deletions=false",
                    removed, name
                )));
            }
            self.rebuild_table(tx, name, target_sql, &current_cols, &target_cols)
                .await?;
        }

        let removed_tables: Vec<_> = current
            .tables
            .keys()
            .filter(|name| !target.tables.contains_key(*name))
            .collect();
        if !removed_tables.is_empty() {
            if !self.allow_deletions {
                return Err(AppError::Internal(format!(
                    "Refusing to drop tables {:?} while allow_deletions=false",
                    removed_tables
                )));
            }
            for name in removed_tables {
                self.execute(
                    &format!("Drop table {}", name),
                    &format!("DROP TABLE {}", name),
                    tx,
                )
                .await?;
            }
        }

        // Indices: drop obsolete and changed, then (re)create.
        for name in current.indices.keys() {
            let obsolete = !target.indices.contains_key(name);
            if obsolete && !self.allow_deletions {
                return Err(AppError::Internal(format!(
                    "Refusing to drop index {} while allow_deletions=false",
                    name
                )));
            }
            let changed = target
                .indices
                .get(name)
                .is_some_and(|sql| normalize_sql(sql) != normalize_sql(&current.indices[name]));
            if obsolete || changed {
                self.execute(
                    &format!("Drop index {}", name),
                    &format!("DROP INDEX {}", name),
                    tx,
                )
                .await?;
            }
        }
        for (name, sql) in &target.indices {
            let up_to_date = current
                .indices
                .get(name)
                .is_some_and(|cur| normalize_sql(cur) == normalize_sql(sql));
            if !up_to_date {
                self.execute(&format!("Create index {}", name), sql, tx).await?;
            }
        }

        Ok(())
    }

    #[instrument(skip(self, tx, target_sql, current_cols, target_cols))]
    async fn rebuild_table(
        &mut self,
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        name: &str,
        target_sql: &str,
        current_cols: &HashSet<&String>,
        target_cols: &HashSet<&String>,
    ) -> Result<(), AppError> {
        info!("Rebuilding table {}", name);

        let temp_name = format!("{}_schema_sync_new", name);
        let temp_sql = target_sql.replace(
            &format!("CREATE TABLE {}", name),
            &format!("CREATE TABLE {}", temp_name),
        );
        self.execute(&format!("Create replacement for {}", name), &temp_sql, tx)
            .await?;

        let common: Vec<&str> = current_cols
            .intersection(target_cols)
            .map(|s| s.as_str())
            .collect();
        if !common.is_empty() {
            let cols = common.join(", ");
            self.execute(
                &format!("Copy rows into new {}", name),
                &format!(
                    "INSERT INTO {} ({}) SELECT {} FROM {}",
                    temp_name, cols, cols, name
                ),
                tx,
            )
            .await?;
        }

        self.execute(
            &format!("Drop old table {}", name),
            &format!("DROP TABLE {}", name),
            tx,
        )
        .await?;
        self.execute(
            &format!("Rename replacement to {}", name),
            &format!("ALTER TABLE {} RENAME TO {}", temp_name, name),
            tx,
        )
        .await?;

        Ok(())
    }

    async fn execute(
        &mut self,
        description: &str,
        sql: &str,
        tx: &mut sqlx::Transaction<'_, Sqlite>,
    ) -> Result<(), AppError> {
        info!("Schema change: {} with SQL:\n{}", description, sql);
        sqlx::query(sql).execute(&mut **tx).await?;
        self.changes_applied += 1;
        Ok(())
    }
}

async fn read_schema_objects(pool: &SqlitePool) -> Result<SchemaObjects, AppError> {
    let tables = fetch_master(pool, "table").await?;
    let indices = fetch_master(pool, "index").await?;
    let mut columns = HashMap::new();
    for name in tables.keys() {
        columns.insert(name.clone(), fetch_columns(pool, name).await?);
    }
    Ok(SchemaObjects {
        tables,
        indices,
        columns,
    })
}

async fn read_schema_objects_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
) -> Result<SchemaObjects, AppError> {
    let tables = fetch_master(&mut **tx, "table").await?;
    let indices = fetch_master(&mut **tx, "index").await?;
    let mut columns = HashMap::new();
    for name in tables.keys() {
        columns.insert(name.clone(), fetch_columns(&mut **tx, name).await?);
    }
    Ok(SchemaObjects {
        tables,
        indices,
        columns,
    })
}

async fn fetch_master(
    executor: impl sqlx::Executor<'_, Database = Sqlite>,
    kind: &str,
) -> Result<HashMap<String, String>, AppError> {
    let rows = sqlx::query(
        "SELECT name, sql FROM sqlite_master
         WHERE type = ? AND sql IS NOT NULL AND name NOT LIKE 'sqlite_%'",
    )
    .bind(kind)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>(0), row.get::<String, _>(1)))
        .collect())
}

async fn fetch_columns(
    executor: impl sqlx::Executor<'_, Database = Sqlite>,
    table: &str,
) -> Result<Vec<String>, AppError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(|row| row.get::<String, _>(1)).collect())
}

pub fn normalize_sql(sql: &str) -> String {
    let re = Regex::new(r"--[^\n]*\n").unwrap();
    let sql = re.replace_all(sql, "");
    let re = Regex::new(r"\s+").unwrap();
    let sql = re.replace_all(&sql, " ");
    let re = Regex::new(r" *([(),]) *").unwrap();
    let sql = re.replace_all(&sql, "$1");
    let re = Regex::new(r#""(\w+)""#).unwrap();
    let sql = re.replace_all(&sql, "$1");
    sql.trim().to_string()
}

#[instrument(skip(pool, target_schema))]
pub async fn sync_schema(
    pool: Pool<Sqlite>,
    target_schema: &str,
    allow_deletions: bool,
) -> Result<bool, AppError> {
    SchemaSync::new(pool, target_schema, allow_deletions).run().await
}
