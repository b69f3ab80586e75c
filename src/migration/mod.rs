//! Schema reconciliation: compare declared columns with the live catalog, write a reversible
//! migration for the difference and apply pending migrations with the sqlx runner.

mod files;
mod synth;

pub use files::{existing_versions, next_version, write_migration};
pub use synth::{canonical_type, diff_migration, initial_migration};

use crate::config::EngineConfig;
use crate::entity::Column;
use crate::sql::quoted;
use chrono::Utc;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("column {table}.{column} changes type from {live} to {declared}; type changes are not supported")]
    UnsupportedTypeChange {
        table: String,
        column: String,
        live: String,
        declared: String,
    },
    #[error("reading catalog: {0}")]
    Catalog(#[source] sqlx::Error),
    #[error("{}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("applying migrations: {0}")]
    Apply(#[from] MigrateError),
}

/// A column as the catalog reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    /// `format_type` rendering, e.g. `character varying(40)`.
    pub sql_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// The tsvector column full-text search reads. With `sources` the engine owns it as a stored
/// generated column over those text columns; without, it is maintained outside the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchColumn {
    pub name: String,
    pub sources: Vec<String>,
}

impl SearchColumn {
    pub fn new<S: Into<String>>(name: impl Into<String>, sources: impl IntoIterator<Item = S>) -> Self {
        SearchColumn {
            name: name.into(),
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    pub fn managed(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Column definition for CREATE TABLE or ADD COLUMN. `None` when not managed.
    pub fn definition(&self) -> Option<String> {
        if !self.managed() {
            return None;
        }
        let document: Vec<String> = self
            .sources
            .iter()
            .map(|s| format!("coalesce({}, '')", quoted(s)))
            .collect();
        Some(format!(
            "{} TSVECTOR GENERATED ALWAYS AS (to_tsvector('simple', {})) STORED",
            quoted(&self.name),
            document.join(" || ' ' || ")
        ))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Migration {
    pub up: String,
    pub down: String,
}

const LIVE_COLUMNS_SQL: &str = r#"
SELECT a.attname::text, format_type(a.atttypid, a.atttypmod), a.attnotnull,
       COALESCE(i.indisprimary, false)
FROM pg_attribute a
JOIN pg_class c ON c.oid = a.attrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_index i ON i.indrelid = c.oid AND i.indisprimary AND a.attnum = ANY(i.indkey)
WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p')
  AND a.attnum > 0 AND NOT a.attisdropped
ORDER BY a.attnum
"#;

/// Live columns of `schema.table` in ordinal order. Empty when the table does not exist.
pub async fn fetch_columns(pool: &PgPool, schema: &str, table: &str) -> Result<Vec<LiveColumn>, MigrationError> {
    let rows: Vec<(String, String, bool, bool)> = sqlx::query_as(LIVE_COLUMNS_SQL)
        .bind(schema)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(MigrationError::Catalog)?;
    Ok(rows
        .into_iter()
        .map(|(name, sql_type, not_null, primary_key)| LiveColumn {
            name,
            sql_type,
            not_null,
            primary_key,
        })
        .collect())
}

/// Highest version the sqlx runner has recorded, if it has run before.
async fn latest_applied_version(pool: &PgPool) -> Result<Option<i64>, MigrationError> {
    let exists: bool = sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
        .fetch_one(pool)
        .await
        .map_err(MigrationError::Catalog)?;
    if !exists {
        return Ok(None);
    }
    sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .map_err(MigrationError::Catalog)
}

/// Apply every pending migration in `dir`. Versions recorded in the database but absent
/// from `dir` are ignored.
pub async fn apply(pool: &PgPool, dir: &Path) -> Result<(), MigrationError> {
    if !dir.exists() {
        return Ok(());
    }
    let mut migrator = Migrator::new(dir.to_path_buf()).await?;
    migrator.set_ignore_missing(true);
    migrator.run(pool).await?;
    tracing::info!(dir = %dir.display(), "migrations applied");
    Ok(())
}

/// Bring `table` in line with `columns`: synthesize and write a migration when the schema
/// differs, then apply whatever is pending. A freshly written pair that fails to apply is
/// removed again so the next start synthesizes from the live schema.
pub async fn reconcile(
    pool: &PgPool,
    config: &EngineConfig,
    table: &str,
    columns: &[Column],
    search: &SearchColumn,
) -> Result<(), MigrationError> {
    let live = fetch_columns(pool, &config.schema, table).await?;
    let migration = if live.is_empty() {
        Some(initial_migration(&config.schema, table, columns, search))
    } else {
        diff_migration(&config.schema, table, &live, columns, search)?
    };
    let written = match migration {
        Some(m) => {
            // Versions already applied from other directories must not be reused.
            let applied = latest_applied_version(pool).await?;
            let version = next_version(&config.migrations_dir, Utc::now())?
                .max(applied.map_or(0, |v| v + 1));
            let (up, down) = write_migration(&config.migrations_dir, table, &m, version)?;
            tracing::info!(table, path = %up.display(), "migration written");
            Some((up, down))
        }
        None => {
            tracing::debug!(table, "schema up to date");
            None
        }
    };
    let result = apply(pool, &config.migrations_dir).await;
    if let (Err(err), Some((up, down))) = (&result, written) {
        tracing::warn!(table, error = %err, "migration failed; removing it");
        for path in [up, down] {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "could not remove migration file");
            }
        }
    }
    result
}
