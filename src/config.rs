//! Engine configuration. Built explicitly or read from the environment.

use crate::error::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const DEFAULT_SEARCH_COLUMN: &str = "tsv";
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const DEFAULT_MAX_LIMIT: u32 = 1000;

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Schema holding entity tables.
    pub schema: String,
    pub environment: String,
    /// Where synthesized migrations are written and read back from. `migrations/<environment>` by default.
    pub migrations_dir: PathBuf,
    /// tsvector column used by full-text search.
    pub search_column: String,
    pub default_limit: u32,
    pub max_limit: u32,
    /// Upper bound for each statement; unbounded when `None`.
    pub query_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            schema: DEFAULT_SCHEMA.into(),
            environment: DEFAULT_ENVIRONMENT.into(),
            migrations_dir: migrations_dir_for(DEFAULT_ENVIRONMENT),
            search_column: DEFAULT_SEARCH_COLUMN.into(),
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            query_timeout: None,
        }
    }
}

fn migrations_dir_for(environment: &str) -> PathBuf {
    PathBuf::from("migrations").join(environment)
}

fn parse_var<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("{:?}: {}", raw, e),
    })
}

impl EngineConfig {
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Also points `migrations_dir` at `migrations/<environment>`.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self.migrations_dir = migrations_dir_for(&self.environment);
        self
    }

    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    pub fn with_search_column(mut self, column: impl Into<String>) -> Self {
        self.search_column = column.into();
        self
    }

    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_max_limit(mut self, limit: u32) -> Self {
        self.max_limit = limit;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Read `ENTITY_SCHEMA`, `APP_ENV`, `ENTITY_MIGRATIONS_DIR`, `ENTITY_SEARCH_COLUMN`,
    /// `ENTITY_DEFAULT_LIMIT`, `ENTITY_MAX_LIMIT` and `ENTITY_QUERY_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = EngineConfig::default();
        if let Some(schema) = lookup("ENTITY_SCHEMA") {
            config = config.with_schema(schema);
        }
        if let Some(env) = lookup("APP_ENV") {
            config = config.with_environment(env);
        }
        if let Some(dir) = lookup("ENTITY_MIGRATIONS_DIR") {
            config = config.with_migrations_dir(dir);
        }
        if let Some(column) = lookup("ENTITY_SEARCH_COLUMN") {
            config = config.with_search_column(column);
        }
        if let Some(raw) = lookup("ENTITY_DEFAULT_LIMIT") {
            config.default_limit = parse_var("ENTITY_DEFAULT_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("ENTITY_MAX_LIMIT") {
            config.max_limit = parse_var("ENTITY_MAX_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("ENTITY_QUERY_TIMEOUT_MS") {
            let ms: u64 = parse_var("ENTITY_QUERY_TIMEOUT_MS", &raw)?;
            config.query_timeout = Some(Duration::from_millis(ms));
        }
        Ok(config)
    }
}
