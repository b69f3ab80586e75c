//! Generic persistence over one table, driven by the entity's declared columns.

use super::repository::{Creator, Deleter, Getter, Lister, Querier, Updater};
use crate::config::EngineConfig;
use crate::entity::{Column, SqlEntity, UpdateEntity};
use crate::error::EntityError;
use crate::filter::Filter;
use crate::migration::{self, SearchColumn};
use crate::pagination::{paginate, PaginationLimit, PaginationMeta, Paginated};
use crate::sort::Sorts;
use crate::sql::{
    count_of, delete_by_key, exists_by_key, insert_many, paged, qualified_table, search_predicate,
    select, select_by_key, update_by_key, QueryBuf,
};
use crate::value::{decode_cell, FieldKind, Value, ValueError};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

fn bind_all<'q>(sql: &'q str, params: &'q [Value]) -> Query<'q, Postgres, PgArguments> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, p| query.bind(p.clone()))
}

/// Persistence engine for entity `E` with patch type `U` over a single table.
pub struct EntityStore<E, U> {
    pool: PgPool,
    table: String,
    qualified: String,
    columns: Vec<Column>,
    kinds: Vec<FieldKind>,
    search: SearchColumn,
    /// The search column exists, so `search` terms can be matched.
    searchable: bool,
    timeout: Option<Duration>,
    _types: PhantomData<fn() -> (E, U)>,
}

impl<E: SqlEntity, U: UpdateEntity> EntityStore<E, U> {
    /// Reconcile the table schema, then return the store. Fails if any declared column has
    /// no matching field or if the schema cannot be migrated.
    pub async fn new(pool: PgPool, config: &EngineConfig, table: &str) -> Result<Self, EntityError> {
        let mut store = Self::unmigrated(pool, config, table)?;
        migration::reconcile(&store.pool, config, table, &store.columns, &store.search).await?;
        let live = migration::fetch_columns(&store.pool, &config.schema, table).await?;
        store.searchable = live.iter().any(|c| c.name == store.search.name);
        tracing::info!(table = %store.qualified, searchable = store.searchable, "entity store ready");
        Ok(store)
    }

    pub(crate) fn unmigrated(pool: PgPool, config: &EngineConfig, table: &str) -> Result<Self, EntityError> {
        let columns = E::columns();
        let kinds = columns
            .iter()
            .map(|c| {
                E::field(&c.name)
                    .map(|f| f.kind)
                    .ok_or_else(|| EntityError::UnknownField(c.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let search = SearchColumn::new(config.search_column.clone(), E::search_fields());
        for source in &search.sources {
            let kind = columns
                .iter()
                .zip(&kinds)
                .find(|(c, _)| &c.name == source)
                .map(|(_, kind)| *kind)
                .ok_or_else(|| EntityError::UnknownField(source.clone()))?;
            if kind != FieldKind::Text {
                return Err(EntityError::invalid_value(
                    source.clone(),
                    ValueError::Invalid(format!("search source must be text, not {}", kind)),
                ));
            }
        }
        if search.managed() && columns.iter().any(|c| c.name == search.name) {
            return Err(EntityError::invalid_value(
                search.name.clone(),
                ValueError::Invalid("column name is reserved for the search column".into()),
            ));
        }
        Ok(EntityStore {
            pool,
            table: table.to_string(),
            qualified: qualified_table(&config.schema, table),
            columns,
            kinds,
            searchable: search.managed(),
            search,
            timeout: config.query_timeout,
            _types: PhantomData,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Primary-key columns paired with the values `lookup` reports for them.
    fn locator<F>(&self, lookup: F) -> Result<Vec<(String, Value)>, EntityError>
    where
        F: Fn(&str) -> Option<Value>,
    {
        let keys: Vec<(String, Value)> = self
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| match lookup(&c.name) {
                Some(v) if !v.is_null() => Ok((c.name.clone(), v)),
                _ => Err(EntityError::invalid_value(
                    c.name.clone(),
                    ValueError::Invalid("primary key value is required".into()),
                )),
            })
            .collect::<Result<_, _>>()?;
        if keys.is_empty() {
            return Err(EntityError::invalid_value(
                self.table.clone(),
                ValueError::Invalid("table declares no primary key".into()),
            ));
        }
        Ok(keys)
    }

    fn scan(&self, row: &PgRow) -> Result<E, EntityError> {
        let mut entity = E::new();
        for (i, (column, kind)) in self.columns.iter().zip(&self.kinds).enumerate() {
            let value = decode_cell(row, i, *kind)?;
            entity
                .set(&column.name, value)
                .map_err(|e| EntityError::invalid_value(column.name.clone(), e))?;
        }
        Ok(entity)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, EntityError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| EntityError::Timeout(limit))?
                .map_err(EntityError::from),
            None => fut.await.map_err(EntityError::from),
        }
    }

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<E>, EntityError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = self
            .bounded(bind_all(&q.sql, &q.params).fetch_all(&self.pool))
            .await?;
        rows.iter().map(|r| self.scan(r)).collect()
    }

    async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<E>, EntityError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = self
            .bounded(bind_all(&q.sql, &q.params).fetch_optional(&self.pool))
            .await?;
        row.as_ref().map(|r| self.scan(r)).transpose()
    }

    async fn fetch_scalar<O>(&self, q: &QueryBuf) -> Result<O, EntityError>
    where
        O: Send + Unpin,
        (O,): for<'r> sqlx::FromRow<'r, PgRow>,
    {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let query = q
            .params
            .iter()
            .fold(sqlx::query_scalar::<_, O>(&q.sql), |query, p| query.bind(p.clone()));
        self.bounded(query.fetch_one(&self.pool)).await
    }

    /// Rows affected.
    async fn execute(&self, q: &QueryBuf) -> Result<u64, EntityError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let result = self
            .bounded(bind_all(&q.sql, &q.params).execute(&self.pool))
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl<E: SqlEntity, U: UpdateEntity> Getter<E> for EntityStore<E, U> {
    async fn get(&self, id: &E) -> Result<E, EntityError> {
        let keys = self.locator(|name| id.get(name))?;
        let q = select_by_key(&self.qualified, &self.column_names(), &keys);
        self.fetch_optional(&q).await?.ok_or(EntityError::NotFound)
    }
}

#[async_trait]
impl<E: SqlEntity, U: UpdateEntity> Lister<E> for EntityStore<E, U> {
    async fn list(&self) -> Result<Vec<E>, EntityError> {
        let q = QueryBuf {
            sql: select(&self.qualified, &self.column_names(), &[]),
            params: Vec::new(),
        };
        self.fetch_all(&q).await
    }
}

#[async_trait]
impl<E: SqlEntity, U: UpdateEntity> Querier<E> for EntityStore<E, U> {
    async fn query(
        &self,
        filter: &Filter<E>,
        search: &str,
        sorts: &Sorts<E>,
        limit: PaginationLimit,
    ) -> Result<Paginated<E>, EntityError> {
        if !search.trim().is_empty() && !self.searchable {
            return Err(EntityError::invalid_value(
                "search",
                ValueError::Invalid(format!("{} has no search column {:?}", self.table, self.search.name)),
            ));
        }
        let names = self.column_names();
        let mut q = QueryBuf::new();
        let mut predicates: Vec<String> = Vec::new();
        predicates.extend(filter.render(&mut q));
        predicates.extend(search_predicate(&mut q, &self.search.name, search));

        let count = QueryBuf {
            sql: count_of(&select(&self.qualified, &names, &predicates)),
            params: q.params.clone(),
        };
        let total: i64 = self.fetch_scalar(&count).await?;
        let total = u64::try_from(total).unwrap_or_default();

        if limit.get() == 0 {
            return Ok(Paginated {
                items: Vec::new(),
                meta: PaginationMeta { total, next: None },
            });
        }

        predicates.extend(sorts.keyset_predicate(&mut q));
        q.sql = paged(
            &select(&self.qualified, &names, &predicates),
            sorts.order_by().as_deref(),
            u64::from(limit.get()) + 1,
        );
        let rows = self.fetch_all(&q).await?;
        let (items, next) = paginate(rows, limit, sorts);
        Ok(Paginated {
            items,
            meta: PaginationMeta { total, next },
        })
    }
}

#[async_trait]
impl<E: SqlEntity, U: UpdateEntity> Creator<E> for EntityStore<E, U> {
    async fn create(&self, items: &[E]) -> Result<(), EntityError> {
        if items.is_empty() {
            return Ok(());
        }
        let columns: Vec<(String, String)> = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.sql_type.clone()))
            .collect();
        let rows: Vec<Vec<Value>> = items.iter().map(SqlEntity::row).collect();
        let q = insert_many(&self.qualified, &columns, &rows);
        let inserted = self.execute(&q).await?;
        tracing::debug!(table = %self.table, inserted, "created");
        Ok(())
    }
}

#[async_trait]
impl<E: SqlEntity, U: UpdateEntity> Updater<U> for EntityStore<E, U> {
    async fn update(&self, patch: &U) -> Result<(), EntityError> {
        let keys = self.locator(|name| patch.field(name))?;
        let mut sets = Vec::new();
        for c in self.columns.iter().filter(|c| !c.primary_key) {
            let Some(v) = patch.field(&c.name) else { continue };
            if v.is_null() && !c.nullable {
                return Err(EntityError::invalid_value(
                    c.name.clone(),
                    ValueError::Invalid("column is not nullable".into()),
                ));
            }
            sets.push((c.name.clone(), c.sql_type.clone(), v));
        }

        if sets.is_empty() {
            let exists: bool = self.fetch_scalar(&exists_by_key(&self.qualified, &keys)).await?;
            return if exists { Ok(()) } else { Err(EntityError::NotFound) };
        }
        let q = update_by_key(&self.qualified, &sets, &keys);
        match self.execute(&q).await? {
            0 => Err(EntityError::NotFound),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl<E: SqlEntity, U: UpdateEntity> Deleter<E> for EntityStore<E, U> {
    async fn delete(&self, id: &E) -> Result<(), EntityError> {
        let keys = self.locator(|name| id.get(name))?;
        match self.execute(&delete_by_key(&self.qualified, &keys)).await? {
            0 => Err(EntityError::NotFound),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, Field};
    use crate::testing::{Person, PersonPatch};
    use crate::types::Patch;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy("postgres://localhost:1/unused")
            .unwrap()
    }

    struct Orphan;

    impl Entity for Orphan {
        fn new() -> Self {
            Orphan
        }
        fn fields() -> Vec<Field> {
            vec![Field::of::<i64>("id")]
        }
        fn get(&self, _: &str) -> Option<Value> {
            None
        }
        fn set(&mut self, _: &str, _: Value) -> Result<(), ValueError> {
            Ok(())
        }
    }

    impl SqlEntity for Orphan {
        fn columns() -> Vec<Column> {
            vec![Column::new("id", "BIGINT").primary_key(), Column::new("ghost", "TEXT")]
        }
    }

    #[tokio::test]
    async fn columns_must_name_fields() {
        let result = EntityStore::<Orphan, PersonPatch>::unmigrated(lazy_pool(), &EngineConfig::default(), "orphans");
        assert!(matches!(result, Err(EntityError::UnknownField(c)) if c == "ghost"));
    }

    #[tokio::test]
    async fn locator_requires_key_values() {
        let store =
            EntityStore::<Person, PersonPatch>::unmigrated(lazy_pool(), &EngineConfig::default(), "people").unwrap();
        assert_eq!(store.table(), "people");
        let patch = PersonPatch {
            name: Patch::Set("bob".into()),
            ..Default::default()
        };
        let err = store.update(&patch).await.unwrap_err();
        assert!(matches!(err, EntityError::InvalidValue { ref field, .. } if field == "id"));

        let keys = store.locator(|name| Person::sample(4, "x", 1).get(name)).unwrap();
        assert_eq!(keys, vec![("id".to_string(), Value::Int(4))]);
    }

    #[tokio::test]
    async fn update_rejects_null_for_required_columns() {
        struct NullName;

        impl UpdateEntity for NullName {
            fn field(&self, name: &str) -> Option<Value> {
                match name {
                    "id" => Some(Value::Int(1)),
                    "name" => Some(Value::Null),
                    _ => None,
                }
            }
        }

        let store =
            EntityStore::<Person, NullName>::unmigrated(lazy_pool(), &EngineConfig::default(), "people").unwrap();
        let err = store.update(&NullName).await.unwrap_err();
        assert!(matches!(err, EntityError::InvalidValue { ref field, .. } if field == "name"));
    }

    #[tokio::test]
    async fn creating_nothing_touches_nothing() {
        let store =
            EntityStore::<Person, PersonPatch>::unmigrated(lazy_pool(), &EngineConfig::default(), "people").unwrap();
        store.create(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn slow_statements_time_out() {
        let config = EngineConfig::default().with_query_timeout(Duration::from_millis(5));
        let store = EntityStore::<Person, PersonPatch>::unmigrated(lazy_pool(), &config, "people").unwrap();
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, sqlx::Error>(())
        };
        let err = store.bounded(slow).await.unwrap_err();
        assert!(matches!(err, EntityError::Timeout(d) if d == Duration::from_millis(5)));
        assert_eq!(err.tag(), "DATABASE_TIMEOUT");
    }

    #[tokio::test]
    async fn search_needs_a_search_column() {
        let store =
            EntityStore::<Person, PersonPatch>::unmigrated(lazy_pool(), &EngineConfig::default(), "people").unwrap();
        let sorts = Sorts::<Person>::parse(&["+id"], None).unwrap();
        let err = store
            .query(&Filter::all(), "quick fox", &sorts, PaginationLimit::new(5))
            .await
            .unwrap_err();
        assert!(matches!(err, EntityError::InvalidValue { ref field, .. } if field == "search"));
    }

    struct NumberIndexed;

    impl Entity for NumberIndexed {
        fn new() -> Self {
            NumberIndexed
        }
        fn fields() -> Vec<Field> {
            vec![Field::of::<i64>("id")]
        }
        fn get(&self, _: &str) -> Option<Value> {
            None
        }
        fn set(&mut self, _: &str, _: Value) -> Result<(), ValueError> {
            Ok(())
        }
    }

    impl SqlEntity for NumberIndexed {
        fn columns() -> Vec<Column> {
            vec![Column::new("id", "BIGINT").primary_key()]
        }
        fn search_fields() -> Vec<&'static str> {
            vec!["id"]
        }
    }

    #[tokio::test]
    async fn search_sources_must_be_text_columns() {
        let result =
            EntityStore::<NumberIndexed, PersonPatch>::unmigrated(lazy_pool(), &EngineConfig::default(), "numbers");
        assert!(matches!(result, Err(EntityError::InvalidValue { ref field, .. }) if field == "id"));
    }
}
