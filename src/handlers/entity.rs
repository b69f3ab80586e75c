//! Entity handlers: paged query, create, read, patch, delete.

use crate::config::EngineConfig;
use crate::entity::{SqlEntity, UpdateEntity};
use crate::error::EntityError;
use crate::filter::Filter;
use crate::pagination::PaginationLimit;
use crate::response::{success_many_created, success_one_ok, success_page};
use crate::service::Repository;
use crate::sort::Sorts;
use crate::value::ValueError;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::sync::Arc;

pub struct EntityState<R> {
    pub repo: Arc<R>,
    pub config: Arc<EngineConfig>,
}

impl<R> Clone for EntityState<R> {
    fn clone(&self) -> Self {
        EntityState {
            repo: Arc::clone(&self.repo),
            config: Arc::clone(&self.config),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub filter: Option<String>,
    pub search: Option<String>,
    /// Comma-separated sort tokens.
    pub sort: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<String>,
}

/// Split the `sort` parameter. A leading space is a `+` that form decoding turned into a space.
fn sort_tokens(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter(|t| !t.trim().is_empty())
        .map(|t| {
            let token = t.trim();
            let signed = token.starts_with('+') || token.starts_with('-');
            if t.starts_with(' ') && !signed {
                format!("+{}", token)
            } else {
                token.to_string()
            }
        })
        .collect()
}

/// Ascending primary key, so unsorted requests still page.
fn default_sort<E: SqlEntity>() -> Vec<String> {
    E::columns()
        .into_iter()
        .filter(|c| c.primary_key)
        .map(|c| format!("+{}", c.name))
        .collect()
}

fn parse_limit(raw: Option<&str>, config: &EngineConfig) -> Result<PaginationLimit, EntityError> {
    let requested = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Some(s.parse::<u32>().map_err(|e| {
            EntityError::invalid_value("limit", ValueError::Invalid(format!("{:?}: {}", s, e)))
        })?),
        None => None,
    };
    Ok(PaginationLimit::from_query(requested, config))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, EntityError> {
    serde_json::from_slice(body).map_err(|e| EntityError::invalid_value("body", ValueError::Invalid(e.to_string())))
}

/// Build a key-only entity from a path segment. The segment is read as JSON when it parses
/// and decodes, and as a plain string otherwise.
fn parse_id<E: SqlEntity>(raw: &str) -> Result<E, EntityError> {
    let keys: Vec<_> = E::columns().into_iter().filter(|c| c.primary_key).collect();
    let [key] = keys.as_slice() else {
        return Err(EntityError::invalid_value(
            "id",
            ValueError::Invalid("path lookup needs exactly one primary key column".into()),
        ));
    };
    let field = E::field(&key.name).ok_or_else(|| EntityError::UnknownField(key.name.clone()))?;
    let value = serde_json::from_str::<Json>(raw)
        .ok()
        .and_then(|json| field.decode(&json).ok())
        .map(Ok)
        .unwrap_or_else(|| field.decode(&Json::String(raw.to_string())))
        .map_err(|e| EntityError::invalid_value(key.name.clone(), e))?;
    let mut id = E::new();
    id.set(&key.name, value)
        .map_err(|e| EntityError::invalid_value(key.name.clone(), e))?;
    Ok(id)
}

pub async fn list<E, U, R>(
    State(state): State<EntityState<R>>,
    Query(params): Query<ListParams>,
) -> Result<Response, EntityError>
where
    E: SqlEntity + Serialize,
    U: UpdateEntity,
    R: Repository<E, U> + 'static,
{
    let filter = Filter::<E>::parse(params.filter.as_deref().unwrap_or(""))?;
    let mut tokens = sort_tokens(params.sort.as_deref().unwrap_or(""));
    if tokens.is_empty() {
        tokens = default_sort::<E>();
    }
    let sorts = Sorts::<E>::parse(&tokens, params.cursor.as_deref())?;
    let limit = parse_limit(params.limit.as_deref(), &state.config)?;
    let search = params.search.as_deref().unwrap_or("");
    let page = state.repo.query(&filter, search, &sorts, limit).await?;
    Ok(success_page(page).into_response())
}

/// Accepts one object or an array of objects; all rows go in one statement.
pub async fn create<E, U, R>(State(state): State<EntityState<R>>, body: Bytes) -> Result<Response, EntityError>
where
    E: SqlEntity + Serialize + DeserializeOwned,
    U: UpdateEntity,
    R: Repository<E, U> + 'static,
{
    let items: Vec<E> = match parse_body::<Json>(&body)? {
        Json::Array(values) => values
            .into_iter()
            .map(|v| serde_json::from_value(v))
            .collect::<Result<_, _>>()
            .map_err(|e| EntityError::invalid_value("body", ValueError::Invalid(e.to_string())))?,
        value => vec![serde_json::from_value(value)
            .map_err(|e| EntityError::invalid_value("body", ValueError::Invalid(e.to_string())))?],
    };
    state.repo.create(&items).await?;
    Ok(success_many_created(items).into_response())
}

pub async fn read<E, U, R>(
    State(state): State<EntityState<R>>,
    Path(id): Path<String>,
) -> Result<Response, EntityError>
where
    E: SqlEntity + Serialize,
    U: UpdateEntity,
    R: Repository<E, U> + 'static,
{
    let id = parse_id::<E>(&id)?;
    let row = state.repo.get(&id).await?;
    Ok(success_one_ok(row).into_response())
}

/// The patch carries its own primary key.
pub async fn update<E, U, R>(State(state): State<EntityState<R>>, body: Bytes) -> Result<Response, EntityError>
where
    E: SqlEntity,
    U: UpdateEntity + DeserializeOwned,
    R: Repository<E, U> + 'static,
{
    let patch: U = parse_body(&body)?;
    state.repo.update(&patch).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn delete<E, U, R>(
    State(state): State<EntityState<R>>,
    Path(id): Path<String>,
) -> Result<Response, EntityError>
where
    E: SqlEntity,
    U: UpdateEntity,
    R: Repository<E, U> + 'static,
{
    let id = parse_id::<E>(&id)?;
    state.repo.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::testing::Person;
    use crate::value::Value;

    #[test]
    fn form_decoded_plus_is_ascending() {
        assert_eq!(sort_tokens(" name,-age,,id"), vec!["+name", "-age", "id"]);
        assert_eq!(sort_tokens("name, -age"), vec!["name", "-age"]);
        assert!(sort_tokens("").is_empty());
        assert_eq!(default_sort::<Person>(), vec!["+id"]);
    }

    #[test]
    fn path_ids_decode_through_key_field() {
        let id: Person = parse_id("42").unwrap();
        assert_eq!(id.get("id"), Some(Value::Int(42)));
        assert!(matches!(
            parse_id::<Person>("forty-two"),
            Err(EntityError::InvalidValue { ref field, .. }) if field == "id"
        ));
    }

    #[test]
    fn limits_parse_and_cap() {
        let config = EngineConfig::default().with_max_limit(20);
        assert_eq!(parse_limit(None, &config).unwrap().get(), 10);
        assert_eq!(parse_limit(Some(" "), &config).unwrap().get(), 10);
        assert_eq!(parse_limit(Some("50"), &config).unwrap().get(), 20);
        assert!(parse_limit(Some("-1"), &config).is_err());
    }
}
