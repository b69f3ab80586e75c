//! Entity routes over any repository.

use crate::config::EngineConfig;
use crate::entity::{SqlEntity, UpdateEntity};
use crate::handlers::entity::{create, delete, list, read, update, EntityState};
use crate::service::Repository;
use axum::{routing::get, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// `GET /` query, `POST /` create, `PATCH /` update, `GET /:id` read, `DELETE /:id` delete.
/// Request bodies larger than `body_limit` bytes are rejected with 413.
pub fn entity_routes<E, U, R>(repo: Arc<R>, config: EngineConfig, body_limit: usize) -> Router
where
    E: SqlEntity + Serialize + DeserializeOwned,
    U: UpdateEntity + DeserializeOwned,
    R: Repository<E, U> + 'static,
{
    let state = EntityState {
        repo,
        config: Arc::new(config),
    };
    Router::new()
        .route(
            "/",
            get(list::<E, U, R>)
                .post(create::<E, U, R>)
                .patch(update::<E, U, R>),
        )
        .route("/:id", get(read::<E, U, R>).delete(delete::<E, U, R>))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
