//! entity-store: generic entity persistence over PostgreSQL with a JSON filter language,
//! keyset pagination and startup schema migrations.

pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod migration;
pub mod pagination;
pub mod response;
pub mod routes;
pub mod service;
pub mod sort;
pub mod sql;
pub mod types;
pub mod value;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use entity::{assign, Column, Entity, Field, FieldType, SqlEntity, UpdateEntity};
pub use error::{ConfigError, EntityError};
pub use filter::Filter;
pub use migration::{Migration, MigrationError, SearchColumn};
pub use pagination::{Paginated, PaginationLimit, PaginationMeta};
pub use routes::{entity_routes, service_routes};
pub use service::{Creator, Deleter, EntityStore, Getter, Lister, Querier, Repository, Updater};
pub use sort::{Cursor, Direction, Sorts};
pub use types::Patch;
pub use value::{FieldKind, Value, ValueError};
