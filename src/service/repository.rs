//! One trait per operation so callers can depend on a single capability.

use crate::error::EntityError;
use crate::filter::Filter;
use crate::pagination::{PaginationLimit, Paginated};
use crate::sort::Sorts;
use async_trait::async_trait;

#[async_trait]
pub trait Getter<E>: Send + Sync {
    /// Fetch the row whose primary key matches `id`'s key fields.
    async fn get(&self, id: &E) -> Result<E, EntityError>;
}

#[async_trait]
pub trait Lister<E>: Send + Sync {
    /// Every row, unordered. Meant for small tables.
    async fn list(&self) -> Result<Vec<E>, EntityError>;
}

#[async_trait]
pub trait Querier<E>: Send + Sync {
    async fn query(
        &self,
        filter: &Filter<E>,
        search: &str,
        sorts: &Sorts<E>,
        limit: PaginationLimit,
    ) -> Result<Paginated<E>, EntityError>;
}

#[async_trait]
pub trait Creator<E>: Send + Sync {
    async fn create(&self, items: &[E]) -> Result<(), EntityError>;
}

#[async_trait]
pub trait Updater<U>: Send + Sync {
    async fn update(&self, patch: &U) -> Result<(), EntityError>;
}

#[async_trait]
pub trait Deleter<E>: Send + Sync {
    async fn delete(&self, id: &E) -> Result<(), EntityError>;
}

/// Every operation on `E` with patch type `U`.
pub trait Repository<E, U>:
    Getter<E> + Lister<E> + Querier<E> + Creator<E> + Updater<U> + Deleter<E>
{
}

impl<T, E, U> Repository<E, U> for T where
    T: Getter<E> + Lister<E> + Querier<E> + Creator<E> + Updater<U> + Deleter<E>
{
}
