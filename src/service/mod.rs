//! EntityStore: generic persistence using the safe SQL builder.

mod repository;
mod store;
pub use repository::{Creator, Deleter, Getter, Lister, Querier, Repository, Updater};
pub use store::EntityStore;
