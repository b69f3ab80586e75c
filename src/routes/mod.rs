pub mod common;
pub mod entity;

pub use common::service_routes;
pub use entity::entity_routes;
