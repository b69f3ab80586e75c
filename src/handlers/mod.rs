//! HTTP handlers for entity queries and mutations.

pub mod entity;
pub use entity::*;
