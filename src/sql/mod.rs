//! Safe SQL builder: identifiers from entity declarations only, values as parameters.

mod builder;
pub use builder::*;
