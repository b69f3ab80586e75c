//! Wrapper types for values crossing the JSON boundary.

use crate::entity::FieldType;
use crate::value::Value;
use serde::{Deserialize, Deserializer};

/// A patch slot: either untouched or set to a new value.
///
/// Deserializing a present key always yields `Set`, so with `#[serde(default)]` an absent
/// key stays `Unset` and `Patch<Option<T>>` tells "omitted" from an explicit `null`.
#[derive(Clone, Debug, PartialEq)]
pub enum Patch<T> {
    Unset,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unset
    }
}

impl<T> Patch<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Patch::Unset)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(v) => Some(v),
            Patch::Unset => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Patch::Set(v) => Some(v),
            Patch::Unset => None,
        }
    }
}

impl<T: FieldType> Patch<T> {
    pub fn value(&self) -> Option<Value> {
        self.as_set().map(FieldType::to_value)
    }
}

impl<T> From<T> for Patch<T> {
    fn from(v: T) -> Self {
        Patch::Set(v)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Patch::Set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Doc {
        #[serde(default)]
        name: Patch<String>,
        #[serde(default)]
        nickname: Patch<Option<String>>,
    }

    #[test]
    fn absent_null_and_present_are_distinct() {
        let d: Doc = serde_json::from_str(r#"{"nickname": null}"#).unwrap();
        assert!(d.name.is_unset());
        assert_eq!(d.nickname, Patch::Set(None));
        assert_eq!(d.nickname.value(), Some(Value::Null));

        let d: Doc = serde_json::from_str(r#"{"name": "bob", "nickname": "b"}"#).unwrap();
        assert_eq!(d.name.value(), Some(Value::Text("bob".into())));
        assert_eq!(d.nickname.into_option(), Some(Some("b".to_string())));
    }

    #[test]
    fn unset_has_no_value() {
        let p: Patch<i64> = Patch::default();
        assert_eq!(p.value(), None);
        assert_eq!(Patch::from(3i64).as_set(), Some(&3));
    }
}
