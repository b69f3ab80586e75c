//! Entity contract: the field vocabulary, column metadata and patch records.

use crate::value::{FieldKind, Value, ValueError};
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use std::fmt;
use uuid::Uuid;

fn mismatch(expected: FieldKind, got: &Value) -> ValueError {
    ValueError::TypeMismatch {
        expected,
        got: got.kind().map(|k| k.as_str()).unwrap_or("null"),
    }
}

/// A Rust type that can live in an entity field.
///
/// `decode_json` is the hook filters and cursors go through. Domain scalars (typed ids,
/// slugs) implement this trait themselves and override it to validate input.
pub trait FieldType: Sized {
    const KIND: FieldKind;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, ValueError>;

    fn decode_json(json: &Json) -> Result<Value, ValueError> {
        if json.is_null() && !Self::NULLABLE {
            return Err(ValueError::TypeMismatch {
                expected: Self::KIND,
                got: "null",
            });
        }
        let value = Value::from_json(Self::KIND, json)?;
        // Range checks for narrow integer types live in from_value.
        Self::from_value(value.clone())?;
        Ok(value)
    }
}

macro_rules! direct_field_type {
    ($ty:ty, $kind:ident) => {
        impl FieldType for $ty {
            const KIND: FieldKind = FieldKind::$kind;

            fn to_value(&self) -> Value {
                Value::$kind(self.clone())
            }

            fn from_value(value: Value) -> Result<Self, ValueError> {
                match value {
                    Value::$kind(v) => Ok(v),
                    other => Err(mismatch(Self::KIND, &other)),
                }
            }
        }
    };
}

direct_field_type!(bool, Bool);
direct_field_type!(i64, Int);
direct_field_type!(f64, Float);
direct_field_type!(String, Text);
direct_field_type!(Uuid, Uuid);
direct_field_type!(DateTime<Utc>, Timestamp);
direct_field_type!(Json, Json);

macro_rules! narrow_int_field_type {
    ($ty:ty) => {
        impl FieldType for $ty {
            const KIND: FieldKind = FieldKind::Int;

            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }

            fn from_value(value: Value) -> Result<Self, ValueError> {
                match value {
                    Value::Int(n) => <$ty>::try_from(n).map_err(|_| {
                        ValueError::Invalid(format!("{} is out of range for {}", n, stringify!($ty)))
                    }),
                    other => Err(mismatch(Self::KIND, &other)),
                }
            }
        }
    };
}

narrow_int_field_type!(i16);
narrow_int_field_type!(i32);

impl FieldType for f32 {
    const KIND: FieldKind = FieldKind::Float;

    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Float(f) => Ok(f as f32),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            v => T::from_value(v).map(Some),
        }
    }

    fn decode_json(json: &Json) -> Result<Value, ValueError> {
        if json.is_null() {
            Ok(Value::Null)
        } else {
            T::decode_json(json)
        }
    }
}

/// One entry of an entity's field vocabulary.
#[derive(Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    decode: fn(&Json) -> Result<Value, ValueError>,
}

impl Field {
    pub fn of<T: FieldType>(name: &'static str) -> Self {
        Field {
            name,
            kind: T::KIND,
            nullable: T::NULLABLE,
            decode: T::decode_json,
        }
    }

    /// Decode a raw JSON value through the field type's own decoder.
    pub fn decode(&self, json: &Json) -> Result<Value, ValueError> {
        (self.decode)(json)
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .finish()
    }
}

/// A persisted record type.
///
/// `get` and `set` address fields by the names listed in `fields()`; the store scans rows
/// with `set` and reads values for inserts, cursors and locators with `get`.
pub trait Entity: Sized + Send + Sync + Unpin + 'static {
    fn new() -> Self;

    fn fields() -> Vec<Field>;

    fn get(&self, name: &str) -> Option<Value>;

    fn set(&mut self, name: &str, value: Value) -> Result<(), ValueError>;

    fn field(name: &str) -> Option<Field> {
        Self::fields().into_iter().find(|f| f.name == name)
    }
}

/// Store `value` into a typed slot. Convenience for `Entity::set` implementations.
pub fn assign<T: FieldType>(slot: &mut T, value: Value) -> Result<(), ValueError> {
    *slot = T::from_value(value)?;
    Ok(())
}

/// Declared column of the backing table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: String,
    pub primary_key: bool,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Column {
            name: name.into(),
            sql_type: sql_type.into(),
            primary_key: false,
            nullable: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// An entity with a relational mapping. Column order is the INSERT and SELECT order.
pub trait SqlEntity: Entity {
    fn columns() -> Vec<Column>;

    /// Text columns indexed by the generated search column. Empty leaves the search column
    /// to be maintained outside the engine.
    fn search_fields() -> Vec<&'static str> {
        Vec::new()
    }

    fn row(&self) -> Vec<Value> {
        Self::columns()
            .iter()
            .map(|c| self.get(&c.name).unwrap_or(Value::Null))
            .collect()
    }
}

/// Partial update companion of an entity. `Some` means the field is set, including to null.
pub trait UpdateEntity: Send + Sync + 'static {
    fn field(&self, name: &str) -> Option<Value>;
}
