//! Tagged field values: JSON decoding, ordering, and binding to PostgreSQL.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value as Json;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgRow, PgTypeInfo, Postgres};
use sqlx::{Database, Row, Type};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Declared scalar kind of an entity field. Drives value decoding and row scanning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Text,
    Uuid,
    Timestamp,
    Json,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Int => "integer",
            FieldKind::Float => "float",
            FieldKind::Text => "text",
            FieldKind::Uuid => "uuid",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Json => "json",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("expected {expected}, got {got}")]
    TypeMismatch { expected: FieldKind, got: &'static str },
    #[error("{0}")]
    Invalid(String),
    #[error("unknown field {0:?}")]
    UnknownField(String),
}

/// A single field value. Nulls carry no kind; the column context supplies it.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(Json),
}

fn json_type_name(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

impl Value {
    pub fn kind(&self) -> Option<FieldKind> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => FieldKind::Bool,
            Value::Int(_) => FieldKind::Int,
            Value::Float(_) => FieldKind::Float,
            Value::Text(_) => FieldKind::Text,
            Value::Uuid(_) => FieldKind::Uuid,
            Value::Timestamp(_) => FieldKind::Timestamp,
            Value::Json(_) => FieldKind::Json,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Decode a raw JSON value into `kind`. JSON `null` always decodes to `Value::Null`;
    /// rejecting it for non-nullable fields is the caller's concern.
    pub fn from_json(kind: FieldKind, json: &Json) -> Result<Value, ValueError> {
        match (kind, json) {
            (_, Json::Null) => Ok(Value::Null),
            (FieldKind::Json, j) => Ok(Value::Json(j.clone())),
            (FieldKind::Bool, Json::Bool(b)) => Ok(Value::Bool(*b)),
            (FieldKind::Int, Json::Number(n)) => n
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| ValueError::Invalid(format!("{} is not a 64-bit integer", n))),
            (FieldKind::Float, Json::Number(n)) => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| ValueError::Invalid(format!("{} is not a float", n))),
            (FieldKind::Text, Json::String(s)) => Ok(Value::Text(s.clone())),
            (FieldKind::Uuid, Json::String(s)) => Uuid::parse_str(s)
                .map(Value::Uuid)
                .map_err(|e| ValueError::Invalid(format!("invalid uuid {:?}: {}", s, e))),
            (FieldKind::Timestamp, Json::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|d| Value::Timestamp(d.with_timezone(&Utc)))
                .map_err(|e| ValueError::Invalid(format!("invalid RFC 3339 timestamp {:?}: {}", s, e))),
            (expected, other) => Err(ValueError::TypeMismatch {
                expected,
                got: json_type_name(other),
            }),
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => Json::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Text(s) => Json::String(s.clone()),
            Value::Uuid(u) => Json::String(u.to_string()),
            Value::Timestamp(t) => Json::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Json(j) => j.clone(),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Uuid(u) => serializer.collect_str(u),
            Value::Timestamp(t) => {
                serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Json(j) => j.serialize(serializer),
        }
    }
}

/// Same-kind ordering, with nulls after every non-null value (PostgreSQL's ascending
/// default). Text compares byte-wise. Values of different kinds are unordered, and JSON
/// values only compare equal.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Greater),
            (_, Value::Null) => Some(Ordering::Less),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (Value::Uuid(a), Value::Uuid(b)) => a.partial_cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.partial_cmp(b),
            (Value::Json(a), Value::Json(b)) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl<'q> Encode<'q, Postgres> for Value {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf),
            Value::Int(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf),
            Value::Float(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf),
            Value::Text(s) => <String as Encode<Postgres>>::encode_by_ref(s, buf),
            Value::Uuid(u) => <Uuid as Encode<Postgres>>::encode_by_ref(u, buf),
            Value::Timestamp(t) => <DateTime<Utc> as Encode<Postgres>>::encode_by_ref(t, buf),
            Value::Json(j) => <Json as Encode<Postgres>>::encode_by_ref(j, buf),
        }
    }

    // Each variant declares its own parameter type instead of the static TEXT below.
    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            Value::Null | Value::Text(_) => <String as Type<Postgres>>::type_info(),
            Value::Bool(_) => <bool as Type<Postgres>>::type_info(),
            Value::Int(_) => <i64 as Type<Postgres>>::type_info(),
            Value::Float(_) => <f64 as Type<Postgres>>::type_info(),
            Value::Uuid(_) => <Uuid as Type<Postgres>>::type_info(),
            Value::Timestamp(_) => <DateTime<Utc> as Type<Postgres>>::type_info(),
            Value::Json(_) => <Json as Type<Postgres>>::type_info(),
        })
    }
}

impl Type<Postgres> for Value {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

/// Read column `index` of `row` as `kind`, accepting the narrower PostgreSQL widths
/// (int2/int4 for integers, float4 for floats, timestamp without time zone).
pub fn decode_cell(row: &PgRow, index: usize, kind: FieldKind) -> Result<Value, sqlx::Error> {
    let value = match kind {
        FieldKind::Bool => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
        FieldKind::Int => {
            if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
                v.map(Value::Int)
            } else if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
                v.map(|n| Value::Int(n.into()))
            } else {
                row.try_get::<Option<i16>, _>(index)?.map(|n| Value::Int(n.into()))
            }
        }
        FieldKind::Float => {
            if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
                v.map(Value::Float)
            } else {
                row.try_get::<Option<f32>, _>(index)?.map(|n| Value::Float(n.into()))
            }
        }
        FieldKind::Text => row.try_get::<Option<String>, _>(index)?.map(Value::Text),
        FieldKind::Uuid => row.try_get::<Option<Uuid>, _>(index)?.map(Value::Uuid),
        FieldKind::Timestamp => {
            if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(index) {
                v.map(Value::Timestamp)
            } else {
                row.try_get::<Option<NaiveDateTime>, _>(index)?
                    .map(|d| Value::Timestamp(d.and_utc()))
            }
        }
        FieldKind::Json => row.try_get::<Option<Json>, _>(index)?.map(Value::Json),
    };
    Ok(value.unwrap_or(Value::Null))
}
