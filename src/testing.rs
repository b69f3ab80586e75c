//! Fixture entities shared by unit tests.

use crate::entity::{assign, Column, Entity, Field, FieldType, SqlEntity, UpdateEntity};
use crate::types::Patch;
use crate::value::{Value, ValueError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub age: i32,
    pub nickname: Option<String>,
}

impl Person {
    pub fn sample(id: i64, name: &str, age: i32) -> Self {
        Person {
            id,
            name: name.to_string(),
            age,
            nickname: None,
        }
    }
}

impl Entity for Person {
    fn new() -> Self {
        Person::default()
    }

    fn fields() -> Vec<Field> {
        vec![
            Field::of::<i64>("id"),
            Field::of::<String>("name"),
            Field::of::<i32>("age"),
            Field::of::<Option<String>>("nickname"),
        ]
    }

    fn get(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => self.id.to_value(),
            "name" => self.name.to_value(),
            "age" => self.age.to_value(),
            "nickname" => self.nickname.to_value(),
            _ => return None,
        })
    }

    fn set(&mut self, name: &str, value: Value) -> Result<(), ValueError> {
        match name {
            "id" => assign(&mut self.id, value),
            "name" => assign(&mut self.name, value),
            "age" => assign(&mut self.age, value),
            "nickname" => assign(&mut self.nickname, value),
            other => Err(ValueError::UnknownField(other.to_string())),
        }
    }
}

impl SqlEntity for Person {
    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", "BIGINT").primary_key(),
            Column::new("name", "TEXT"),
            Column::new("age", "INTEGER"),
            Column::new("nickname", "TEXT").nullable(),
        ]
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PersonPatch {
    #[serde(default)]
    pub id: Patch<i64>,
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub age: Patch<i32>,
    #[serde(default)]
    pub nickname: Patch<Option<String>>,
}

impl UpdateEntity for PersonPatch {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => self.id.value(),
            "name" => self.name.value(),
            "age" => self.age.value(),
            "nickname" => self.nickname.value(),
            _ => None,
        }
    }
}

/// Covers the remaining scalar kinds.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub active: bool,
    pub score: f64,
}

impl Entity for Event {
    fn new() -> Self {
        Event {
            id: Uuid::nil(),
            at: DateTime::<Utc>::default(),
            active: false,
            score: 0.0,
        }
    }

    fn fields() -> Vec<Field> {
        vec![
            Field::of::<Uuid>("id"),
            Field::of::<DateTime<Utc>>("at"),
            Field::of::<bool>("active"),
            Field::of::<f64>("score"),
        ]
    }

    fn get(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => self.id.to_value(),
            "at" => self.at.to_value(),
            "active" => self.active.to_value(),
            "score" => self.score.to_value(),
            _ => return None,
        })
    }

    fn set(&mut self, name: &str, value: Value) -> Result<(), ValueError> {
        match name {
            "id" => assign(&mut self.id, value),
            "at" => assign(&mut self.at, value),
            "active" => assign(&mut self.active, value),
            "score" => assign(&mut self.score, value),
            other => Err(ValueError::UnknownField(other.to_string())),
        }
    }
}
