//! Sort tokens, pagination cursors and keyset predicates.

use crate::entity::Entity;
use crate::error::EntityError;
use crate::sql::{quoted, QueryBuf};
use crate::value::Value;
use serde::{Serialize, Serializer};
use serde_json::Value as Json;
use std::fmt;
use std::marker::PhantomData;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
    /// No sign given. Rendered without a keyword; behaves as ascending.
    Unspecified,
}

impl Direction {
    fn keyword(&self) -> Option<&'static str> {
        match self {
            Direction::Asc => Some("ASC"),
            Direction::Desc => Some("DESC"),
            Direction::Unspecified => None,
        }
    }

    /// Comparison that moves forward in this direction.
    fn forward(&self, inclusive: bool) -> &'static str {
        match (self, inclusive) {
            (Direction::Desc, false) => "<",
            (Direction::Desc, true) => "<=",
            (_, false) => ">",
            (_, true) => ">=",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: Direction,
    /// The field admits NULL, so keyset terms must place NULL rows.
    pub nullable: bool,
    pub cursor_part: Option<Value>,
}

/// Keyset pieces for one sort entry positioned at a cursor value. `after` is `None` when no
/// row sorts strictly after the value; `from` is `None` when every row qualifies.
struct Bound {
    equal: String,
    after: Option<String>,
    from: Option<String>,
}

impl Sort {
    fn bound(&self, q: &mut QueryBuf, value: Value) -> Bound {
        let column = quoted(&self.field);
        let descending = self.direction == Direction::Desc;
        if value.is_null() {
            let equal = format!("{} IS NULL", column);
            return if descending {
                Bound {
                    after: Some(format!("{} IS NOT NULL", column)),
                    from: None,
                    equal,
                }
            } else {
                Bound {
                    after: None,
                    from: Some(equal.clone()),
                    equal,
                }
            };
        }
        let ph = q.push_param(value);
        let compare = |inclusive: bool| {
            let term = format!("{} {} {}", column, self.direction.forward(inclusive), ph);
            if self.nullable && !descending {
                format!("({} OR {} IS NULL)", term, column)
            } else {
                term
            }
        };
        Bound {
            equal: format!("{} = {}", column, ph),
            after: Some(compare(false)),
            from: Some(compare(true)),
        }
    }
}

/// Sort-key values of the first row of the next page, one per sort entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Cursor(pub Vec<Value>);

impl Cursor {
    /// JSON-encode each part and join with `,`.
    pub fn encode(&self) -> String {
        self.0
            .iter()
            .map(|v| v.to_json().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

/// Split an encoded cursor at commas outside JSON strings, arrays and objects.
pub fn split_parts(encoded: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in encoded.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&encoded[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&encoded[start..]);
    parts
}

/// Ordered sort entries for entity `E`, optionally positioned by a cursor.
pub struct Sorts<E> {
    entries: Vec<Sort>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Sorts<E> {
    fn clone(&self) -> Self {
        Sorts {
            entries: self.entries.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Sorts<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

impl<E> PartialEq for Sorts<E> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<E> Default for Sorts<E> {
    fn default() -> Self {
        Sorts {
            entries: Vec::new(),
            _entity: PhantomData,
        }
    }
}

impl<E> Sorts<E> {
    pub fn entries(&self) -> &[Sort] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cursor this sort was positioned with, if any.
    pub fn cursor(&self) -> Option<Cursor> {
        self.entries
            .iter()
            .map(|s| s.cursor_part.clone())
            .collect::<Option<Vec<_>>>()
            .filter(|parts| !parts.is_empty())
            .map(Cursor)
    }

    /// `(s0 > c0) OR (s0 = c0 AND s1 > c1) OR ...`, with the final comparison inclusive so the
    /// boundary row a cursor was taken from is the first row returned. Nullable fields follow
    /// PostgreSQL's default placement: NULLs last ascending, first descending.
    pub fn keyset_predicate(&self, q: &mut QueryBuf) -> Option<String> {
        let parts = self
            .entries
            .iter()
            .map(|s| s.cursor_part.clone())
            .collect::<Option<Vec<_>>>()?;
        if parts.is_empty() {
            return None;
        }
        let bounds: Vec<Bound> = self
            .entries
            .iter()
            .zip(parts)
            .map(|(entry, value)| entry.bound(q, value))
            .collect();
        let last = bounds.len() - 1;
        let terms: Vec<String> = (0..bounds.len())
            .filter_map(|i| {
                let mut conj: Vec<String> = bounds[..i].iter().map(|b| b.equal.clone()).collect();
                if i < last {
                    // No row sorts after this value, so the term never matches.
                    conj.push(bounds[i].after.clone()?);
                } else if let Some(from) = &bounds[i].from {
                    conj.push(from.clone());
                } else if conj.is_empty() {
                    conj.push("TRUE".into());
                }
                Some(format!("({})", conj.join(" AND ")))
            })
            .collect();
        Some(format!("({})", terms.join(" OR ")))
    }

    pub fn order_by(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        Some(
            self.entries
                .iter()
                .map(|s| match s.direction.keyword() {
                    Some(k) => format!("{} {}", quoted(&s.field), k),
                    None => quoted(&s.field),
                })
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

impl<E: Entity> Sorts<E> {
    /// Parse `[+-]<field>` tokens and an optional encoded cursor. Blank tokens are skipped and
    /// a blank cursor counts as absent.
    pub fn parse<S: AsRef<str>>(tokens: &[S], cursor: Option<&str>) -> Result<Self, EntityError> {
        let mut entries = Vec::new();
        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() {
                continue;
            }
            let (direction, name) = match token.as_bytes()[0] {
                b'+' => (Direction::Asc, &token[1..]),
                b'-' => (Direction::Desc, &token[1..]),
                _ => (Direction::Unspecified, token),
            };
            let field = E::field(name).ok_or_else(|| EntityError::UnknownField(name.to_string()))?;
            entries.push(Sort {
                field: field.name.to_string(),
                direction,
                nullable: field.nullable,
                cursor_part: None,
            });
        }

        if let Some(encoded) = cursor.map(str::trim).filter(|c| !c.is_empty()) {
            let parts = split_parts(encoded);
            if parts.len() != entries.len() {
                return Err(EntityError::InvalidCursor(format!(
                    "cursor has {} parts, sort has {} fields",
                    parts.len(),
                    entries.len()
                )));
            }
            for (entry, raw) in entries.iter_mut().zip(parts) {
                entry.cursor_part = Some(decode_part::<E>(&entry.field, raw)?);
            }
        }

        Ok(Sorts {
            entries,
            _entity: PhantomData,
        })
    }

    /// Cursor pointing at `row`.
    pub fn next_cursor(&self, row: &E) -> Cursor {
        Cursor(
            self.entries
                .iter()
                .map(|s| row.get(&s.field).unwrap_or(Value::Null))
                .collect(),
        )
    }
}

fn decode_part<E: Entity>(name: &str, raw: &str) -> Result<Value, EntityError> {
    let invalid = |reason: String| EntityError::InvalidCursor(format!("{}: {}", name, reason));
    let field = E::field(name).ok_or_else(|| EntityError::UnknownField(name.to_string()))?;
    let json: Json = serde_json::from_str(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    // Non-nullable decoders reject null themselves.
    field.decode(&json).map_err(|e| invalid(e.to_string()))
}
