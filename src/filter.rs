//! Filter DSL: a JSON object parsed into an expression tree and rendered as a SQL predicate.
//!
//! ```text
//! {}                                   match everything
//! {"$and": [<filter>, ...]}            also "$or"
//! {"<field>": {"<op>": <value>}}       op: $eq $nq $gt $lt $gte $lte $in $nin $regex
//! ```

use crate::entity::{Entity, Field};
use crate::error::EntityError;
use crate::sql::{quoted, QueryBuf};
use crate::value::{Value, ValueError};
use serde_json::{Map, Value as Json};
use std::fmt;
use std::marker::PhantomData;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    fn sql(&self) -> &'static str {
        match self {
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionOp {
    Regex,
    Eq,
    Ne,
    In,
    NotIn,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl ConditionOp {
    fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "$eq" => ConditionOp::Eq,
            "$nq" => ConditionOp::Ne,
            "$gt" => ConditionOp::Gt,
            "$lt" => ConditionOp::Lt,
            "$gte" => ConditionOp::Gte,
            "$lte" => ConditionOp::Lte,
            "$in" => ConditionOp::In,
            "$nin" => ConditionOp::NotIn,
            "$regex" => ConditionOp::Regex,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    One(Value),
    Many(Vec<Value>),
}

impl Operand {
    fn values(&self) -> &[Value] {
        match self {
            Operand::One(v) => std::slice::from_ref(v),
            Operand::Many(vs) => vs,
        }
    }

    fn scalar(&self) -> Value {
        self.values().first().cloned().unwrap_or(Value::Null)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Logical {
        op: LogicalOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Condition {
        field: String,
        op: ConditionOp,
        operand: Operand,
    },
}

impl Expression {
    /// Render into `q`, appending parameters in left-to-right order.
    pub fn render(&self, q: &mut QueryBuf) -> String {
        match self {
            Expression::Logical { op, left, right } => {
                let l = left.render(q);
                let r = right.render(q);
                format!("({} {} {})", l, op.sql(), r)
            }
            Expression::Condition { field, op, operand } => render_condition(q, field, *op, operand),
        }
    }
}

fn render_condition(q: &mut QueryBuf, field: &str, op: ConditionOp, operand: &Operand) -> String {
    let column = quoted(field);
    let compare = |q: &mut QueryBuf, sym: &str| format!("{} {} {}", column, sym, q.push_param(operand.scalar()));
    match op {
        ConditionOp::Eq if operand.scalar().is_null() => format!("{} IS NULL", column),
        ConditionOp::Ne if operand.scalar().is_null() => format!("{} IS NOT NULL", column),
        ConditionOp::Eq => compare(q, "="),
        ConditionOp::Ne => compare(q, "<>"),
        ConditionOp::Gt => compare(q, ">"),
        ConditionOp::Lt => compare(q, "<"),
        ConditionOp::Gte => compare(q, ">="),
        ConditionOp::Lte => compare(q, "<="),
        ConditionOp::In | ConditionOp::NotIn => {
            let values = operand.values();
            if values.is_empty() {
                let constant = if op == ConditionOp::In { "(1=0)" } else { "(1=1)" };
                return constant.to_string();
            }
            let phs: Vec<String> = values.iter().map(|v| q.push_param(v.clone())).collect();
            let keyword = if op == ConditionOp::In { "IN" } else { "NOT IN" };
            format!("{} {} ({})", column, keyword, phs.join(", "))
        }
        ConditionOp::Regex => format!("REGEXP_LIKE({}, {})", column, q.push_param(operand.scalar())),
    }
}

/// A parsed filter bound to the entity whose fields it references.
pub struct Filter<E> {
    expression: Option<Expression>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Filter<E> {
    fn clone(&self) -> Self {
        Filter {
            expression: self.expression.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Filter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter").field("expression", &self.expression).finish()
    }
}

impl<E> PartialEq for Filter<E> {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl<E> Default for Filter<E> {
    fn default() -> Self {
        Filter {
            expression: None,
            _entity: PhantomData,
        }
    }
}

impl<E> Filter<E> {
    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn expression(&self) -> Option<&Expression> {
        self.expression.as_ref()
    }

    pub fn render(&self, q: &mut QueryBuf) -> Option<String> {
        self.expression.as_ref().map(|e| e.render(q))
    }
}

fn invalid(msg: impl Into<String>) -> EntityError {
    EntityError::InvalidFilterExpression(msg.into())
}

/// The only entry of a one-key object.
fn single_entry<'a>(obj: &'a Map<String, Json>, context: &str) -> Result<(&'a String, &'a Json), EntityError> {
    let mut entries = obj.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(invalid(format!(
            "{} must have exactly one key, found {}",
            context,
            obj.len()
        ))),
    }
}

impl<E: Entity> Filter<E> {
    /// Parse the DSL. Blank input and `{}` match everything.
    pub fn parse(input: &str) -> Result<Self, EntityError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::all());
        }
        let json: Json = serde_json::from_str(input).map_err(|e| invalid(e.to_string()))?;
        let expression = match json.as_object() {
            Some(obj) if obj.is_empty() => None,
            _ => parse_node::<E>(&json)?,
        };
        Ok(Filter {
            expression,
            _entity: PhantomData,
        })
    }
}

fn parse_node<E: Entity>(json: &Json) -> Result<Option<Expression>, EntityError> {
    let obj = json
        .as_object()
        .ok_or_else(|| invalid("filter must be a JSON object"))?;
    let (key, value) = single_entry(obj, "filter object")?;
    match key.as_str() {
        "$and" => parse_logical::<E>(LogicalOp::And, key, value),
        "$or" => parse_logical::<E>(LogicalOp::Or, key, value),
        k if k.starts_with('$') => Err(invalid(format!("unknown logical operator {:?}", k))),
        field => parse_condition::<E>(field, value).map(Some),
    }
}

fn parse_logical<E: Entity>(op: LogicalOp, key: &str, value: &Json) -> Result<Option<Expression>, EntityError> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(format!("{} expects an array of filters", key)))?;
    let mut children = Vec::with_capacity(items.len());
    for item in items {
        if let Some(child) = parse_node::<E>(item)? {
            children.push(child);
        }
    }
    Ok(children.into_iter().reduce(|left, right| Expression::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }))
}

fn decode(field: &Field, json: &Json) -> Result<Value, EntityError> {
    field
        .decode(json)
        .map_err(|e| EntityError::invalid_value(field.name, e))
}

fn parse_condition<E: Entity>(name: &str, value: &Json) -> Result<Expression, EntityError> {
    // Resolve the field first so unknown fields are reported whatever the operator.
    let field = E::field(name).ok_or_else(|| EntityError::UnknownFieldInFilter(name.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| invalid(format!("condition on {:?} must be an object", name)))?;
    let (op_key, raw) = single_entry(obj, "condition")?;
    let op = ConditionOp::from_key(op_key)
        .ok_or_else(|| invalid(format!("unknown operator {:?}", op_key)))?;

    let operand = match op {
        ConditionOp::In | ConditionOp::NotIn => {
            let items = raw
                .as_array()
                .ok_or_else(|| invalid(format!("{} expects an array", op_key)))?;
            let values = items
                .iter()
                .map(|item| decode(&field, item))
                .collect::<Result<Vec<_>, _>>()?;
            Operand::Many(values)
        }
        ConditionOp::Regex => {
            let pattern = raw.as_str().ok_or_else(|| {
                EntityError::invalid_value(name, ValueError::Invalid("$regex expects a string pattern".into()))
            })?;
            Operand::One(Value::Text(pattern.to_string()))
        }
        ConditionOp::Eq | ConditionOp::Ne => Operand::One(decode(&field, raw)?),
        ConditionOp::Gt | ConditionOp::Lt | ConditionOp::Gte | ConditionOp::Lte => {
            let v = decode(&field, raw)?;
            if v.is_null() {
                return Err(EntityError::invalid_value(
                    name,
                    ValueError::Invalid(format!("{} cannot compare against null", op_key)),
                ));
            }
            Operand::One(v)
        }
    };
    Ok(Expression::Condition {
        field: field.name.to_string(),
        op,
        operand,
    })
}
