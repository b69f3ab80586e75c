//! Builds parameterized SELECT, COUNT, INSERT, UPDATE and DELETE statements for a table.
//! Identifiers come from entity declarations and are always quoted; values are parameters.

use crate::value::Value;

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

/// Type name usable in a `::` cast. Serial pseudo-types cast as their storage type.
pub fn cast_type(sql_type: &str) -> String {
    match sql_type.trim().to_ascii_lowercase().as_str() {
        "smallserial" | "serial2" => "smallint".into(),
        "serial" | "serial4" => "integer".into(),
        "bigserial" | "serial8" => "bigint".into(),
        _ => sql_type.trim().to_string(),
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    pub fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Placeholder for `v`. Null is written inline as `NULL` and takes no parameter slot.
    pub fn push_param(&mut self, v: Value) -> String {
        if v.is_null() {
            return "NULL".into();
        }
        self.params.push(v);
        format!("${}", self.params.len())
    }

    /// Placeholder cast to the column's declared type.
    pub fn push_typed(&mut self, v: Value, sql_type: &str) -> String {
        if v.is_null() {
            return "NULL".into();
        }
        format!("{}::{}", self.push_param(v), cast_type(sql_type))
    }
}

/// `"col" = $n`, or `"col" IS NULL` for a null value.
pub fn equals(q: &mut QueryBuf, column: &str, v: Value) -> String {
    if v.is_null() {
        format!("{} IS NULL", quoted(column))
    } else {
        format!("{} = {}", quoted(column), q.push_param(v))
    }
}

pub fn column_list<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| quoted(c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// ` WHERE a AND b`, or nothing when there are no predicates.
pub fn where_clause(predicates: &[String]) -> String {
    if predicates.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", predicates.join(" AND "))
    }
}

/// AND of primary-key equalities.
pub fn key_locator(q: &mut QueryBuf, keys: &[(String, Value)]) -> String {
    keys.iter()
        .map(|(column, v)| equals(q, column, v.clone()))
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub fn select<S: AsRef<str>>(table: &str, columns: &[S], predicates: &[String]) -> String {
    format!(
        "SELECT {} FROM {}{}",
        column_list(columns),
        table,
        where_clause(predicates)
    )
}

/// Row count of an arbitrary SELECT.
pub fn count_of(inner: &str) -> String {
    format!("SELECT COUNT(*) FROM ({}) AS entity_count", inner)
}

pub fn paged(base: &str, order_by: Option<&str>, limit: u64) -> String {
    match order_by {
        Some(order) => format!("{} ORDER BY {} LIMIT {}", base, order, limit),
        None => format!("{} LIMIT {}", base, limit),
    }
}

/// Quote one word as a tsquery lexeme so operator characters in user input stay literal.
fn tsquery_term(word: &str) -> String {
    format!("'{}'", word.replace('\\', "\\\\").replace('\'', "''"))
}

/// Full-text predicate over a tsvector column. Whitespace runs become `&` so every word must match.
pub fn search_predicate(q: &mut QueryBuf, column: &str, search: &str) -> Option<String> {
    let terms: Vec<String> = search.split_whitespace().map(tsquery_term).collect();
    if terms.is_empty() {
        return None;
    }
    let ph = q.push_param(Value::Text(terms.join(" & ")));
    Some(format!("{} @@ to_tsquery('simple', {})", quoted(column), ph))
}

pub fn select_by_key<S: AsRef<str>>(table: &str, columns: &[S], keys: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let locator = key_locator(&mut q, keys);
    q.sql = select(table, columns, &[locator]);
    q
}

/// Multi-row INSERT. `columns` pairs each name with its declared SQL type; every row is in
/// column order.
pub fn insert_many(table: &str, columns: &[(String, String)], rows: &[Vec<Value>]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let names: Vec<&str> = columns.iter().map(|(n, _)| n.as_str()).collect();
    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            let phs: Vec<String> = row
                .iter()
                .zip(columns)
                .map(|(v, (_, sql_type))| q.push_typed(v.clone(), sql_type))
                .collect();
            format!("({})", phs.join(", "))
        })
        .collect();
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        column_list(&names),
        tuples.join(", ")
    );
    q
}

/// UPDATE by key. `sets` holds (column, sql type, value).
pub fn update_by_key(
    table: &str,
    sets: &[(String, String, Value)],
    keys: &[(String, Value)],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let assignments: Vec<String> = sets
        .iter()
        .map(|(column, sql_type, v)| format!("{} = {}", quoted(column), q.push_typed(v.clone(), sql_type)))
        .collect();
    let locator = key_locator(&mut q, keys);
    q.sql = format!("UPDATE {} SET {} WHERE {}", table, assignments.join(", "), locator);
    q
}

pub fn exists_by_key(table: &str, keys: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let locator = key_locator(&mut q, keys);
    q.sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE {})", table, locator);
    q
}

pub fn delete_by_key(table: &str, keys: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let locator = key_locator(&mut q, keys);
    q.sql = format!("DELETE FROM {} WHERE {}", table, locator);
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn quoting_escapes_double_quotes() {
        assert_eq!(quoted("name"), "\"name\"");
        assert_eq!(quoted("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(qualified_table("public", "people"), "\"public\".\"people\"");
    }

    #[test]
    fn null_params_are_inlined() {
        let mut q = QueryBuf::new();
        assert_eq!(q.push_param(Value::Int(1)), "$1");
        assert_eq!(q.push_param(Value::Null), "NULL");
        assert_eq!(q.push_param(Value::Int(2)), "$2");
        assert_eq!(q.params, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(equals(&mut q, "nick", Value::Null), "\"nick\" IS NULL");
    }

    #[test]
    fn select_by_composite_key() {
        let q = select_by_key(
            "\"public\".\"t\"",
            &["a", "b", "c"],
            &keys(&[("a", Value::Int(1)), ("b", Value::Text("x".into()))]),
        );
        assert_eq!(
            q.sql,
            "SELECT \"a\", \"b\", \"c\" FROM \"public\".\"t\" WHERE \"a\" = $1 AND \"b\" = $2"
        );
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn insert_many_numbers_placeholders_across_rows() {
        let columns = vec![
            ("id".to_string(), "BIGSERIAL".to_string()),
            ("name".to_string(), "TEXT".to_string()),
        ];
        let rows = vec![
            vec![Value::Int(1), Value::Text("a".into())],
            vec![Value::Int(2), Value::Null],
        ];
        let q = insert_many("t", &columns, &rows);
        assert_eq!(
            q.sql,
            "INSERT INTO t (\"id\", \"name\") VALUES ($1::bigint, $2::TEXT), ($3::bigint, NULL)"
        );
        assert_eq!(q.params.len(), 3);
    }

    #[test]
    fn update_sets_before_locator() {
        let q = update_by_key(
            "t",
            &[("name".into(), "TEXT".into(), Value::Text("bob".into()))],
            &keys(&[("id", Value::Int(7))]),
        );
        assert_eq!(q.sql, "UPDATE t SET \"name\" = $1::TEXT WHERE \"id\" = $2");
        assert_eq!(q.params, vec![Value::Text("bob".into()), Value::Int(7)]);
    }

    #[test]
    fn delete_and_exists() {
        let k = keys(&[("id", Value::Int(7))]);
        assert_eq!(delete_by_key("t", &k).sql, "DELETE FROM t WHERE \"id\" = $1");
        assert_eq!(
            exists_by_key("t", &k).sql,
            "SELECT EXISTS (SELECT 1 FROM t WHERE \"id\" = $1)"
        );
    }

    #[test]
    fn search_joins_terms_with_and() {
        let mut q = QueryBuf::new();
        assert_eq!(search_predicate(&mut q, "tsv", "   "), None);
        let p = search_predicate(&mut q, "tsv", " quick  brown\tfox ").unwrap();
        assert_eq!(p, "\"tsv\" @@ to_tsquery('simple', $1)");
        assert_eq!(q.params, vec![Value::Text("'quick' & 'brown' & 'fox'".into())]);
    }

    #[test]
    fn search_terms_are_quoted_lexemes() {
        let mut q = QueryBuf::new();
        search_predicate(&mut q, "tsv", "a (b !c|d").unwrap();
        search_predicate(&mut q, "tsv", r"o'neil back\slash").unwrap();
        assert_eq!(
            q.params,
            vec![
                Value::Text("'a' & '(b' & '!c|d'".into()),
                Value::Text(r"'o''neil' & 'back\\slash'".into()),
            ]
        );
    }

    #[test]
    fn count_and_page_wrappers() {
        let base = select("t", &["id"], &["\"id\" > $1".to_string()]);
        assert_eq!(
            count_of(&base),
            "SELECT COUNT(*) FROM (SELECT \"id\" FROM t WHERE \"id\" > $1) AS entity_count"
        );
        assert_eq!(
            paged(&base, Some("\"id\" ASC"), 3),
            "SELECT \"id\" FROM t WHERE \"id\" > $1 ORDER BY \"id\" ASC LIMIT 3"
        );
        assert_eq!(paged("SELECT 1", None, 11), "SELECT 1 LIMIT 11");
    }
}
