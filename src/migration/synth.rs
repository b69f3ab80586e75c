//! Migration synthesis: CREATE TABLE for new tables, column diffs for existing ones.

use super::{LiveColumn, Migration, MigrationError, SearchColumn};
use crate::entity::Column;
use crate::sql::{qualified_table, quoted};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn type_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^(?P<base>[a-z_][a-z0-9_ ]*?)\s*(?P<args>\([^)]*\))?\s*(?P<zone>with(?:out)? time zone)?\s*(?P<array>(?:\[\d*\])*)$",
            )
            .ok()
        })
        .as_ref()
}

/// Normalize a type name so declared spellings compare equal to `format_type` output:
/// `BIGINT`, `int8` and `bigserial` are all `bigint`, `TIMESTAMPTZ(3)` is
/// `timestamp(3) with time zone`, `VARCHAR(20)` is `character varying(20)`.
pub fn canonical_type(sql_type: &str) -> String {
    let normalized = sql_type
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    let Some(caps) = type_pattern().and_then(|re| re.captures(&normalized)) else {
        return normalized;
    };
    let base = caps.name("base").map_or("", |m| m.as_str()).trim();
    let args: String = caps
        .name("args")
        .map_or("", |m| m.as_str())
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let zone = caps.name("zone").map(|m| m.as_str());
    let array = caps.name("array").map_or("", |m| m.as_str());

    let (base, args, zone) = match (base, zone) {
        ("timestamptz", None) => ("timestamp", args, Some("with time zone")),
        ("timestamp", None) => ("timestamp", args, Some("without time zone")),
        ("timetz", None) => ("time", args, Some("with time zone")),
        ("time", None) => ("time", args, Some("without time zone")),
        ("int8" | "bigserial" | "serial8", z) => ("bigint", args, z),
        ("int" | "int4" | "serial" | "serial4", z) => ("integer", args, z),
        ("int2" | "smallserial" | "serial2", z) => ("smallint", args, z),
        ("float8" | "float", z) => ("double precision", args, z),
        ("float4", z) => ("real", args, z),
        ("bool", z) => ("boolean", args, z),
        ("varchar", z) => ("character varying", args, z),
        ("char" | "bpchar" | "character", z) if args.is_empty() => ("character", "(1)".to_string(), z),
        ("char" | "bpchar", z) => ("character", args, z),
        ("decimal", z) => ("numeric", args, z),
        (b, z) => (b, args, z),
    };
    // Arrays lose their bounds in the catalog.
    let array = "[]".repeat(array.matches('[').count());
    match zone {
        Some(z) => format!("{}{} {}{}", base, args, z, array),
        None => format!("{}{}{}", base, args, array),
    }
}

/// CREATE TABLE in declared column order, followed by a managed search column. A lone key
/// column carries `PRIMARY KEY` inline; a composite key becomes a table constraint.
pub fn initial_migration(schema: &str, table: &str, columns: &[Column], search: &SearchColumn) -> Migration {
    let full_name = qualified_table(schema, table);
    let keys: Vec<&Column> = columns.iter().filter(|c| c.primary_key).collect();
    let inline_key = keys.len() == 1;

    let mut col_defs: Vec<String> = columns
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quoted(&c.name), c.sql_type);
            if c.primary_key && inline_key {
                def.push_str(" PRIMARY KEY");
            } else if c.primary_key || !c.nullable {
                def.push_str(" NOT NULL");
            }
            def
        })
        .collect();
    col_defs.extend(search.definition());
    if keys.len() > 1 {
        let key_cols: Vec<String> = keys.iter().map(|c| quoted(&c.name)).collect();
        col_defs.push(format!("PRIMARY KEY ({})", key_cols.join(", ")));
    }

    let mut up = String::new();
    if schema != "public" {
        up.push_str(&format!("CREATE SCHEMA IF NOT EXISTS {};\n", quoted(schema)));
    }
    up.push_str(&format!(
        "CREATE TABLE {} (\n  {}\n);\n",
        full_name,
        col_defs.join(",\n  ")
    ));
    Migration {
        up,
        down: format!("DROP TABLE {};\n", full_name),
    }
}

/// Column-level diff against the live table. `None` when nothing changed.
///
/// Added columns are created nullable so the statement succeeds on populated tables. The
/// rollback of a dropped column re-adds it with its observed type only; nullability and
/// defaults are not restored. The search column is never dropped; a managed one that is
/// missing is added in its own statement after the declared columns exist.
pub fn diff_migration(
    schema: &str,
    table: &str,
    live: &[LiveColumn],
    declared: &[Column],
    search: &SearchColumn,
) -> Result<Option<Migration>, MigrationError> {
    let live_by_name: HashMap<&str, &LiveColumn> = live.iter().map(|c| (c.name.as_str(), c)).collect();
    let declared_by_name: HashMap<&str, &Column> = declared.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut up = Vec::new();
    let mut down = Vec::new();

    for c in declared {
        match live_by_name.get(c.name.as_str()) {
            None => {
                if !c.nullable && !c.primary_key {
                    tracing::warn!(table, column = %c.name, "new column declared NOT NULL is added as nullable");
                }
                up.push(format!("ADD COLUMN {} {}", quoted(&c.name), c.sql_type));
                down.push(format!("DROP COLUMN {}", quoted(&c.name)));
            }
            Some(l) => {
                let (live_type, declared_type) = (canonical_type(&l.sql_type), canonical_type(&c.sql_type));
                if live_type != declared_type {
                    return Err(MigrationError::UnsupportedTypeChange {
                        table: table.to_string(),
                        column: c.name.clone(),
                        live: l.sql_type.clone(),
                        declared: c.sql_type.clone(),
                    });
                }
                let declared_not_null = c.primary_key || !c.nullable;
                if l.not_null != declared_not_null {
                    tracing::warn!(
                        table,
                        column = %c.name,
                        live_not_null = l.not_null,
                        declared_not_null,
                        "nullability drift is not migrated"
                    );
                }
                if l.primary_key != c.primary_key {
                    tracing::warn!(
                        table,
                        column = %c.name,
                        live_primary_key = l.primary_key,
                        declared_primary_key = c.primary_key,
                        "primary key drift is not migrated"
                    );
                }
            }
        }
    }
    for l in live {
        if !declared_by_name.contains_key(l.name.as_str()) && l.name != search.name {
            up.push(format!("DROP COLUMN {}", quoted(&l.name)));
            down.push(format!("ADD COLUMN {} {}", quoted(&l.name), l.sql_type));
        }
    }

    let add_search = search
        .definition()
        .filter(|_| !live_by_name.contains_key(search.name.as_str()));

    if up.is_empty() && add_search.is_none() {
        return Ok(None);
    }
    let full_name = qualified_table(schema, table);
    let mut migration = Migration {
        up: String::new(),
        down: String::new(),
    };
    if !up.is_empty() {
        // Rollback undoes the actions in reverse.
        down.reverse();
        migration.up = format!("ALTER TABLE {} {};\n", full_name, up.join(", "));
        migration.down = format!("ALTER TABLE {} {};\n", full_name, down.join(", "));
    }
    if let Some(definition) = add_search {
        migration.up.push_str(&format!("ALTER TABLE {} ADD COLUMN {};\n", full_name, definition));
        migration.down.insert_str(
            0,
            &format!("ALTER TABLE {} DROP COLUMN {};\n", full_name, quoted(&search.name)),
        );
    }
    Ok(Some(migration))
}
