//! SQL cell execution against a single configured database connection
//! (§4.3.4). Placeholders are substituted with driver-native positional
//! parameters; values are never string-concatenated into the query text.

use rusqlite::types::{ToSqlOutput, Value as SqlValue};
use rusqlite::{Connection, ToSql};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::extractor::placeholder_re;

/// Owns the single SQLite connection a session may configure via
/// `SetDbConfig`. SQL cells are rejected with [`Error::NoDatabaseConfigured`]
/// until one is set.
#[derive(Default)]
pub struct SqlEngine {
    conn: Option<Connection>,
}

impl SqlEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&mut self, connection_string: &str) -> Result<()> {
        let conn = Connection::open(connection_string)?;
        self.conn = Some(conn);
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.conn.is_some()
    }

    /// Run raw, unparameterized SQL directly against the configured
    /// connection. Used by tests to seed schema/fixture data; never reached
    /// from cell execution, which always goes through [`Self::execute`].
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.conn.as_ref().ok_or(Error::NoDatabaseConfigured)?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run `source` as a SQL template, resolving each `{name}` placeholder
    /// through `lookup`, and return the `{type:"table",...}` envelope.
    pub fn execute(&self, source: &str, lookup: impl Fn(&str) -> Option<Value>) -> Result<Value> {
        let conn = self.conn.as_ref().ok_or(Error::NoDatabaseConfigured)?;

        let (query, params) = bind_placeholders(source, &lookup)?;
        let mut stmt = conn.prepare(&query)?;

        let column_names: Vec<String> =
            stmt.column_names().iter().map(|s| s.to_string()).collect();

        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let mut rows = stmt.query(param_refs.as_slice())?;

        let mut out_rows = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_names.len());
            for idx in 0..column_names.len() {
                let value: SqlValue = row.get(idx)?;
                values.push(sql_value_to_json(value));
            }
            out_rows.push(Value::Array(values));
        }

        Ok(json!({
            "type": "table",
            "columns": column_names,
            "rows": out_rows,
        }))
    }
}

/// Replace every `{name}` occurrence, in source order, with `?`, collecting
/// the bound values in the same order so positional binding lines up.
fn bind_placeholders(
    source: &str,
    lookup: &impl Fn(&str) -> Option<Value>,
) -> Result<(String, Vec<SqlParam>)> {
    let mut query = String::with_capacity(source.len());
    let mut params = Vec::new();
    let mut last_end = 0;

    for m in placeholder_re().captures_iter(source) {
        let whole = m.get(0).expect("group 0 always matches");
        let name = &m[1];
        let value = lookup(name).ok_or_else(|| Error::MissingTemplateVariable(name.to_string()))?;

        query.push_str(&source[last_end..whole.start()]);
        query.push('?');
        params.push(SqlParam(value));
        last_end = whole.end();
    }
    query.push_str(&source[last_end..]);

    Ok((query, params))
}

/// Wraps a `serde_json::Value` so it can bind directly as a `rusqlite`
/// parameter without an intermediate enum of our own.
struct SqlParam(Value);

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let out = match &self.0 {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(*b as i64)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ToSqlOutput::Owned(SqlValue::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    ToSqlOutput::Owned(SqlValue::Real(f))
                } else {
                    ToSqlOutput::Owned(SqlValue::Null)
                }
            }
            Value::String(s) => ToSqlOutput::Owned(SqlValue::Text(s.clone())),
            // Arrays/objects have no natural SQL scalar form; stored as
            // their JSON text rather than rejected outright.
            other => ToSqlOutput::Owned(SqlValue::Text(other.to_string())),
        };
        Ok(out)
    }
}

fn sql_value_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => Value::from(f),
        // SQLite has no native temporal type; ISO-8601 text columns pass
        // through unchanged, which already satisfies the ISO-serialized
        // requirement without any parsing.
        SqlValue::Text(s) => Value::from(s),
        SqlValue::Blob(b) => {
            use base64::Engine;
            Value::from(base64::engine::general_purpose::STANDARD.encode(b))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup(values: &BTreeMap<&str, Value>) -> impl Fn(&str) -> Option<Value> + '_ {
        move |name| values.get(name).cloned()
    }

    #[test]
    fn binds_placeholders_positionally_in_source_order() {
        let mut values = BTreeMap::new();
        values.insert("min_price", json!(100));
        values.insert("category", json!("books"));

        let (query, params) = bind_placeholders(
            "SELECT name FROM products WHERE price > {min_price} AND cat = {category}",
            &lookup(&values),
        )
        .unwrap();

        assert_eq!(
            query,
            "SELECT name FROM products WHERE price > ? AND cat = ?"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn missing_variable_is_an_error() {
        let values = BTreeMap::new();
        let err = bind_placeholders("SELECT * FROM t WHERE x = {missing}", &lookup(&values));
        assert!(matches!(err, Err(Error::MissingTemplateVariable(name)) if name == "missing"));
    }

    #[test]
    fn executes_against_in_memory_database() {
        let mut engine = SqlEngine::new();
        engine.configure(":memory:").unwrap();
        engine
            .conn
            .as_ref()
            .unwrap()
            .execute_batch("CREATE TABLE products(name TEXT, price INTEGER); INSERT INTO products VALUES ('widget', 150), ('gadget', 50);")
            .unwrap();

        let mut values = BTreeMap::new();
        values.insert("min_price", json!(100));
        let result = engine
            .execute(
                "SELECT name FROM products WHERE price > {min_price}",
                lookup(&values),
            )
            .unwrap();

        assert_eq!(result["type"], "table");
        assert_eq!(result["columns"], json!(["name"]));
        assert_eq!(result["rows"], json!([["widget"]]));
    }

    #[test]
    fn errors_without_configured_database() {
        let engine = SqlEngine::new();
        let result = engine.execute("SELECT 1", |_| None);
        assert!(matches!(result, Err(Error::NoDatabaseConfigured)));
    }
}
