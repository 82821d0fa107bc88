//! DML statement payloads and the JSON <-> row conversions used to log
//! CHANGE records and decode INSERT/UPDATE literals. The full SQL
//! grammar is out of scope (an external validator is assumed to have
//! already produced the query tree); a statement's `QueryNode::value`
//! carries its arguments as a small JSON object instead of raw SQL
//! text, the same convention `CreateTable` uses for its schema.

use crate::error::Error;
use relix_expr::{parse_condition, ConditionNode};
use relix_primitives::ColumnType;
use relix_sats::{Row, Value};
use relix_schema::Schema;
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub values: HashMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub set: HashMap<String, Value>,
    pub condition: Option<ConditionNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub condition: Option<ConditionNode>,
}

pub(crate) fn json_object(value: &str) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        _ => Err(Error::MalformedStatement(format!("expected a JSON object payload, got `{value}`"))),
    }
}

pub(crate) fn require_str(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Result<String, Error> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::MalformedStatement(format!("missing string field `{key}`")))
}

fn parse_where(obj: &serde_json::Map<String, serde_json::Value>) -> Result<Option<ConditionNode>, Error> {
    match obj.get("where").and_then(|v| v.as_str()) {
        Some(text) if !text.trim().is_empty() => Ok(Some(parse_condition(text)?)),
        _ => Ok(None),
    }
}

/// Converts a JSON literal into a [`Value`], coercing numbers to the
/// declared column type the way the parser-level INSERT/UPDATE
/// operators described in the source would: INTEGER truncates a JSON
/// number to `i32`, FLOAT widens it, CHAR/VARCHAR takes the JSON string
/// verbatim (truncation to `max_length` happens at encode time), and a
/// JSON null maps to SQL NULL regardless of declared type.
fn json_literal_to_value(json: &serde_json::Value, col_type: ColumnType) -> Result<Value, Error> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Number(n) => match col_type {
            ColumnType::Integer => n
                .as_i64()
                .map(|i| Value::Integer(i as i32))
                .ok_or_else(|| Error::MalformedStatement(format!("`{n}` is not a valid INTEGER literal"))),
            _ => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| Error::MalformedStatement(format!("`{n}` is not a valid numeric literal"))),
        },
        serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
        serde_json::Value::Bool(b) => Ok(Value::Integer(*b as i32)),
        other => Err(Error::MalformedStatement(format!("unsupported literal `{other}`"))),
    }
}

fn json_values_to_row(obj: &serde_json::Map<String, serde_json::Value>, schema: &Schema) -> Result<HashMap<String, Value>, Error> {
    let mut out = HashMap::with_capacity(obj.len());
    for (col, json) in obj {
        let col_type = schema
            .column(col)
            .map(|c| c.col_type)
            .ok_or_else(|| Error::MalformedStatement(format!("column `{col}` is not part of `{}`", schema.table_name)))?;
        out.insert(col.clone(), json_literal_to_value(json, col_type)?);
    }
    Ok(out)
}

pub fn parse_insert(value: &str, schema: &Schema) -> Result<InsertStatement, Error> {
    let obj = json_object(value)?;
    let table = require_str(&obj, "table")?;
    let values_obj = obj
        .get("values")
        .and_then(|v| v.as_object())
        .ok_or_else(|| Error::MalformedStatement("INSERT payload is missing a `values` object".to_string()))?;
    Ok(InsertStatement {
        table,
        values: json_values_to_row(values_obj, schema)?,
    })
}

pub fn parse_update(value: &str, schema: &Schema) -> Result<UpdateStatement, Error> {
    let obj = json_object(value)?;
    let table = require_str(&obj, "table")?;
    let set_obj = obj
        .get("set")
        .and_then(|v| v.as_object())
        .ok_or_else(|| Error::MalformedStatement("UPDATE payload is missing a `set` object".to_string()))?;
    Ok(UpdateStatement {
        table,
        set: json_values_to_row(set_obj, schema)?,
        condition: parse_where(&obj)?,
    })
}

pub fn parse_delete(value: &str) -> Result<DeleteStatement, Error> {
    let obj = json_object(value)?;
    Ok(DeleteStatement {
        table: require_str(&obj, "table")?,
        condition: parse_where(&obj)?,
    })
}

/// Converts a stored row to the JSON payload a WAL CHANGE record
/// carries as `old_value`/`new_value`.
pub fn row_to_json(row: &Row) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = row
        .iter()
        .map(|(k, v)| {
            let j = match v {
                Value::Integer(i) => serde_json::Value::from(*i),
                Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
                Value::Text(s) => serde_json::Value::String(s.clone()),
                Value::Null => serde_json::Value::Null,
            };
            (k.clone(), j)
        })
        .collect();
    serde_json::Value::Object(map)
}

/// The inverse of [`row_to_json`], used to reconstruct a row from a WAL
/// record during recovery. Column types are not recoverable from JSON
/// alone (a JSON number could be INTEGER or FLOAT), so this resolves
/// them against the table's current schema.
pub fn json_to_row(json: &serde_json::Value, schema: &Schema) -> Result<Row, Error> {
    let obj = json
        .as_object()
        .ok_or_else(|| Error::MalformedStatement("recovery payload is not a JSON object".to_string()))?;
    json_values_to_row(obj, schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relix_schema::Column;

    fn schema() -> Schema {
        Schema::new(
            "t",
            vec![Column::new("id", ColumnType::Integer).primary_key(), Column::new("name", ColumnType::Varchar(10))],
        )
    }

    #[test]
    fn parses_insert_payload_with_type_coercion() {
        let stmt = parse_insert(r#"{"table":"t","values":{"id":1,"name":"alice"}}"#, &schema()).unwrap();
        assert_eq!(stmt.table, "t");
        assert_eq!(stmt.values["id"], Value::Integer(1));
        assert_eq!(stmt.values["name"], Value::Text("alice".into()));
    }

    #[test]
    fn parses_update_payload_with_where_clause() {
        let stmt = parse_update(r#"{"table":"t","set":{"name":"bob"},"where":"id = 1"}"#, &schema()).unwrap();
        assert_eq!(stmt.set["name"], Value::Text("bob".into()));
        assert!(stmt.condition.is_some());
    }

    #[test]
    fn row_json_round_trips_through_schema_resolution() {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Integer(5));
        row.insert("name".to_string(), Value::Text("x".into()));
        let json = row_to_json(&row);
        let back = json_to_row(&json, &schema()).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn rejects_missing_values_object() {
        assert!(parse_insert(r#"{"table":"t"}"#, &schema()).is_err());
    }
}
