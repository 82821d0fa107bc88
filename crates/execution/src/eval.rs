//! Evaluates a parsed [`ConditionNode`] against a qualified row.

use crate::error::ExecutionError;
use crate::rows::QualifiedRow;
use relix_expr::{ConditionNode, Operand, Predicate};
use relix_primitives::CompareOp;
use relix_sats::Value;

/// Resolves `reference` (bare or `table.column`) to a key present in
/// `row`, erroring if it's missing or ambiguous among multiple
/// qualifiers.
pub fn resolve_column<'a>(reference: &str, row: &'a QualifiedRow) -> Result<&'a str, ExecutionError> {
    if row.contains_key(reference) {
        return Ok(row.keys().find(|k| k.as_str() == reference).unwrap().as_str());
    }
    let matches: Vec<&str> = row
        .keys()
        .filter(|k| k.rsplit('.').next() == Some(reference))
        .map(|k| k.as_str())
        .collect();
    match matches.len() {
        0 => Err(ExecutionError::ColumnNotFound(reference.to_string())),
        1 => Ok(matches[0]),
        _ => Err(ExecutionError::AmbiguousColumn(reference.to_string())),
    }
}

fn operand_value(operand: &Operand, row: &QualifiedRow) -> Result<Value, ExecutionError> {
    match operand {
        Operand::Literal(v) => Ok(v.clone()),
        Operand::Column(name) => {
            let key = resolve_column(name, row)?;
            Ok(row.get(key).cloned().unwrap_or(Value::Null))
        }
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool, ExecutionError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(false);
    }
    let ordering = match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
        (Value::Integer(a), Value::Float(b)) => (*a as f64).total_cmp(b),
        (Value::Float(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        _ => {
            return Err(ExecutionError::TypeError(format!(
                "cannot compare {lhs:?} with {rhs:?}"
            )))
        }
    };
    Ok(match op {
        CompareOp::Eq => ordering.is_eq(),
        CompareOp::NotEq => !ordering.is_eq(),
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::LtEq => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::GtEq => ordering.is_ge(),
    })
}

fn like_match(text: &str, pattern: &str) -> bool {
    // `%` matches any run of characters, `_` matches exactly one.
    fn helper(t: &[char], p: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('%') => helper(t, &p[1..]) || (!t.is_empty() && helper(&t[1..], p)),
            Some('_') => !t.is_empty() && helper(&t[1..], &p[1..]),
            Some(c) => t.first() == Some(c) && helper(&t[1..], &p[1..]),
        }
    }
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    helper(&t, &p)
}

fn eval_predicate(predicate: &Predicate, row: &QualifiedRow) -> Result<bool, ExecutionError> {
    match predicate {
        Predicate::Compare { lhs, op, rhs } => {
            let l = operand_value(lhs, row)?;
            let r = operand_value(rhs, row)?;
            compare(*op, &l, &r)
        }
        Predicate::Like { column, pattern } => {
            let key = resolve_column(column, row)?;
            match row.get(key) {
                Some(Value::Text(s)) => Ok(like_match(s, pattern)),
                Some(Value::Null) | None => Ok(false),
                Some(other) => Err(ExecutionError::TypeError(format!("LIKE applied to non-text value {other:?}"))),
            }
        }
        Predicate::In { column, values } => {
            let key = resolve_column(column, row)?;
            let current = row.get(key).cloned().unwrap_or(Value::Null);
            Ok(values.iter().any(|v| !current.is_null() && values_equal(&current, v)))
        }
        Predicate::IsNull { column } => {
            let key = resolve_column(column, row)?;
            Ok(row.get(key).map(Value::is_null).unwrap_or(true))
        }
        Predicate::IsNotNull { column } => {
            let key = resolve_column(column, row)?;
            Ok(!row.get(key).map(Value::is_null).unwrap_or(true))
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Integer(x), Value::Float(y)) | (Value::Float(y), Value::Integer(x)) => *x as f64 == *y,
        (Value::Text(x), Value::Text(y)) => x == y,
        _ => false,
    }
}

/// Evaluates a full condition tree against a row.
pub fn eval(node: &ConditionNode, row: &QualifiedRow) -> Result<bool, ExecutionError> {
    match node {
        ConditionNode::Simple(p) => eval_predicate(p, row),
        ConditionNode::And(parts) => {
            for part in parts {
                if !eval(part, row)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ConditionNode::Or(parts) => {
            for part in parts {
                if eval(part, row)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ConditionNode::Not(inner) => Ok(!eval(inner, row)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relix_expr::parse_condition;

    fn row() -> QualifiedRow {
        [
            ("e.id".to_string(), Value::Integer(1)),
            ("e.name".to_string(), Value::Text("alice".to_string())),
            ("e.salary".to_string(), Value::Integer(60000)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn resolves_unqualified_and_qualified_references() {
        assert!(eval(&parse_condition("e.id = 1").unwrap(), &row()).unwrap());
        assert!(eval(&parse_condition("id = 1").unwrap(), &row()).unwrap());
    }

    #[test]
    fn like_supports_percent_and_underscore() {
        assert!(like_match("alice", "al%"));
        assert!(like_match("alice", "a_ice"));
        assert!(!like_match("alice", "bob%"));
    }

    #[test]
    fn null_comparisons_are_always_false() {
        let mut r = row();
        r.insert("e.salary".into(), Value::Null);
        assert!(!eval(&parse_condition("e.salary > 1000").unwrap(), &r).unwrap());
    }

    #[test]
    fn conjunction_and_disjunction() {
        assert!(eval(&parse_condition("e.id = 1 AND e.salary > 1000").unwrap(), &row()).unwrap());
        assert!(!eval(&parse_condition("e.id = 2 OR e.salary < 1000").unwrap(), &row()).unwrap());
    }
}
