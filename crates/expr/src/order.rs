//! Parsing of `ORDER BY` clauses.

use crate::error::ExprError;

#[derive(Clone, Debug, PartialEq)]
pub struct OrderKey {
    pub column: String,
    pub descending: bool,
}

/// Parses a comma-separated `ORDER BY` list, e.g. `dept ASC, salary DESC`.
/// A column with no direction keyword defaults to ascending.
pub fn parse_order_by(src: &str) -> Result<Vec<OrderKey>, ExprError> {
    let mut keys = Vec::new();
    for raw in src.split(',') {
        let item = raw.trim();
        if item.is_empty() {
            return Err(ExprError::UnexpectedEof(src.to_string()));
        }
        let mut parts = item.split_whitespace();
        let column = parts
            .next()
            .ok_or_else(|| ExprError::UnexpectedEof(src.to_string()))?
            .to_string();
        let descending = match parts.next() {
            None => false,
            Some(dir) if dir.eq_ignore_ascii_case("asc") => false,
            Some(dir) if dir.eq_ignore_ascii_case("desc") => true,
            Some(other) => {
                return Err(ExprError::UnexpectedToken {
                    source: src.to_string(),
                    found: other.to_string(),
                    pos: 0,
                })
            }
        };
        if parts.next().is_some() {
            return Err(ExprError::UnexpectedToken {
                source: src.to_string(),
                found: item.to_string(),
                pos: 0,
            });
        }
        keys.push(OrderKey { column, descending });
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ascending() {
        assert_eq!(
            parse_order_by("dept").unwrap(),
            vec![OrderKey {
                column: "dept".into(),
                descending: false
            }]
        );
    }

    #[test]
    fn parses_mixed_directions() {
        assert_eq!(
            parse_order_by("dept ASC, salary DESC").unwrap(),
            vec![
                OrderKey {
                    column: "dept".into(),
                    descending: false
                },
                OrderKey {
                    column: "salary".into(),
                    descending: true
                },
            ]
        );
    }

    #[test]
    fn rejects_unknown_direction() {
        assert!(parse_order_by("dept SIDEWAYS").is_err());
    }
}
