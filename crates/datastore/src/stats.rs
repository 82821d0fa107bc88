//! Computes per-table, per-column statistics from a scanned row set, for
//! the cost model's [`relix_expr::Statistic`] inputs.

use relix_expr::{ColumnStatistic, Statistic};
use relix_sats::{Row, Value};
use relix_schema::Schema;
use std::collections::HashSet;

#[derive(Clone, Debug, Default, PartialEq)]
struct Accumulator {
    distinct: HashSet<ValueKey>,
    nulls: u64,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum ValueKey {
    Int(i32),
    // f64 isn't `Hash`/`Eq`; distinct-value counting treats a float by
    // its bit pattern, which is exact for values that round-tripped
    // through encode/decode without arithmetic.
    Float(u64),
    Text(String),
}

fn value_key(v: &Value) -> Option<ValueKey> {
    match v {
        Value::Integer(i) => Some(ValueKey::Int(*i)),
        Value::Float(f) => Some(ValueKey::Float(f.to_bits())),
        Value::Text(s) => Some(ValueKey::Text(s.clone())),
        Value::Null => None,
    }
}

/// Builds the full table statistic (tuple count, average record length,
/// derived blocking factor/block count) plus per-column distinct-value,
/// null, and min/max statistics, from a schema and its current rows.
pub fn compute_statistic(schema: &Schema, rows: &[Row]) -> Statistic {
    let record_length = relix_sats::calculate_row_size(schema) as u64;
    let mut accumulators: std::collections::HashMap<&str, Accumulator> =
        schema.columns.iter().map(|c| (c.name.as_str(), Accumulator::default())).collect();

    for row in rows {
        for col in &schema.columns {
            let acc = accumulators.get_mut(col.name.as_str()).expect("accumulator seeded for every column");
            match row.get(&col.name) {
                None | Some(Value::Null) => acc.nulls += 1,
                Some(v) => {
                    if let Some(key) = value_key(v) {
                        acc.distinct.insert(key);
                    }
                    if let Some(n) = v.numeric() {
                        acc.min = Some(acc.min.map_or(n, |m| m.min(n)));
                        acc.max = Some(acc.max.map_or(n, |m| m.max(n)));
                    }
                }
            }
        }
    }

    let mut stat = Statistic::new(rows.len() as u64, record_length.max(1));
    for col in &schema.columns {
        let acc = accumulators.remove(col.name.as_str()).unwrap_or_default();
        stat = stat.with_column(
            col.name.clone(),
            ColumnStatistic {
                distinct_values: acc.distinct.len() as u64,
                null_count: Some(acc.nulls),
                min: acc.min,
                max: acc.max,
            },
        );
    }
    stat
}

#[cfg(test)]
mod tests {
    use super::*;
    use relix_primitives::ColumnType;
    use relix_schema::Column;

    fn schema() -> Schema {
        Schema::new(
            "t",
            vec![
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("name", ColumnType::Varchar(10)),
            ],
        )
    }

    fn row(id: i32, name: Option<&str>) -> Row {
        let mut r = Row::new();
        r.insert("id".into(), Value::Integer(id));
        r.insert("name".into(), name.map(|s| Value::Text(s.into())).unwrap_or(Value::Null));
        r
    }

    #[test]
    fn counts_distinct_values_and_nulls() {
        let rows = vec![row(1, Some("a")), row(2, Some("a")), row(3, None)];
        let stat = compute_statistic(&schema(), &rows);
        assert_eq!(stat.tuples, 3);
        assert_eq!(stat.distinct_values("id"), Some(3));
        assert_eq!(stat.distinct_values("name"), Some(1));
        assert_eq!(stat.columns["name"].null_count, Some(1));
    }

    #[test]
    fn tracks_numeric_min_max() {
        let rows = vec![row(5, None), row(1, None), row(9, None)];
        let stat = compute_statistic(&schema(), &rows);
        assert_eq!(stat.min_max("id"), Some((1.0, 9.0)));
    }
}
