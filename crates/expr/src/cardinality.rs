//! Selectivity estimates and cardinality formulas that turn a
//! [`crate::condition::ConditionNode`] and a pair of [`crate::stats::Statistic`]s
//! into row-count estimates for the cost model.

use crate::condition::{ConditionNode, Operand, Predicate};
use crate::stats::Statistic;
use relix_primitives::CompareOp;
use relix_sats::Value;

const EQ_FALLBACK: f64 = 0.1;
const NEQ_FALLBACK: f64 = 0.9;
const RANGE_FALLBACK: f64 = 0.33;
const LIKE_WILDCARD_SELECTIVITY: f64 = 0.20;
const LIKE_EXACT_SELECTIVITY: f64 = 0.10;
const IN_PER_VALUE: f64 = 0.1;
const IN_CAP: f64 = 0.5;
const IS_NULL_SELECTIVITY: f64 = 0.05;
const IS_NOT_NULL_SELECTIVITY: f64 = 0.95;
const BUMP_FACTOR: f64 = 1.1;

fn literal_numeric(operand: &Operand) -> Option<f64> {
    match operand {
        Operand::Literal(v) => v.numeric(),
        Operand::Column(_) => None,
    }
}

/// Estimated fraction of rows a single predicate admits, given the
/// statistics of the table it applies to.
pub fn selectivity(predicate: &Predicate, stats: &Statistic) -> f64 {
    match predicate {
        Predicate::Compare { lhs, op, rhs } => {
            let column = predicate.column();
            let distinct = column.and_then(|c| stats.distinct_values(c));
            let value = literal_numeric(rhs).or_else(|| literal_numeric(lhs));
            match op {
                CompareOp::Eq => distinct
                    .filter(|v| *v > 0)
                    .map(|v| (1.0 / v as f64).max(1.0 / stats.tuples.max(1) as f64))
                    .unwrap_or(EQ_FALLBACK),
                CompareOp::NotEq => distinct
                    .filter(|v| *v > 0)
                    .map(|v| 1.0 - 1.0 / v as f64)
                    .unwrap_or(NEQ_FALLBACK),
                CompareOp::Gt | CompareOp::GtEq => {
                    let column = column.unwrap_or_default();
                    let base = match (stats.min_max(column), value) {
                        (Some((min, max)), Some(v)) if max > min => {
                            (((max - v) / (max - min)).clamp(0.01, 0.99))
                        }
                        _ => RANGE_FALLBACK,
                    };
                    if matches!(op, CompareOp::GtEq) {
                        (base * BUMP_FACTOR).min(1.0)
                    } else {
                        base
                    }
                }
                CompareOp::Lt | CompareOp::LtEq => {
                    let column = column.unwrap_or_default();
                    let base = match (stats.min_max(column), value) {
                        (Some((min, max)), Some(v)) if max > min => {
                            (((v - min) / (max - min)).clamp(0.01, 0.99))
                        }
                        _ => RANGE_FALLBACK,
                    };
                    if matches!(op, CompareOp::LtEq) {
                        (base * BUMP_FACTOR).min(1.0)
                    } else {
                        base
                    }
                }
            }
        }
        Predicate::Like { pattern, .. } => {
            if pattern.contains('%') || pattern.contains('_') {
                LIKE_WILDCARD_SELECTIVITY
            } else {
                LIKE_EXACT_SELECTIVITY
            }
        }
        Predicate::In { values, .. } => (values.len() as f64 * IN_PER_VALUE).min(IN_CAP),
        Predicate::IsNull { .. } => IS_NULL_SELECTIVITY,
        Predicate::IsNotNull { .. } => IS_NOT_NULL_SELECTIVITY,
    }
}

/// Combines predicate selectivities across a condition tree. Conjunctions
/// multiply under the independence assumption; disjunction uses the
/// inclusion-exclusion complement; negation inverts.
pub fn condition_selectivity(node: &ConditionNode, stats: &Statistic) -> f64 {
    match node {
        ConditionNode::Simple(p) => selectivity(p, stats),
        ConditionNode::And(parts) => parts.iter().map(|p| condition_selectivity(p, stats)).product(),
        ConditionNode::Or(parts) => {
            1.0 - parts
                .iter()
                .map(|p| 1.0 - condition_selectivity(p, stats))
                .product::<f64>()
        }
        ConditionNode::Not(inner) => 1.0 - condition_selectivity(inner, stats),
    }
}

/// Estimated number of rows a selection over `stats` produces.
pub fn selection_cardinality(node: &ConditionNode, stats: &Statistic) -> u64 {
    (stats.tuples as f64 * condition_selectivity(node, stats)).round() as u64
}

/// A syntactic selectivity heuristic used by the selection-commutativity
/// rule, which has only the predicate's operator to go on (no table to
/// look up distinct-value counts against).
pub fn syntactic_selectivity(predicate: &Predicate) -> f64 {
    match predicate {
        Predicate::Compare { op: CompareOp::Eq, .. } => 0.1,
        Predicate::Compare {
            op: CompareOp::Lt | CompareOp::LtEq | CompareOp::Gt | CompareOp::GtEq,
            ..
        } => 0.3,
        Predicate::Compare { op: CompareOp::NotEq, .. } => 0.9,
        _ => 0.5,
    }
}

/// Estimated size of an unconstrained cross product of two tables.
pub fn cartesian_cardinality(left: &Statistic, right: &Statistic) -> u64 {
    left.tuples.saturating_mul(right.tuples)
}

/// Estimated size of an equi-join: `|R|*|S| / max(V_R, V_S, 1)`, bounded
/// below by the larger input's cardinality and above by the cartesian
/// product.
pub fn equijoin_cardinality(left: &Statistic, right: &Statistic, left_column: &str, right_column: &str) -> u64 {
    let v_left = left.distinct_values(left_column).unwrap_or(0);
    let v_right = right.distinct_values(right_column).unwrap_or(0);
    let denom = v_left.max(v_right).max(1);
    let raw = (left.tuples as u128 * right.tuples as u128) / denom as u128;
    let lower = left.tuples.max(right.tuples) as u128;
    let upper = left.tuples as u128 * right.tuples as u128;
    raw.clamp(lower, upper) as u64
}

/// Estimated size of a non-equijoin theta-join: `|R|*|S|*0.1`.
pub fn non_equijoin_cardinality(left: &Statistic, right: &Statistic) -> u64 {
    (left.tuples as f64 * right.tuples as f64 * 0.1).round() as u64
}
