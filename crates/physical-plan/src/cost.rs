//! Node and subtree cost estimation, in abstract units relative to a
//! single sequential-block read.

use relix_expr::{ConditionNode, NodeType, QueryNode, Statistic};
use std::collections::HashMap;
use thiserror::Error;

pub const RANDOM_READ_COST: f64 = 10.0;
pub const WRITE_COST: f64 = 5.0;
pub const PER_TUPLE_CPU: f64 = 1e-3;
pub const PER_PREDICATE_CPU: f64 = 1e-4;
pub const PROJECTION_CPU: f64 = 5e-5;
pub const CARTESIAN_CPU: f64 = RANDOM_READ_COST * 1e-3;
pub const BUFFER_POOL_PAGES: u64 = 100;
pub const DEFAULT_SCAN_COST: f64 = 1000.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CostError {
    #[error("no statistics available for table `{0}`")]
    MissingStatistics(String),
    #[error("cost model has no handling for node type {0:?}")]
    UnsupportedNode(NodeType),
    #[error("malformed predicate in node value `{0}`")]
    MalformedPredicate(String),
}

/// Per-table statistics keyed by table or alias name, threaded through
/// the cost model so it never has to reach back into storage itself.
pub type StatsCatalog<'a> = HashMap<&'a str, &'a Statistic>;

/// Recursively estimated intermediate cardinality for `node`, falling
/// back to the default table-scan estimate for leaves with no stats.
pub fn estimate_cardinality(node: &QueryNode, stats: &StatsCatalog) -> Result<u64, CostError> {
    match node.node_type {
        NodeType::Table => Ok(stats
            .get(node.value.as_str())
            .map(|s| s.tuples)
            .unwrap_or(DEFAULT_SCAN_COST as u64)),
        NodeType::Selection => {
            let input = child_cardinality(node, stats)?;
            let table_stats = leaf_table_stats(node, stats);
            let condition = relix_expr::parse_condition(&node.value)
                .map_err(|_| CostError::MalformedPredicate(node.value.clone()))?;
            Ok(match table_stats {
                Some(s) => relix_expr::cardinality::selection_cardinality(&condition, s),
                None => input,
            })
        }
        NodeType::Projection => child_cardinality(node, stats),
        NodeType::OrderBy | NodeType::Limit => child_cardinality(node, stats),
        NodeType::CartesianProduct => {
            let (l, r) = join_child_cardinalities(node, stats)?;
            Ok(l.saturating_mul(r))
        }
        NodeType::Join | NodeType::ThetaJoin => {
            let (l, r) = join_child_cardinalities(node, stats)?;
            if !is_equijoin(&node.value) {
                return Ok((l as f64 * r as f64 * 0.1).round() as u64);
            }
            let left_stats = node.children.first().and_then(|c| leaf_table_stats_self(c, stats));
            let right_stats = node.children.get(1).and_then(|c| leaf_table_stats_self(c, stats));
            let (v_l, v_r) = match (left_stats, right_stats, parse_equality_columns(&node.value)) {
                (Some(ls), Some(rs), Some((lc, rc))) => (
                    ls.distinct_values(strip_qualifier(&lc)).unwrap_or(0),
                    rs.distinct_values(strip_qualifier(&rc)).unwrap_or(0),
                ),
                _ => (0, 0),
            };
            let denom = v_l.max(v_r).max(1);
            let raw = (l as u128 * r as u128) / denom as u128;
            let lower = l.max(r) as u128;
            let upper = l as u128 * r as u128;
            Ok(raw.clamp(lower, upper) as u64)
        }
        NodeType::NaturalJoin => {
            let (l, r) = join_child_cardinalities(node, stats)?;
            Ok(((l as u128 * r as u128) / l.max(r).max(1) as u128) as u64)
        }
        other => Err(CostError::UnsupportedNode(other)),
    }
}

fn child_cardinality(node: &QueryNode, stats: &StatsCatalog) -> Result<u64, CostError> {
    node.children
        .first()
        .map(|c| estimate_cardinality(c, stats))
        .unwrap_or(Ok(0))
}

fn join_child_cardinalities(node: &QueryNode, stats: &StatsCatalog) -> Result<(u64, u64), CostError> {
    let l = node
        .children
        .first()
        .map(|c| estimate_cardinality(c, stats))
        .unwrap_or(Ok(0))?;
    let r = node
        .children
        .get(1)
        .map(|c| estimate_cardinality(c, stats))
        .unwrap_or(Ok(0))?;
    Ok((l, r))
}

fn leaf_table_stats<'a>(node: &QueryNode, stats: &StatsCatalog<'a>) -> Option<&'a Statistic> {
    leaf_table_stats_self(node.children.first()?, stats)
}

/// Walks straight down the left spine from `node` (inclusive) to find
/// the table leaf feeding it, for cost-model purposes where a child
/// subtree is assumed unary until it bottoms out at a scan.
fn leaf_table_stats_self<'a>(node: &QueryNode, stats: &StatsCatalog<'a>) -> Option<&'a Statistic> {
    let mut cur = node;
    loop {
        if cur.node_type == NodeType::Table {
            return stats.get(cur.value.as_str()).copied();
        }
        cur = cur.children.first()?;
    }
}

fn is_equijoin(predicate_text: &str) -> bool {
    predicate_text.contains('=') && !predicate_text.contains("!=") && !predicate_text.contains("<>")
}

/// Extracts `(left_column, right_column)` from a predicate of the exact
/// shape `col = col`, the only case the join-cardinality formula can use
/// a distinct-value count for.
fn parse_equality_columns(predicate_text: &str) -> Option<(String, String)> {
    let node = relix_expr::parse_condition(predicate_text).ok()?;
    match node {
        ConditionNode::Simple(relix_expr::Predicate::Compare {
            lhs: relix_expr::Operand::Column(l),
            op: relix_primitives::CompareOp::Eq,
            rhs: relix_expr::Operand::Column(r),
        }) => Some((l, r)),
        _ => None,
    }
}

fn strip_qualifier(s: &str) -> &str {
    s.rsplit('.').next().unwrap_or(s)
}

/// External-merge-sort cost for `n` tuples at `f` tuples/block: two
/// passes if the run fits entirely in the buffer pool, else
/// `2 * ceil(n/f) * p` merge passes where `p = ceil(log_{B-1}(ceil(n/f)/B))`.
pub fn external_sort_cost(tuples: u64, tuples_per_block: u64, buffer_pool_pages: u64) -> f64 {
    if tuples == 0 {
        return 0.0;
    }
    let blocks = ((tuples + tuples_per_block.max(1) - 1) / tuples_per_block.max(1)).max(1);
    if blocks <= buffer_pool_pages {
        return 2.0 * blocks as f64;
    }
    let base = (buffer_pool_pages - 1).max(2) as f64;
    let passes = ((blocks as f64 / buffer_pool_pages as f64).log(base)).ceil().max(1.0);
    2.0 * blocks as f64 * passes
}

/// Cost of a table scan: one sequential block read per block, or a
/// fixed worst-case estimate when no statistics are available.
pub fn scan_cost(stats: Option<&Statistic>) -> f64 {
    stats.map(|s| s.blocks as f64).unwrap_or(DEFAULT_SCAN_COST)
}

/// Cost of applying a predicate to `input_card` candidate rows.
pub fn selection_cost(child_cost: f64, input_card: u64) -> f64 {
    child_cost + input_card as f64 * PER_PREDICATE_CPU
}

/// Cost of projecting `input_card` rows.
pub fn projection_cost(child_cost: f64, input_card: u64) -> f64 {
    child_cost + input_card as f64 * PROJECTION_CPU
}

/// Nested-loop join cost: one scan of the inner side per block of the
/// outer side.
pub fn nested_loop_cost(left_blocks: u64, right_blocks: u64) -> f64 {
    left_blocks as f64 * right_blocks as f64
}

/// Hash-join cost: build+probe passes over both inputs, plus per-tuple
/// CPU; infeasible (returned as infinity) once the build side would not
/// fit comfortably in the buffer pool.
pub fn hash_join_cost(left_blocks: u64, right_blocks: u64, left_card: u64, right_card: u64) -> f64 {
    if left_blocks as f64 > 0.8 * BUFFER_POOL_PAGES as f64 {
        return f64::INFINITY;
    }
    left_blocks as f64 + right_blocks as f64 + (left_card + right_card) as f64 * PER_TUPLE_CPU
}

/// Sort-merge join cost, only meaningful for an equijoin predicate:
/// sort both inputs, then merge with one pass over each.
pub fn sort_merge_cost(
    left_tuples: u64,
    left_blocking_factor: u64,
    right_tuples: u64,
    right_blocking_factor: u64,
    left_blocks: u64,
    right_blocks: u64,
) -> f64 {
    external_sort_cost(left_tuples, left_blocking_factor, BUFFER_POOL_PAGES)
        + external_sort_cost(right_tuples, right_blocking_factor, BUFFER_POOL_PAGES)
        + left_blocks as f64
        + right_blocks as f64
}

/// Join cost: the minimum of nested-loop, hash-join, and (if the
/// predicate is an equijoin) sort-merge, plus both children's cost.
pub fn join_cost(
    left_cost: f64,
    right_cost: f64,
    left: &Statistic,
    right: &Statistic,
    is_equijoin: bool,
) -> f64 {
    let nested = nested_loop_cost(left.blocks, right.blocks);
    let hash = hash_join_cost(left.blocks, right.blocks, left.tuples, right.tuples);
    let mut best = nested.min(hash);
    if is_equijoin {
        let merge = sort_merge_cost(
            left.tuples,
            left.blocking_factor,
            right.tuples,
            right.blocking_factor,
            left.blocks,
            right.blocks,
        );
        best = best.min(merge);
    }
    left_cost + right_cost + best
}

/// Cartesian product cost: both children's cost plus a per-pair CPU
/// charge over every output row.
pub fn cartesian_cost(left_cost: f64, right_cost: f64, left_card: u64, right_card: u64) -> f64 {
    left_cost + right_cost + (left_card as f64 * right_card as f64) * CARTESIAN_CPU
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_fits_in_buffer_pool() {
        assert_eq!(external_sort_cost(500, 10, 100), 100.0);
    }

    #[test]
    fn sort_spills_to_multiple_passes() {
        let cost = external_sort_cost(100_000, 10, 100);
        assert!(cost > 2.0 * 10_000.0);
    }

    #[test]
    fn hash_join_infeasible_above_threshold() {
        assert_eq!(hash_join_cost(90, 10, 900, 100), f64::INFINITY);
    }

    #[test]
    fn nested_loop_is_product_of_blocks() {
        assert_eq!(nested_loop_cost(10, 20), 200.0);
    }

    #[test]
    fn estimate_cardinality_walks_selection_over_scan() {
        let stats = Statistic::new(1000, 40).with_column(
            "dept",
            relix_expr::ColumnStatistic {
                distinct_values: 10,
                null_count: None,
                min: None,
                max: None,
            },
        );
        let catalog: StatsCatalog = [("employees", &stats)].into_iter().collect();
        let tree = QueryNode::unary(
            NodeType::Selection,
            "dept = 3",
            QueryNode::leaf(NodeType::Table, "employees"),
        );
        assert_eq!(estimate_cardinality(&tree, &catalog).unwrap(), 100);
    }

    #[test]
    fn estimate_cardinality_unsupported_node_errors() {
        let catalog: StatsCatalog = HashMap::new();
        let tree = QueryNode::leaf(NodeType::CreateTable, "t (id INTEGER)");
        assert_eq!(
            estimate_cardinality(&tree, &catalog),
            Err(CostError::UnsupportedNode(NodeType::CreateTable))
        );
    }
}
