//! Weighted scoring of candidate plans: lower is better.

use crate::cost::{estimate_cardinality, CostError, StatsCatalog};
use relix_expr::{NodeType, QueryNode};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreWeights {
    pub selectivity_depth: f64,
    pub join_order: f64,
    pub intermediate_size: f64,
    pub complexity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            selectivity_depth: 0.30,
            join_order: 0.35,
            intermediate_size: 0.25,
            complexity: 0.10,
        }
    }
}

/// Assigns a single weighted score to `tree`; lower scores are preferred.
pub fn score(tree: &QueryNode, stats: &StatsCatalog, weights: ScoreWeights) -> Result<f64, CostError> {
    let selectivity_depth = selectivity_depth_score(tree);
    let join_order = join_order_score(tree, stats)?;
    let intermediate_size = intermediate_size_score(tree, stats)?;
    let complexity = complexity_score(tree);

    Ok(weights.selectivity_depth * selectivity_depth
        + weights.join_order * join_order
        + weights.intermediate_size * intermediate_size
        + weights.complexity * complexity)
}

/// Average depth of `Selection` nodes, normalized by the tree's maximum
/// depth. Selections pushed further down (deeper) reduce intermediate
/// sizes upstream; this term is combined with the other penalties by
/// the overall weighted score rather than judged in isolation.
fn selectivity_depth_score(tree: &QueryNode) -> f64 {
    let max_depth = tree.depth().max(1) as f64;
    let mut depths = Vec::new();
    collect_selection_depths(tree, 1, &mut depths);
    if depths.is_empty() {
        return 0.0;
    }
    let avg = depths.iter().sum::<usize>() as f64 / depths.len() as f64;
    (avg / max_depth).min(1.0)
}

fn collect_selection_depths(node: &QueryNode, depth: usize, out: &mut Vec<usize>) {
    if node.node_type == NodeType::Selection {
        out.push(depth);
    }
    for child in &node.children {
        collect_selection_depths(child, depth + 1, out);
    }
}

/// Average `log10(|L|*|R|)/10 + log10(max/min)/5` over every join node
/// encountered in the tree.
fn join_order_score(tree: &QueryNode, stats: &StatsCatalog) -> Result<f64, CostError> {
    let mut samples = Vec::new();
    collect_join_order_samples(tree, stats, &mut samples);
    if samples.is_empty() {
        return Ok(0.0);
    }
    Ok(samples.iter().sum::<f64>() / samples.len() as f64)
}

fn collect_join_order_samples(node: &QueryNode, stats: &StatsCatalog, out: &mut Vec<f64>) {
    if matches!(node.node_type, NodeType::Join | NodeType::ThetaJoin | NodeType::NaturalJoin | NodeType::CartesianProduct) {
        if let (Some(l), Some(r)) = (node.children.first(), node.children.get(1)) {
            let left_card = estimate_cardinality(l, stats).unwrap_or(1).max(1);
            let right_card = estimate_cardinality(r, stats).unwrap_or(1).max(1);
            let product = (left_card as f64 * right_card as f64).max(1.0);
            let (max, min) = if left_card > right_card {
                (left_card as f64, right_card as f64)
            } else {
                (right_card as f64, left_card as f64)
            };
            out.push(product.log10() / 10.0 + (max / min.max(1.0)).log10() / 5.0);
        }
    }
    for child in &node.children {
        collect_join_order_samples(child, stats, out);
    }
}

/// `log10(max estimated intermediate cardinality) / 10`, clamped to 1.
fn intermediate_size_score(tree: &QueryNode, stats: &StatsCatalog) -> Result<f64, CostError> {
    let mut max_card: u64 = 1;
    collect_max_cardinality(tree, stats, &mut max_card);
    Ok(((max_card.max(1) as f64).log10() / 10.0).min(1.0))
}

fn collect_max_cardinality(node: &QueryNode, stats: &StatsCatalog, max_card: &mut u64) {
    if let Ok(card) = estimate_cardinality(node, stats) {
        *max_card = (*max_card).max(card);
    }
    for child in &node.children {
        collect_max_cardinality(child, stats, max_card);
    }
}

/// `nodes/20 + depth/10`, clamped to 1.
fn complexity_score(tree: &QueryNode) -> f64 {
    (tree.node_count() as f64 / 20.0 + tree.depth() as f64 / 10.0).min(1.0)
}

/// Picks the lowest-scoring candidate, breaking ties by preferring the
/// earlier candidate in `candidates` (the generator places the
/// unmodified original tree first).
pub fn select_best<'a>(
    candidates: &'a [QueryNode],
    stats: &StatsCatalog,
    weights: ScoreWeights,
) -> Option<(&'a QueryNode, f64)> {
    candidates
        .iter()
        .filter_map(|c| score(c, stats, weights).ok().map(|s| (c, s)))
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relix_expr::Statistic;
    use std::collections::HashMap;

    #[test]
    fn complexity_score_grows_with_tree_size() {
        let small = QueryNode::leaf(NodeType::Table, "t");
        let large = QueryNode::unary(
            NodeType::Selection,
            "x = 1",
            QueryNode::unary(NodeType::Projection, "a, b", QueryNode::leaf(NodeType::Table, "t")),
        );
        assert!(complexity_score(&large) > complexity_score(&small));
    }

    #[test]
    fn select_best_prefers_lower_score() {
        let stats = Statistic::new(1000, 40);
        let catalog: StatsCatalog = HashMap::new();
        let _ = &stats;
        let a = QueryNode::leaf(NodeType::Table, "t");
        let b = QueryNode::unary(
            NodeType::Selection,
            "x = 1",
            QueryNode::unary(NodeType::Selection, "y = 2", QueryNode::leaf(NodeType::Table, "t")),
        );
        let candidates = vec![a.clone(), b];
        let (best, _) = select_best(&candidates, &catalog, ScoreWeights::default()).unwrap();
        assert_eq!(best, &a);
    }
}
