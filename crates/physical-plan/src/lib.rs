//! Cost model, relational-algebra rewrite rules, and plan generation and
//! scoring.

pub mod cost;
pub mod generator;
pub mod rules;
pub mod scorer;

pub use cost::{CostError, StatsCatalog};
pub use generator::generate_candidates;
pub use scorer::{score, select_best, ScoreWeights};

use relix_expr::QueryNode;

/// Runs the full pipeline: logical rules (including projection
/// pushdown) to a fixed point, candidate generation, cost-based join
/// reordering and projection pushdown on each candidate, and selection
/// of the lowest-scoring result.
pub fn optimize(
    tree: &QueryNode,
    catalog: &StatsCatalog,
    schema_owner: &dyn Fn(&str) -> Option<usize>,
) -> Result<QueryNode, CostError> {
    let rewritten = rules::apply_logical_rules(tree, schema_owner);
    let cost_fn = |n: &QueryNode, s: &StatsCatalog| cost::estimate_cardinality(n, s).map(|c| c as f64);
    let candidates: Vec<QueryNode> = generate_candidates(&rewritten)
        .into_iter()
        .map(|c| rules::cost_based_join_reordering(&c, catalog, cost_fn))
        .map(|c| rules::cost_based_projection_pushdown(&c, catalog, schema_owner, cost_fn))
        .map(|c| rules::early_projection(&c, catalog, schema_owner, cost_fn))
        .collect();
    select_best(&candidates, catalog, ScoreWeights::default())
        .map(|(tree, _)| tree.clone())
        .ok_or_else(|| CostError::MalformedPredicate("no candidate plan could be scored".to_string()))
}
