//! Candidate plan generation from a single optimized query tree.

use crate::rules::{join_commutativity, selection_decomposition};
use relix_expr::{ConditionNode, NodeType, QueryNode};

/// Emits up to five candidate trees derived from `tree`:
/// (a) the tree unchanged, (b) a selection-pushed variant, (c) a
/// small-tables-first left-deep variant, (d) a most-selective-filter-first
/// variant, (e) a bushy variant via join associativity. (c) and (e) are
/// skipped when the tree contains any join predicate node, since a naive
/// reorder there cannot verify the predicates still bind correctly.
/// Structural duplicates are discarded.
pub fn generate_candidates(tree: &QueryNode) -> Vec<QueryNode> {
    let mut candidates = vec![tree.clone()];

    if let Some(pushed) = push_selections_down(tree) {
        push_unique(&mut candidates, pushed);
    }

    let has_join_predicates = contains_join(tree);

    if !has_join_predicates {
        if let Some(small_first) = small_tables_first(tree) {
            push_unique(&mut candidates, small_first);
        }
    }

    if let Some(selective_first) = most_selective_filter_first(tree) {
        push_unique(&mut candidates, selective_first);
    }

    if !has_join_predicates {
        if let Some(bushy) = bushy_variant(tree) {
            push_unique(&mut candidates, bushy);
        }
    }

    candidates
}

fn push_unique(candidates: &mut Vec<QueryNode>, candidate: QueryNode) {
    if !candidates.iter().any(|c| c.structurally_eq(&candidate)) {
        candidates.push(candidate);
    }
}

fn contains_join(node: &QueryNode) -> bool {
    matches!(node.node_type, NodeType::Join | NodeType::ThetaJoin | NodeType::NaturalJoin)
        || node.children.iter().any(contains_join)
}

/// Repeatedly decomposes conjunctive selections, exposing the maximum
/// number of single-predicate selection nodes so later pushdown rules
/// have the finest-grained targets to move.
fn push_selections_down(tree: &QueryNode) -> Option<QueryNode> {
    let mut changed = false;
    let result = map_tree(tree, &mut |node| {
        if let Some(split) = selection_decomposition(node) {
            changed = true;
            split
        } else {
            node.clone()
        }
    });
    changed.then_some(result)
}

fn map_tree(node: &QueryNode, f: &mut impl FnMut(&QueryNode) -> QueryNode) -> QueryNode {
    let children: Vec<QueryNode> = node.children.iter().map(|c| map_tree(c, f)).collect();
    let rebuilt = QueryNode {
        node_type: node.node_type,
        value: node.value.clone(),
        children,
    };
    f(&rebuilt)
}

/// Swaps every join's children so the statically smaller table (fewer
/// descendant Table leaves as a stand-in for row count, since this
/// candidate is generated before any stats lookup) becomes the left
/// (outer) side.
fn small_tables_first(tree: &QueryNode) -> Option<QueryNode> {
    let mut changed = false;
    let result = rewrite_joins(tree, &mut |node| {
        if !matches!(node.node_type, NodeType::CartesianProduct | NodeType::Join | NodeType::ThetaJoin) {
            return node.clone();
        }
        let left_size = node.children.first().map(table_leaf_count).unwrap_or(0);
        let right_size = node.children.get(1).map(table_leaf_count).unwrap_or(0);
        if right_size < left_size {
            if let Some(swapped) = join_commutativity(node, &|_| true) {
                changed = true;
                return swapped;
            }
        }
        node.clone()
    });
    changed.then_some(result)
}

fn table_leaf_count(node: &QueryNode) -> usize {
    if node.node_type == NodeType::Table {
        1
    } else {
        node.children.iter().map(table_leaf_count).sum()
    }
}

fn rewrite_joins(node: &QueryNode, f: &mut impl FnMut(&QueryNode) -> QueryNode) -> QueryNode {
    let children: Vec<QueryNode> = node.children.iter().map(|c| rewrite_joins(c, f)).collect();
    let rebuilt = QueryNode {
        node_type: node.node_type,
        value: node.value.clone(),
        children,
    };
    f(&rebuilt)
}

/// Reorders a chain of adjacent selections so the syntactically most
/// selective predicate runs first.
fn most_selective_filter_first(tree: &QueryNode) -> Option<QueryNode> {
    let mut changed = false;
    let result = map_tree(tree, &mut |node| {
        if node.node_type != NodeType::Selection {
            return node.clone();
        }
        let Some(child) = node.children.first() else {
            return node.clone();
        };
        if child.node_type != NodeType::Selection {
            return node.clone();
        }
        let outer_sel = syntactic_selectivity_of(&node.value);
        let inner_sel = syntactic_selectivity_of(&child.value);
        if inner_sel < outer_sel {
            return node.clone();
        }
        changed = true;
        let grandchild = child.children.first().cloned().unwrap_or_else(|| child.clone());
        let new_inner = QueryNode::unary(NodeType::Selection, node.value.clone(), grandchild);
        QueryNode::unary(NodeType::Selection, child.value.clone(), new_inner)
    });
    changed.then_some(result)
}

fn syntactic_selectivity_of(predicate_text: &str) -> f64 {
    match relix_expr::parse_condition(predicate_text) {
        Ok(ConditionNode::Simple(p)) => relix_expr::cardinality::syntactic_selectivity(&p),
        _ => 0.5,
    }
}

/// Reshapes every applicable left-deep join chain into its bushy
/// (right-deep) counterpart via [`crate::rules::join_associativity`].
fn bushy_variant(tree: &QueryNode) -> Option<QueryNode> {
    let mut changed = false;
    let result = rewrite_joins(tree, &mut |node| {
        if let Some(reshaped) = crate::rules::join_associativity(node) {
            changed = true;
            reshaped
        } else {
            node.clone()
        }
    });
    changed.then_some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_includes_the_original_tree() {
        let tree = QueryNode::leaf(NodeType::Table, "employees");
        let candidates = generate_candidates(&tree);
        assert!(candidates.iter().any(|c| c.structurally_eq(&tree)));
    }

    #[test]
    fn small_tables_first_swaps_when_right_side_is_smaller() {
        let tree = QueryNode::binary(
            NodeType::CartesianProduct,
            "",
            QueryNode::binary(
                NodeType::CartesianProduct,
                "",
                QueryNode::leaf(NodeType::Table, "a"),
                QueryNode::leaf(NodeType::Table, "b"),
            ),
            QueryNode::leaf(NodeType::Table, "c"),
        );
        let candidates = generate_candidates(&tree);
        // small-tables-first is only generated without join predicates,
        // which this cartesian-only tree satisfies.
        assert!(candidates.len() > 1);
    }

    #[test]
    fn dedups_structurally_identical_candidates() {
        let tree = QueryNode::leaf(NodeType::Table, "t");
        let candidates = generate_candidates(&tree);
        let unique: std::collections::HashSet<_> = candidates.iter().map(|c| format!("{c:?}")).collect();
        assert_eq!(unique.len(), candidates.len());
    }
}
