//! Logical and cost-based relational-algebra rewrite rules.
//!
//! Every rule is a pure function: given a node, it either returns `None`
//! (not applicable) or a freshly built replacement subtree. The fixed-point
//! driver in [`apply_logical_rules`] walks the tree bottom-up, retrying
//! until no rule fires or an iteration cap is hit.

use crate::cost::{self, StatsCatalog};
use relix_expr::{parse_condition, ConditionNode, NodeType, Predicate, QueryNode};
use std::collections::HashSet;

const MAX_LOGICAL_ITERATIONS: usize = 10;
const MAX_COST_ITERATIONS: usize = 3;

/// Splits `σ_{a AND b}(X)` into `σ_a(σ_b(X))` at the top level only —
/// parenthesized subexpressions and quoted strings are never split,
/// since the condition parser already respects both.
pub fn selection_decomposition(node: &QueryNode) -> Option<QueryNode> {
    if node.node_type != NodeType::Selection {
        return None;
    }
    let condition = parse_condition(&node.value).ok()?;
    let ConditionNode::And(parts) = condition else {
        return None;
    };
    if parts.len() < 2 {
        return None;
    }
    let child = node.children.first()?.clone();
    let mut current = child;
    for part in parts.into_iter().rev() {
        current = QueryNode::unary(NodeType::Selection, render(&part), current);
    }
    Some(current)
}

/// Swaps two stacked selections when the inner predicate is estimated
/// (via a cheap syntactic heuristic, not table statistics) to be more
/// selective than the outer one.
pub fn selection_commutativity(node: &QueryNode) -> Option<QueryNode> {
    if node.node_type != NodeType::Selection {
        return None;
    }
    let inner = node.children.first()?;
    if inner.node_type != NodeType::Selection {
        return None;
    }
    let outer_pred = single_predicate(&node.value)?;
    let inner_pred = single_predicate(&inner.value)?;
    let outer_sel = relix_expr::cardinality::syntactic_selectivity(&outer_pred);
    let inner_sel = relix_expr::cardinality::syntactic_selectivity(&inner_pred);
    if inner_sel >= outer_sel {
        return None;
    }
    let grandchild = inner.children.first()?.clone();
    let new_inner = QueryNode::unary(NodeType::Selection, node.value.clone(), grandchild);
    Some(QueryNode::unary(NodeType::Selection, inner.value.clone(), new_inner))
}

fn single_predicate(text: &str) -> Option<Predicate> {
    match parse_condition(text).ok()? {
        ConditionNode::Simple(p) => Some(p),
        _ => None,
    }
}

/// `σ_θ(R × S) → R ⋈_θ S`
pub fn selection_over_cartesian_to_theta_join(node: &QueryNode) -> Option<QueryNode> {
    if node.node_type != NodeType::Selection {
        return None;
    }
    let child = node.children.first()?;
    if child.node_type != NodeType::CartesianProduct {
        return None;
    }
    let left = child.children.first()?.clone();
    let right = child.children.get(1)?.clone();
    Some(QueryNode::binary(NodeType::ThetaJoin, node.value.clone(), left, right))
}

/// `σ_a(R ⋈_θ S) → R ⋈_{θ ∧ a} S`
pub fn selection_over_join_merge(node: &QueryNode) -> Option<QueryNode> {
    if node.node_type != NodeType::Selection {
        return None;
    }
    let child = node.children.first()?;
    if !matches!(child.node_type, NodeType::Join | NodeType::ThetaJoin) {
        return None;
    }
    let left = child.children.first()?.clone();
    let right = child.children.get(1)?.clone();
    let merged = format!("({}) AND ({})", child.value, node.value);
    Some(QueryNode::binary(NodeType::ThetaJoin, merged, left, right))
}

/// Splits `σ_{a1 AND a2}(R ⋈ S)` into `σ_{a_R}(R) ⋈ σ_{a_S}(S)`, routing
/// each conjunct to the side that owns every column it references;
/// conjuncts touching both sides stay above the join.
pub fn selection_join_distribution(node: &QueryNode, schema_owner: &dyn Fn(&str) -> Option<usize>) -> Option<QueryNode> {
    if node.node_type != NodeType::Selection {
        return None;
    }
    let join = node.children.first()?;
    if !matches!(join.node_type, NodeType::Join | NodeType::ThetaJoin) {
        return None;
    }
    let condition = parse_condition(&node.value).ok()?;
    let conjuncts: Vec<ConditionNode> = match condition {
        ConditionNode::And(parts) => parts,
        other => vec![other],
    };
    if conjuncts.len() < 2 {
        return None;
    }

    let mut left_preds = Vec::new();
    let mut right_preds = Vec::new();
    let mut remaining = Vec::new();
    for conjunct in conjuncts {
        let cols = conjunct.referenced_columns();
        let sides: HashSet<usize> = cols.iter().filter_map(|c| schema_owner(c)).collect();
        match (sides.len(), sides.iter().next().copied()) {
            (1, Some(0)) => left_preds.push(conjunct),
            (1, Some(1)) => right_preds.push(conjunct),
            _ => remaining.push(conjunct),
        }
    }
    if left_preds.is_empty() && right_preds.is_empty() {
        return None;
    }

    let left = join.children.first()?.clone();
    let right_child = join.children.get(1)?.clone();
    let new_left = wrap_selection(left, &left_preds);
    let new_right = wrap_selection(right_child, &right_preds);
    let new_join = QueryNode::binary(join.node_type, join.value.clone(), new_left, new_right);
    Some(if remaining.is_empty() {
        new_join
    } else {
        QueryNode::unary(NodeType::Selection, render_all_and(&remaining), new_join)
    })
}

fn wrap_selection(child: QueryNode, preds: &[ConditionNode]) -> QueryNode {
    if preds.is_empty() {
        child
    } else {
        QueryNode::unary(NodeType::Selection, render_all_and(preds), child)
    }
}

fn render_all_and(parts: &[ConditionNode]) -> String {
    if parts.len() == 1 {
        render(&parts[0])
    } else {
        parts.iter().map(render).collect::<Vec<_>>().join(" AND ")
    }
}

/// `π_A(π_B(X))`: drops the inner projection when `A ⊆ B`, the outer
/// when `B ⊆ A`, and collapses to `*` when either side is a star.
pub fn projection_elimination(node: &QueryNode) -> Option<QueryNode> {
    if node.node_type != NodeType::Projection {
        return None;
    }
    let inner = node.children.first()?;
    if inner.node_type != NodeType::Projection {
        return None;
    }
    let outer_cols = column_set(&node.value);
    let inner_cols = column_set(&inner.value);
    let is_star = |cols: &[String]| cols.len() == 1 && cols[0] == "*";
    if is_star(&outer_cols) {
        return Some(inner.clone());
    }
    if is_star(&inner_cols) {
        return Some(QueryNode::unary(
            NodeType::Projection,
            node.value.clone(),
            inner.children.first()?.clone(),
        ));
    }
    let grandchild = inner.children.first()?.clone();
    if outer_cols.iter().all(|c| inner_cols.contains(c)) {
        return Some(QueryNode::unary(NodeType::Projection, node.value.clone(), grandchild));
    }
    if inner_cols.iter().all(|c| outer_cols.contains(c)) {
        return Some(QueryNode::unary(NodeType::Projection, inner.value.clone(), grandchild));
    }
    let intersection: Vec<String> = outer_cols.into_iter().filter(|c| inner_cols.contains(c)).collect();
    if intersection.is_empty() {
        return None;
    }
    Some(QueryNode::unary(NodeType::Projection, intersection.join(", "), grandchild))
}

fn column_set(projection_text: &str) -> Vec<String> {
    projection_text.split(',').map(|s| s.trim().to_string()).collect()
}

fn is_star(cols: &[String]) -> bool {
    cols.len() == 1 && cols[0] == "*"
}

/// `π_A(σ_p(X)) → σ_p(π_{A ∪ cols(p)}(X))`, with an outer trim back to
/// `A` when the predicate needed columns `A` didn't already carry. A
/// star projection has nothing to narrow, so it is left alone.
fn push_projection_through_selection(proj_cols: &[String], selection: &QueryNode) -> Option<QueryNode> {
    if is_star(proj_cols) {
        return None;
    }
    let grandchild = selection.children.first()?;
    let predicate = parse_condition(&selection.value).ok()?;
    let mut pushed = proj_cols.to_vec();
    for col in predicate.referenced_columns() {
        if !pushed.contains(&col) {
            pushed.push(col);
        }
    }
    if grandchild.node_type == NodeType::Projection && column_set(&grandchild.value) == pushed {
        return None;
    }
    let inner = QueryNode::unary(NodeType::Projection, pushed.join(", "), grandchild.clone());
    let new_selection = QueryNode::unary(NodeType::Selection, selection.value.clone(), inner);
    if pushed.len() == proj_cols.len() {
        Some(new_selection)
    } else {
        Some(QueryNode::unary(NodeType::Projection, proj_cols.join(", "), new_selection))
    }
}

/// Pushes a projection below a join, routing each column (and every
/// column the join predicate itself needs) to whichever side
/// `schema_owner` reports owns it; a column neither side can be
/// resolved to is kept on both, matching the conservative fallback a
/// qualified-or-not column reference needs. A star projection is
/// pushed to both sides verbatim.
fn push_projection_through_join(proj_cols: &[String], join: &QueryNode, schema_owner: &dyn Fn(&str) -> Option<usize>) -> Option<QueryNode> {
    let left = join.children.first()?;
    let right = join.children.get(1)?;
    if left.node_type == NodeType::Projection || right.node_type == NodeType::Projection {
        return None;
    }
    if is_star(proj_cols) {
        let new_left = QueryNode::unary(NodeType::Projection, "*", left.clone());
        let new_right = QueryNode::unary(NodeType::Projection, "*", right.clone());
        return Some(QueryNode::binary(join.node_type, join.value.clone(), new_left, new_right));
    }
    let join_cols = parse_condition(&join.value).ok().map(|c| c.referenced_columns()).unwrap_or_default();
    let mut left_cols: Vec<String> = Vec::new();
    let mut right_cols: Vec<String> = Vec::new();
    for col in proj_cols.iter().chain(join_cols.iter()) {
        match schema_owner(col) {
            Some(0) => {
                if !left_cols.contains(col) {
                    left_cols.push(col.clone());
                }
            }
            Some(1) => {
                if !right_cols.contains(col) {
                    right_cols.push(col.clone());
                }
            }
            _ => {
                if !left_cols.contains(col) {
                    left_cols.push(col.clone());
                }
                if !right_cols.contains(col) {
                    right_cols.push(col.clone());
                }
            }
        }
    }
    if left_cols.is_empty() && right_cols.is_empty() {
        return None;
    }
    let left_value = if left_cols.is_empty() { "*".to_string() } else { left_cols.join(", ") };
    let right_value = if right_cols.is_empty() { "*".to_string() } else { right_cols.join(", ") };
    let new_left = QueryNode::unary(NodeType::Projection, left_value, left.clone());
    let new_right = QueryNode::unary(NodeType::Projection, right_value, right.clone());
    Some(QueryNode::binary(join.node_type, join.value.clone(), new_left, new_right))
}

/// Always-applied logical rule: moves a projection below the selection
/// directly beneath it, so fewer columns are carried through the
/// filtering step. Unconditionally safe — narrowing columns before a
/// row filter never changes which rows survive it.
pub fn projection_pushdown(node: &QueryNode) -> Option<QueryNode> {
    if node.node_type != NodeType::Projection {
        return None;
    }
    let child = node.children.first()?;
    if child.node_type != NodeType::Selection {
        return None;
    }
    let proj_cols = column_set(&node.value);
    push_projection_through_selection(&proj_cols, child)
}

/// Cost-based rule: pushes a projection below a join, splitting the
/// projected columns (and the join predicate's own columns) to
/// whichever side owns them. Only ever returned to the caller when it
/// strictly lowers the estimated cost, since narrower per-side scans
/// aren't always cheaper than the join itself once cost is considered.
pub fn cost_based_projection_pushdown_step(node: &QueryNode, schema_owner: &dyn Fn(&str) -> Option<usize>) -> Option<QueryNode> {
    if node.node_type != NodeType::Projection {
        return None;
    }
    let child = node.children.first()?;
    if !matches!(child.node_type, NodeType::Join | NodeType::ThetaJoin | NodeType::NaturalJoin) {
        return None;
    }
    let proj_cols = column_set(&node.value);
    let new_join = push_projection_through_join(&proj_cols, child, schema_owner)?;
    Some(QueryNode::unary(NodeType::Projection, node.value.clone(), new_join))
}

/// Moves a projection as early as possible — directly beneath it, not
/// just one level down — whether that child is a selection or a join.
/// Grounded directly on the cost-model-gated "early projection" rule:
/// a projection sitting right atop a selection or join is the
/// candidate shape, and the rewrite is only kept when it is strictly
/// cheaper than leaving the projection where it was.
pub fn early_projection_step(node: &QueryNode, schema_owner: &dyn Fn(&str) -> Option<usize>) -> Option<QueryNode> {
    if node.node_type != NodeType::Projection || node.children.len() != 1 {
        return None;
    }
    let child = node.children.first()?;
    let proj_cols = column_set(&node.value);
    match child.node_type {
        NodeType::Selection => push_projection_through_selection(&proj_cols, child),
        NodeType::Join | NodeType::ThetaJoin | NodeType::NaturalJoin => push_projection_through_join(&proj_cols, child, schema_owner),
        _ => None,
    }
}

fn render(node: &ConditionNode) -> String {
    match node {
        ConditionNode::Simple(p) => render_predicate(p),
        ConditionNode::And(parts) => parts.iter().map(render).collect::<Vec<_>>().join(" AND "),
        ConditionNode::Or(parts) => parts
            .iter()
            .map(|p| format!("({})", render(p)))
            .collect::<Vec<_>>()
            .join(" OR "),
        ConditionNode::Not(inner) => format!("NOT ({})", render(inner)),
    }
}

fn render_predicate(p: &Predicate) -> String {
    use relix_expr::Operand;
    let render_operand = |o: &Operand| match o {
        Operand::Column(c) => c.clone(),
        Operand::Literal(v) => v.to_string(),
    };
    match p {
        Predicate::Compare { lhs, op, rhs } => {
            let op_text = match op {
                relix_primitives::CompareOp::Eq => "=",
                relix_primitives::CompareOp::NotEq => "!=",
                relix_primitives::CompareOp::Lt => "<",
                relix_primitives::CompareOp::LtEq => "<=",
                relix_primitives::CompareOp::Gt => ">",
                relix_primitives::CompareOp::GtEq => ">=",
            };
            format!("{} {} {}", render_operand(lhs), op_text, render_operand(rhs))
        }
        Predicate::Like { column, pattern } => format!("{column} LIKE '{pattern}'"),
        Predicate::In { column, values } => {
            let vals = values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
            format!("{column} IN ({vals})")
        }
        Predicate::IsNull { column } => format!("{column} IS NULL"),
        Predicate::IsNotNull { column } => format!("{column} IS NOT NULL"),
    }
}

/// Swaps the children of a join node, subject to a pluggable acceptance
/// predicate (defaults to always accepting the swap).
pub fn join_commutativity(node: &QueryNode, accept: &dyn Fn(&QueryNode) -> bool) -> Option<QueryNode> {
    if !matches!(node.node_type, NodeType::Join | NodeType::ThetaJoin | NodeType::NaturalJoin) {
        return None;
    }
    let left = node.children.first()?.clone();
    let right = node.children.get(1)?.clone();
    let swapped = QueryNode::binary(node.node_type, node.value.clone(), right, left);
    if accept(&swapped) {
        Some(swapped)
    } else {
        None
    }
}

/// Reshapes a left-deep join chain `(A ⋈ B) ⋈ C` into the right-deep
/// `A ⋈ (B ⋈ C)`, only when the top predicate references columns solely
/// from the sides that remain adjacent after the reshape.
pub fn join_associativity(node: &QueryNode) -> Option<QueryNode> {
    if !matches!(node.node_type, NodeType::Join | NodeType::ThetaJoin) {
        return None;
    }
    let left = node.children.first()?;
    if !matches!(left.node_type, NodeType::Join | NodeType::ThetaJoin) {
        return None;
    }
    let a = left.children.first()?.clone();
    let b = left.children.get(1)?.clone();
    let c = node.children.get(1)?.clone();
    let top_condition = parse_condition(&node.value).ok()?;
    let top_cols = top_condition.referenced_columns();
    let b_and_c_only = top_cols.iter().all(|col| {
        let in_a = node_mentions_table(&a, table_prefix(col));
        !in_a
    });
    if !b_and_c_only {
        return None;
    }
    let inner = QueryNode::binary(node.node_type, node.value.clone(), b, c);
    Some(QueryNode::binary(left.node_type, left.value.clone(), a, inner))
}

fn table_prefix(qualified_column: &str) -> &str {
    qualified_column.split('.').next().unwrap_or(qualified_column)
}

fn node_mentions_table(node: &QueryNode, table: &str) -> bool {
    if node.node_type == NodeType::Table && node.value == table {
        return true;
    }
    node.children.iter().any(|c| node_mentions_table(c, table))
}

/// Applies the fixed logical rule set bottom-up to a fixed point (or
/// [`MAX_LOGICAL_ITERATIONS`], whichever comes first).
pub fn apply_logical_rules(tree: &QueryNode, schema_owner: &dyn Fn(&str) -> Option<usize>) -> QueryNode {
    let mut current = tree.clone();
    for _ in 0..MAX_LOGICAL_ITERATIONS {
        let next = rewrite_bottom_up(&current, schema_owner);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn rewrite_bottom_up(node: &QueryNode, schema_owner: &dyn Fn(&str) -> Option<usize>) -> QueryNode {
    let children: Vec<QueryNode> = node.children.iter().map(|c| rewrite_bottom_up(c, schema_owner)).collect();
    let rebuilt = QueryNode {
        node_type: node.node_type,
        value: node.value.clone(),
        children,
    };
    let mut current = rebuilt;
    loop {
        let candidate = selection_decomposition(&current)
            .or_else(|| selection_commutativity(&current))
            .or_else(|| selection_over_cartesian_to_theta_join(&current))
            .or_else(|| selection_over_join_merge(&current))
            .or_else(|| selection_join_distribution(&current, schema_owner))
            .or_else(|| projection_elimination(&current))
            .or_else(|| projection_pushdown(&current));
        match candidate {
            Some(next) if next != current => current = next,
            _ => break,
        }
    }
    current
}

/// A cost-based rule is applied only when it strictly lowers the
/// subtree's estimated cost; `cost_fn` scores a tree against a stats
/// catalog using the node-cost formulas in [`crate::cost`].
pub fn cost_based_join_reordering(
    tree: &QueryNode,
    catalog: &StatsCatalog,
    cost_fn: impl Fn(&QueryNode, &StatsCatalog) -> Result<f64, cost::CostError>,
) -> QueryNode {
    let mut current = tree.clone();
    for _ in 0..MAX_COST_ITERATIONS {
        let Ok(current_cost) = cost_fn(&current, catalog) else {
            break;
        };
        let Some(candidate) = try_swap_any_join(&current) else {
            break;
        };
        let Ok(candidate_cost) = cost_fn(&candidate, catalog) else {
            break;
        };
        if candidate_cost < current_cost {
            current = candidate;
        } else {
            break;
        }
    }
    current
}

/// Cost-gated driver for [`cost_based_projection_pushdown_step`]: finds
/// the first node (bottom-up) it applies to, and keeps the rewrite only
/// when it strictly lowers the subtree's estimated cost.
pub fn cost_based_projection_pushdown(
    tree: &QueryNode,
    catalog: &StatsCatalog,
    schema_owner: &dyn Fn(&str) -> Option<usize>,
    cost_fn: impl Fn(&QueryNode, &StatsCatalog) -> Result<f64, cost::CostError>,
) -> QueryNode {
    let mut current = tree.clone();
    for _ in 0..MAX_COST_ITERATIONS {
        let Ok(current_cost) = cost_fn(&current, catalog) else {
            break;
        };
        let Some(candidate) = try_any_node(&current, &|n| cost_based_projection_pushdown_step(n, schema_owner)) else {
            break;
        };
        let Ok(candidate_cost) = cost_fn(&candidate, catalog) else {
            break;
        };
        if candidate_cost < current_cost {
            current = candidate;
        } else {
            break;
        }
    }
    current
}

/// Cost-gated driver for [`early_projection_step`], same shape as
/// [`cost_based_projection_pushdown`] but applying the rule that also
/// reaches through a selection, not just a join.
pub fn early_projection(
    tree: &QueryNode,
    catalog: &StatsCatalog,
    schema_owner: &dyn Fn(&str) -> Option<usize>,
    cost_fn: impl Fn(&QueryNode, &StatsCatalog) -> Result<f64, cost::CostError>,
) -> QueryNode {
    let mut current = tree.clone();
    for _ in 0..MAX_COST_ITERATIONS {
        let Ok(current_cost) = cost_fn(&current, catalog) else {
            break;
        };
        let Some(candidate) = try_any_node(&current, &|n| early_projection_step(n, schema_owner)) else {
            break;
        };
        let Ok(candidate_cost) = cost_fn(&candidate, catalog) else {
            break;
        };
        if candidate_cost < current_cost {
            current = candidate;
        } else {
            break;
        }
    }
    current
}

/// Searches for the first node `rule` applies to, preferring `node`
/// itself before descending into its children, and rebuilding the path
/// back to the root around the rewritten subtree.
fn try_any_node(node: &QueryNode, rule: &dyn Fn(&QueryNode) -> Option<QueryNode>) -> Option<QueryNode> {
    if let Some(rewritten) = rule(node) {
        return Some(rewritten);
    }
    for (i, child) in node.children.iter().enumerate() {
        if let Some(rewritten_child) = try_any_node(child, rule) {
            let mut children = node.children.clone();
            children[i] = rewritten_child;
            return Some(QueryNode {
                node_type: node.node_type,
                value: node.value.clone(),
                children,
            });
        }
    }
    None
}

fn try_swap_any_join(node: &QueryNode) -> Option<QueryNode> {
    if let Some(swapped) = join_commutativity(node, &|_| true) {
        return Some(swapped);
    }
    for (i, child) in node.children.iter().enumerate() {
        if let Some(swapped_child) = try_swap_any_join(child) {
            let mut children = node.children.clone();
            children[i] = swapped_child;
            return Some(QueryNode {
                node_type: node.node_type,
                value: node.value.clone(),
                children,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_top_level_and() {
        let node = QueryNode::unary(
            NodeType::Selection,
            "dept = 3 AND salary > 50000",
            QueryNode::leaf(NodeType::Table, "employees"),
        );
        let split = selection_decomposition(&node).unwrap();
        assert_eq!(split.node_type, NodeType::Selection);
        assert_eq!(split.children[0].node_type, NodeType::Selection);
    }

    #[test]
    fn swaps_more_selective_predicate_inward() {
        let node = QueryNode::unary(
            NodeType::Selection,
            "salary > 50000",
            QueryNode::unary(
                NodeType::Selection,
                "dept = 3",
                QueryNode::leaf(NodeType::Table, "employees"),
            ),
        );
        // dept = 3 (eq, 0.1) is already the inner, more selective predicate;
        // no swap should occur.
        assert!(selection_commutativity(&node).is_none());

        let reversed = QueryNode::unary(
            NodeType::Selection,
            "dept = 3",
            QueryNode::unary(
                NodeType::Selection,
                "salary > 50000",
                QueryNode::leaf(NodeType::Table, "employees"),
            ),
        );
        let swapped = selection_commutativity(&reversed).unwrap();
        assert_eq!(swapped.value, "dept = 3");
    }

    #[test]
    fn rewrites_selection_over_cartesian_into_theta_join() {
        let node = QueryNode::unary(
            NodeType::Selection,
            "e.dept = d.id",
            QueryNode::binary(
                NodeType::CartesianProduct,
                "",
                QueryNode::leaf(NodeType::Table, "e"),
                QueryNode::leaf(NodeType::Table, "d"),
            ),
        );
        let join = selection_over_cartesian_to_theta_join(&node).unwrap();
        assert_eq!(join.node_type, NodeType::ThetaJoin);
        assert_eq!(join.value, "e.dept = d.id");
    }

    #[test]
    fn eliminates_redundant_inner_projection() {
        let node = QueryNode::unary(
            NodeType::Projection,
            "name",
            QueryNode::unary(
                NodeType::Projection,
                "name, salary",
                QueryNode::leaf(NodeType::Table, "e"),
            ),
        );
        let collapsed = projection_elimination(&node).unwrap();
        assert_eq!(collapsed.node_type, NodeType::Projection);
        assert_eq!(collapsed.value, "name");
        assert_eq!(collapsed.children[0].node_type, NodeType::Table);
    }

    #[test]
    fn join_commutativity_swaps_children() {
        let node = QueryNode::binary(
            NodeType::Join,
            "e.dept = d.id",
            QueryNode::leaf(NodeType::Table, "e"),
            QueryNode::leaf(NodeType::Table, "d"),
        );
        let swapped = join_commutativity(&node, &|_| true).unwrap();
        assert_eq!(swapped.children[0].value, "d");
        assert_eq!(swapped.children[1].value, "e");
    }

    #[test]
    fn distributes_predicates_by_schema_ownership() {
        let node = QueryNode::unary(
            NodeType::Selection,
            "e.dept = 3 AND d.region = 'NA'",
            QueryNode::binary(
                NodeType::Join,
                "e.dept = d.id",
                QueryNode::leaf(NodeType::Table, "e"),
                QueryNode::leaf(NodeType::Table, "d"),
            ),
        );
        let owner = |col: &str| match table_prefix(col) {
            "e" => Some(0),
            "d" => Some(1),
            _ => None,
        };
        let result = selection_join_distribution(&node, &owner).unwrap();
        assert_eq!(result.node_type, NodeType::Join);
        assert_eq!(result.children[0].node_type, NodeType::Selection);
        assert_eq!(result.children[1].node_type, NodeType::Selection);
    }

    #[test]
    fn pushes_a_projection_below_a_selection() {
        let node = QueryNode::unary(
            NodeType::Projection,
            "name",
            QueryNode::unary(
                NodeType::Selection,
                "dept = 3",
                QueryNode::leaf(NodeType::Table, "employees"),
            ),
        );
        // dept is only needed to evaluate the selection, so the pushed-down
        // projection carries it but the outer one still trims back to just
        // `name`.
        let pushed = projection_pushdown(&node).unwrap();
        assert_eq!(pushed.node_type, NodeType::Projection);
        assert_eq!(pushed.value, "name");
        assert_eq!(pushed.children[0].node_type, NodeType::Selection);
        assert_eq!(pushed.children[0].children[0].node_type, NodeType::Projection);
        assert_eq!(pushed.children[0].children[0].value, "name, dept");
    }

    #[test]
    fn projection_pushdown_is_idempotent() {
        let node = QueryNode::unary(
            NodeType::Projection,
            "name",
            QueryNode::unary(
                NodeType::Selection,
                "dept = 3",
                QueryNode::leaf(NodeType::Table, "employees"),
            ),
        );
        let once = projection_pushdown(&node).unwrap();
        assert!(projection_pushdown(&once).is_none());
    }

    #[test]
    fn projection_pushdown_ignores_a_star_projection() {
        let node = QueryNode::unary(
            NodeType::Projection,
            "*",
            QueryNode::unary(
                NodeType::Selection,
                "dept = 3",
                QueryNode::leaf(NodeType::Table, "employees"),
            ),
        );
        assert!(projection_pushdown(&node).is_none());
    }

    #[test]
    fn splits_a_projection_over_a_join_by_column_ownership() {
        let node = QueryNode::unary(
            NodeType::Projection,
            "e.name, d.region",
            QueryNode::binary(
                NodeType::Join,
                "e.dept = d.id",
                QueryNode::leaf(NodeType::Table, "e"),
                QueryNode::leaf(NodeType::Table, "d"),
            ),
        );
        let owner = |col: &str| match table_prefix(col) {
            "e" => Some(0),
            "d" => Some(1),
            _ => None,
        };
        let pushed = cost_based_projection_pushdown_step(&node, &owner).unwrap();
        assert_eq!(pushed.children[0].node_type, NodeType::Join);
        let join = &pushed.children[0];
        assert_eq!(join.children[0].node_type, NodeType::Projection);
        assert_eq!(join.children[0].value, "e.name, e.dept");
        assert_eq!(join.children[1].node_type, NodeType::Projection);
        assert_eq!(join.children[1].value, "d.region, d.id");
    }

    #[test]
    fn early_projection_reaches_through_a_selection() {
        let node = QueryNode::unary(
            NodeType::Projection,
            "name",
            QueryNode::unary(
                NodeType::Selection,
                "dept = 3",
                QueryNode::leaf(NodeType::Table, "employees"),
            ),
        );
        let result = early_projection_step(&node, &|_| None).unwrap();
        assert_eq!(result.node_type, NodeType::Projection);
        assert_eq!(result.children[0].node_type, NodeType::Selection);
    }

    #[test]
    fn early_projection_reaches_through_a_join() {
        let node = QueryNode::unary(
            NodeType::Projection,
            "*",
            QueryNode::binary(
                NodeType::Join,
                "e.dept = d.id",
                QueryNode::leaf(NodeType::Table, "e"),
                QueryNode::leaf(NodeType::Table, "d"),
            ),
        );
        let result = early_projection_step(&node, &|_| None).unwrap();
        assert_eq!(result.node_type, NodeType::Join);
        assert_eq!(result.children[0].value, "*");
        assert_eq!(result.children[1].value, "*");
    }
}
