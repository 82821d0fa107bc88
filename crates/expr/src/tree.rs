//! The query tree: the relational-algebra plan shape operated on by the
//! rewrite rules and, ultimately, the physical-plan generator.

/// The kind of a query-tree node. `Unknown` is the landing spot for node
/// types the (external, black-box) parser may hand us that this core
/// doesn't recognize; the dispatcher rejects them rather than panicking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    Table,
    Selection,
    Projection,
    Join,
    ThetaJoin,
    NaturalJoin,
    CartesianProduct,
    OrderBy,
    Limit,
    Insert,
    Update,
    Delete,
    CreateTable,
    DropTable,
    CreateIndex,
    DropIndex,
    BeginTransaction,
    Commit,
    Abort,
    Unknown,
}

/// A node of the relational-algebra query tree. `value` carries the SQL
/// fragment relevant to this node (a predicate, a column list, a
/// table/alias, an assignment clause); children are the node's operand
/// subtrees. Parent pointers are deliberately not modeled here — see
/// DESIGN.md for the rationale.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryNode {
    pub node_type: NodeType,
    pub value: String,
    pub children: Vec<QueryNode>,
}

impl QueryNode {
    pub fn new(node_type: NodeType, value: impl Into<String>) -> Self {
        Self {
            node_type,
            value: value.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<QueryNode>) -> Self {
        self.children = children;
        self
    }

    pub fn leaf(node_type: NodeType, value: impl Into<String>) -> Self {
        Self::new(node_type, value)
    }

    pub fn unary(node_type: NodeType, value: impl Into<String>, child: QueryNode) -> Self {
        Self::new(node_type, value).with_children(vec![child])
    }

    pub fn binary(node_type: NodeType, value: impl Into<String>, left: QueryNode, right: QueryNode) -> Self {
        Self::new(node_type, value).with_children(vec![left, right])
    }

    /// Total node count of the subtree rooted here.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(QueryNode::node_count).sum::<usize>()
    }

    /// Depth of the subtree rooted here (a leaf has depth 1).
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(QueryNode::depth).max().unwrap_or(0)
    }

    /// Structural equality used for candidate-plan deduplication: same
    /// node type and same number of children, recursively. Values are
    /// intentionally ignored.
    pub fn structurally_eq(&self, other: &QueryNode) -> bool {
        self.node_type == other.node_type
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.structurally_eq(b))
    }

    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut QueryNode)) {
        f(self);
        for child in &mut self.children {
            child.visit_mut(f);
        }
    }

    pub fn visit(&self, f: &mut impl FnMut(&QueryNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_count_and_depth() {
        let tree = QueryNode::binary(
            NodeType::Join,
            "e.dept = d.id",
            QueryNode::leaf(NodeType::Table, "e"),
            QueryNode::leaf(NodeType::Table, "d"),
        );
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn structural_eq_ignores_values() {
        let a = QueryNode::unary(NodeType::Selection, "x=1", QueryNode::leaf(NodeType::Table, "t"));
        let b = QueryNode::unary(NodeType::Selection, "y=2", QueryNode::leaf(NodeType::Table, "u"));
        assert!(a.structurally_eq(&b));
    }
}
