//! Parsing of `SELECT` column lists.

use crate::error::ExprError;

#[derive(Clone, Debug, PartialEq)]
pub enum ProjectionItem {
    /// `SELECT *`
    Star,
    /// `SELECT t.*`
    TableStar(String),
    /// A bare or qualified column reference.
    Column(String),
    /// `column AS alias`
    Aliased { column: String, alias: String },
}

impl ProjectionItem {
    pub fn base_column(&self) -> Option<&str> {
        match self {
            ProjectionItem::Column(c) => Some(c.as_str()),
            ProjectionItem::Aliased { column, .. } => Some(column.as_str()),
            ProjectionItem::Star | ProjectionItem::TableStar(_) => None,
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

/// Parses a comma-separated projection list. Rejects anything that looks
/// like an arithmetic expression or function call (a `(` appearing where
/// an item should be a plain reference) since neither the query tree nor
/// the cost model carry the machinery to evaluate derived expressions.
pub fn parse_projection(src: &str) -> Result<Vec<ProjectionItem>, ExprError> {
    let mut items = Vec::new();
    for raw in src.split(',') {
        let item = raw.trim();
        if item.is_empty() {
            return Err(ExprError::UnexpectedEof(src.to_string()));
        }
        if item != "*" && (item.contains('(') || item.contains(')') || item.contains('+') || item.contains('*')) {
            return Err(ExprError::UnsupportedExpression(item.to_string()));
        }
        if item != "*" && !item.chars().all(|c| is_ident_char(c) || c.is_whitespace()) {
            return Err(ExprError::UnsupportedExpression(item.to_string()));
        }

        let lower = item.to_ascii_lowercase();
        if let Some(as_pos) = lower.find(" as ") {
            let column = item[..as_pos].trim().to_string();
            let alias = item[as_pos + 4..].trim().to_string();
            if column.is_empty() || alias.is_empty() {
                return Err(ExprError::UnexpectedEof(src.to_string()));
            }
            items.push(ProjectionItem::Aliased { column, alias });
            continue;
        }

        if item == "*" {
            items.push(ProjectionItem::Star);
        } else if let Some(table) = item.strip_suffix(".*") {
            items.push(ProjectionItem::TableStar(table.to_string()));
        } else {
            items.push(ProjectionItem::Column(item.to_string()));
        }
    }
    Ok(items)
}
