//! A recursive-descent parser for `WHERE`/`ON` predicate clauses.
//!
//! Grammar (lowest to highest precedence):
//! ```text
//! or_expr    := and_expr (OR and_expr)*
//! and_expr   := unary (AND unary)*
//! unary      := NOT unary | primary
//! primary    := '(' or_expr ')' | predicate
//! predicate  := operand (cmp_op operand | IS [NOT] NULL | LIKE string | IN '(' operand (',' operand)* ')')
//! operand    := identifier | number | string | NULL
//! ```

use crate::error::ExprError;
use relix_primitives::CompareOp;
use relix_sats::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Column(String),
    Literal(Value),
}

impl Operand {
    pub fn column_name(&self) -> Option<&str> {
        match self {
            Operand::Column(c) => Some(c.as_str()),
            Operand::Literal(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare { lhs: Operand, op: CompareOp, rhs: Operand },
    Like { column: String, pattern: String },
    In { column: String, values: Vec<Value> },
    IsNull { column: String },
    IsNotNull { column: String },
}

impl Predicate {
    /// The single column this predicate constrains, if any (used by
    /// pushdown/ownership routing and the cardinality estimator).
    pub fn column(&self) -> Option<&str> {
        match self {
            Predicate::Compare { lhs, rhs, .. } => lhs.column_name().or_else(|| rhs.column_name()),
            Predicate::Like { column, .. }
            | Predicate::In { column, .. }
            | Predicate::IsNull { column }
            | Predicate::IsNotNull { column } => Some(column.as_str()),
        }
    }
}

/// A parsed condition: a tagged sum `Simple | And | Or | Not`. Evaluation
/// is a fold over this tree.
#[derive(Clone, Debug, PartialEq)]
pub enum ConditionNode {
    Simple(Predicate),
    And(Vec<ConditionNode>),
    Or(Vec<ConditionNode>),
    Not(Box<ConditionNode>),
}

impl ConditionNode {
    /// Every column name referenced anywhere in this condition.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        match self {
            ConditionNode::Simple(p) => {
                if let Some(c) = p.column() {
                    out.push(c.to_string());
                }
                if let Predicate::Compare { lhs, rhs, .. } = p {
                    for op in [lhs, rhs] {
                        if let Operand::Column(c) = op {
                            if !out.contains(c) {
                                out.push(c.clone());
                            }
                        }
                    }
                }
            }
            ConditionNode::And(parts) | ConditionNode::Or(parts) => {
                for p in parts {
                    p.collect_columns(out);
                }
            }
            ConditionNode::Not(inner) => inner.collect_columns(out),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Op(String),
    Ident(String),
    Number(String),
    Str(String),
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op("=".into()));
                i += 1;
            }
            '<' | '>' | '!' => {
                let mut op = String::new();
                op.push(c);
                i += 1;
                if i < chars.len() && chars[i] == '=' {
                    op.push('=');
                    i += 1;
                } else if c == '<' && i < chars.len() && chars[i] == '>' {
                    op.push('>');
                    i += 1;
                }
                tokens.push(Token::Op(op));
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let mut s = String::new();
                loop {
                    if i >= chars.len() {
                        return Err(ExprError::UnexpectedEof(src.to_string()));
                    }
                    if chars[i] == quote {
                        // Doubled quote -> literal quote char; otherwise end of string.
                        if i + 1 < chars.len() && chars[i + 1] == quote {
                            s.push(quote);
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::Str(s));
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(ExprError::UnexpectedToken {
                    source: src.to_string(),
                    found: other.to_string(),
                    pos: i,
                })
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn is_keyword(tok: &Token, kw: &str) -> bool {
        matches!(tok, Token::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek().map(|t| Self::is_keyword(t, kw)).unwrap_or(false) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn err_unexpected(&self) -> ExprError {
        match self.peek() {
            Some(t) => ExprError::UnexpectedToken {
                source: self.source.to_string(),
                found: format!("{t:?}"),
                pos: self.pos,
            },
            None => ExprError::UnexpectedEof(self.source.to_string()),
        }
    }

    fn parse_or(&mut self) -> Result<ConditionNode, ExprError> {
        let mut parts = vec![self.parse_and()?];
        while self.eat_keyword("OR") {
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 {
            parts.pop().unwrap()
        } else {
            ConditionNode::Or(parts)
        })
    }

    fn parse_and(&mut self) -> Result<ConditionNode, ExprError> {
        let mut parts = vec![self.parse_unary()?];
        while self.eat_keyword("AND") {
            parts.push(self.parse_unary()?);
        }
        Ok(if parts.len() == 1 {
            parts.pop().unwrap()
        } else {
            ConditionNode::And(parts)
        })
    }

    fn parse_unary(&mut self) -> Result<ConditionNode, ExprError> {
        if self.eat_keyword("NOT") {
            return Ok(ConditionNode::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<ConditionNode, ExprError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.bump();
            let inner = self.parse_or()?;
            match self.bump() {
                Some(Token::RParen) => Ok(inner),
                _ => Err(self.err_unexpected()),
            }
        } else {
            self.parse_predicate()
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, ExprError> {
        match self.bump() {
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case("NULL") => Ok(Operand::Literal(Value::Null)),
            Some(Token::Ident(s)) => Ok(Operand::Column(s)),
            Some(Token::Number(s)) => {
                if s.contains('.') {
                    Ok(Operand::Literal(Value::Float(s.parse().map_err(|_| {
                        ExprError::MalformedInteger(s.clone())
                    })?)))
                } else {
                    Ok(Operand::Literal(Value::Integer(
                        s.parse().map_err(|_| ExprError::MalformedInteger(s.clone()))?,
                    )))
                }
            }
            Some(Token::Str(s)) => Ok(Operand::Literal(Value::Text(s))),
            _ => Err(self.err_unexpected()),
        }
    }

    fn parse_predicate(&mut self) -> Result<ConditionNode, ExprError> {
        let lhs = self.parse_operand()?;

        if self.eat_keyword("IS") {
            let not = self.eat_keyword("NOT");
            if !self.eat_keyword("NULL") {
                return Err(self.err_unexpected());
            }
            let column = lhs
                .column_name()
                .ok_or_else(|| ExprError::UnexpectedToken {
                    source: self.source.to_string(),
                    found: "IS NULL on a non-column operand".into(),
                    pos: self.pos,
                })?
                .to_string();
            return Ok(ConditionNode::Simple(if not {
                Predicate::IsNotNull { column }
            } else {
                Predicate::IsNull { column }
            }));
        }

        if self.eat_keyword("LIKE") {
            let column = lhs.column_name().unwrap_or_default().to_string();
            match self.bump() {
                Some(Token::Str(pattern)) => {
                    return Ok(ConditionNode::Simple(Predicate::Like { column, pattern }))
                }
                _ => return Err(self.err_unexpected()),
            }
        }

        if self.eat_keyword("IN") {
            let column = lhs.column_name().unwrap_or_default().to_string();
            if !matches!(self.bump(), Some(Token::LParen)) {
                return Err(self.err_unexpected());
            }
            let mut values = Vec::new();
            loop {
                match self.parse_operand()? {
                    Operand::Literal(v) => values.push(v),
                    Operand::Column(c) => values.push(Value::Text(c)),
                }
                match self.bump() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    _ => return Err(self.err_unexpected()),
                }
            }
            return Ok(ConditionNode::Simple(Predicate::In { column, values }));
        }

        let op = match self.bump() {
            Some(Token::Op(s)) => CompareOp::from_token(&s).ok_or_else(|| ExprError::UnexpectedToken {
                source: self.source.to_string(),
                found: s,
                pos: self.pos,
            })?,
            _ => return Err(self.err_unexpected()),
        };
        let rhs = self.parse_operand()?;
        Ok(ConditionNode::Simple(Predicate::Compare { lhs, op, rhs }))
    }
}

/// Parses a predicate string into a [`ConditionNode`] tree.
pub fn parse_condition(src: &str) -> Result<ConditionNode, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        source: src,
    };
    let node = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.err_unexpected());
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_comparison() {
        let node = parse_condition("id = 2").unwrap();
        assert_eq!(
            node,
            ConditionNode::Simple(Predicate::Compare {
                lhs: Operand::Column("id".into()),
                op: CompareOp::Eq,
                rhs: Operand::Literal(Value::Integer(2)),
            })
        );
    }

    #[test]
    fn parses_top_level_and_into_flat_list() {
        let node = parse_condition("d.region = 'NA' AND e.salary > 50000").unwrap();
        match node {
            ConditionNode::And(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn parens_prevent_splitting_top_level_and() {
        let node = parse_condition("(a = 1 AND b = 2) OR c = 3").unwrap();
        match node {
            ConditionNode::Or(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[0], ConditionNode::And(_)));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn doubled_quotes_are_unescaped() {
        let node = parse_condition("name = 'it''s'").unwrap();
        assert_eq!(
            node,
            ConditionNode::Simple(Predicate::Compare {
                lhs: Operand::Column("name".into()),
                op: CompareOp::Eq,
                rhs: Operand::Literal(Value::Text("it's".into())),
            })
        );
    }

    #[test]
    fn is_null_and_is_not_null() {
        assert_eq!(
            parse_condition("name IS NULL").unwrap(),
            ConditionNode::Simple(Predicate::IsNull { column: "name".into() })
        );
        assert_eq!(
            parse_condition("name IS NOT NULL").unwrap(),
            ConditionNode::Simple(Predicate::IsNotNull { column: "name".into() })
        );
    }

    #[test]
    fn like_and_in() {
        assert_eq!(
            parse_condition("name LIKE '%x%'").unwrap(),
            ConditionNode::Simple(Predicate::Like {
                column: "name".into(),
                pattern: "%x%".into()
            })
        );
        let node = parse_condition("id IN (1, 2, 3)").unwrap();
        match node {
            ConditionNode::Simple(Predicate::In { values, .. }) => assert_eq!(values.len(), 3),
            other => panic!("expected In, got {other:?}"),
        }
    }

    #[test]
    fn qualified_columns_are_preserved() {
        let node = parse_condition("e.dept = d.id").unwrap();
        assert_eq!(
            node,
            ConditionNode::Simple(Predicate::Compare {
                lhs: Operand::Column("e.dept".into()),
                op: CompareOp::Eq,
                rhs: Operand::Column("d.id".into()),
            })
        );
    }

    #[test]
    fn referenced_columns_collects_all_sides() {
        let node = parse_condition("e.dept = d.id AND e.salary > 50000").unwrap();
        let cols = node.referenced_columns();
        assert!(cols.contains(&"e.dept".to_string()));
        assert!(cols.contains(&"d.id".to_string()));
        assert!(cols.contains(&"e.salary".to_string()));
    }
}
