//! # Rule AST
//!
//! A small tagged-variant expression tree. The tree is independent of any
//! serialization format; [`crate::parse`] builds it from JSON-logic or the
//! tagged form, and [`crate::eval`] walks it.

use std::fmt;

use serde_json::Value;

use pcal_core::FieldPath;

// ---------------------------------------------------------------------------
// CompareOp
// ---------------------------------------------------------------------------

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl CompareOp {
    /// Operator symbol as written in rule documents.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    /// Parse a symbol. `===`/`!==` are accepted as their loose forms.
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "==" | "===" => Some(Self::Eq),
            "!=" | "!==" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            _ => None,
        }
    }

    /// Whether this operator needs an ordering rather than equality.
    pub fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ---------------------------------------------------------------------------
// Operand
// ---------------------------------------------------------------------------

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A field of the record.
    Path(FieldPath),
    /// A constant.
    Literal(Value),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{p}"),
            Self::Literal(v) => write!(f, "{v}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A boolean expression over record fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// All children hold. Empty conjunction is `true`.
    And(Vec<Rule>),
    /// Any child holds. Empty disjunction is `false`.
    Or(Vec<Rule>),
    /// Negation.
    Not(Box<Rule>),
    /// `left op right`.
    Compare {
        /// Left operand.
        left: Operand,
        /// Operator.
        op: CompareOp,
        /// Right operand.
        right: Operand,
    },
    /// The field at this path is truthy.
    Var(FieldPath),
    /// A constant verdict.
    Const(bool),
}

impl Rule {
    /// `path op literal`, the common comparison shape.
    pub fn compare(path: FieldPath, op: CompareOp, literal: impl Into<Value>) -> Self {
        Self::Compare {
            left: Operand::Path(path),
            op,
            right: Operand::Literal(literal.into()),
        }
    }

    /// Conjunction of this rule and `other`, flattening nested `And`s.
    pub fn and(self, other: Rule) -> Self {
        match (self, other) {
            (Rule::And(mut a), Rule::And(b)) => {
                a.extend(b);
                Rule::And(a)
            }
            (Rule::And(mut a), r) => {
                a.push(r);
                Rule::And(a)
            }
            (l, Rule::And(mut b)) => {
                b.insert(0, l);
                Rule::And(b)
            }
            (l, r) => Rule::And(vec![l, r]),
        }
    }

    /// Negation of this rule.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Rule::Not(Box::new(self))
    }

    /// Every field path referenced anywhere in the tree, in visit order.
    pub fn paths(&self) -> Vec<&FieldPath> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a FieldPath>) {
        match self {
            Rule::And(children) | Rule::Or(children) => {
                for c in children {
                    c.collect_paths(out);
                }
            }
            Rule::Not(inner) => inner.collect_paths(out),
            Rule::Compare { left, right, .. } => {
                for side in [left, right] {
                    if let Operand::Path(p) = side {
                        out.push(p);
                    }
                }
            }
            Rule::Var(p) => out.push(p),
            Rule::Const(_) => {}
        }
    }

    /// Depth of the tree (a leaf has depth 1).
    pub fn depth(&self) -> usize {
        match self {
            Rule::And(children) | Rule::Or(children) => {
                1 + children.iter().map(Rule::depth).max().unwrap_or(0)
            }
            Rule::Not(inner) => 1 + inner.depth(),
            Rule::Compare { .. } | Rule::Var(_) | Rule::Const(_) => 1,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, children: &[Rule], sep: &str| -> fmt::Result {
            f.write_str("(")?;
            for (i, c) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "{c}")?;
            }
            f.write_str(")")
        };
        match self {
            Rule::And(children) if children.is_empty() => f.write_str("true"),
            Rule::Or(children) if children.is_empty() => f.write_str("false"),
            Rule::And(children) => join(f, children, "AND"),
            Rule::Or(children) => join(f, children, "OR"),
            Rule::Not(inner) => write!(f, "NOT {inner}"),
            Rule::Compare { left, op, right } => write!(f, "{left} {op} {right}"),
            Rule::Var(p) => write!(f, "{p}"),
            Rule::Const(b) => write!(f, "{b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn and_flattens() {
        let a = Rule::Var(path("a"));
        let b = Rule::Var(path("b"));
        let c = Rule::Var(path("c"));
        let r = a.and(b).and(c);
        match r {
            Rule::And(children) => assert_eq!(children.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn paths_are_collected_from_all_branches() {
        let r = Rule::Or(vec![
            Rule::compare(path("x.y"), CompareOp::Gt, 1),
            Rule::Var(path("z")).not(),
            Rule::Compare {
                left: Operand::Path(path("p")),
                op: CompareOp::Eq,
                right: Operand::Path(path("q")),
            },
        ]);
        let names: Vec<String> = r.paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(names, vec!["x.y", "z", "p", "q"]);
        assert_eq!(r.depth(), 3);
    }

    #[test]
    fn display_is_infix() {
        let r = Rule::compare(path("ten_gods.qi_sha"), CompareOp::Ge, 2)
            .and(Rule::Var(path("flags.strong")).not());
        assert_eq!(r.to_string(), "(ten_gods.qi_sha >= 2 AND NOT flags.strong)");
        assert_eq!(Rule::And(vec![]).to_string(), "true");
    }

    #[test]
    fn operator_symbols_round_trip() {
        for op in [
            CompareOp::Eq,
            CompareOp::Ne,
            CompareOp::Gt,
            CompareOp::Ge,
            CompareOp::Lt,
            CompareOp::Le,
        ] {
            assert_eq!(CompareOp::from_symbol(op.symbol()), Some(op));
        }
        assert_eq!(CompareOp::from_symbol("==="), Some(CompareOp::Eq));
        assert_eq!(CompareOp::from_symbol("~"), None);
    }
}
