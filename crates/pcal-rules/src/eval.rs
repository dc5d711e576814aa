//! # Rule Evaluation
//!
//! Pure tree-walking evaluation of a [`Rule`] against anything that can
//! resolve a [`FieldPath`]. Evaluation never fails: a missing field makes
//! ordering comparisons false and compares equal to `null`.
//!
//! ## Comparison semantics
//!
//! - Two numbers compare numerically (`2 == 2.0`).
//! - Two strings compare lexicographically.
//! - Any other pairing: `==`/`!=` use structural JSON equality, ordering
//!   operators are false.

use std::cmp::Ordering;

use serde_json::Value;

use pcal_core::{FieldPath, Record};

use crate::ast::{CompareOp, Operand, Rule};

/// Something rule paths can be resolved against.
pub trait FieldLookup {
    /// Resolve a path; `None` when any segment is missing.
    fn lookup(&self, path: &FieldPath) -> Option<&Value>;
}

impl FieldLookup for Value {
    fn lookup(&self, path: &FieldPath) -> Option<&Value> {
        path.resolve(self)
    }
}

impl FieldLookup for Record {
    fn lookup(&self, path: &FieldPath) -> Option<&Value> {
        self.get(path)
    }
}

impl Rule {
    /// Evaluate this rule against `target`.
    pub fn evaluate<T: FieldLookup + ?Sized>(&self, target: &T) -> bool {
        match self {
            Rule::And(children) => children.iter().all(|c| c.evaluate(target)),
            Rule::Or(children) => children.iter().any(|c| c.evaluate(target)),
            Rule::Not(inner) => !inner.evaluate(target),
            Rule::Compare { left, op, right } => {
                compare(resolve(left, target), *op, resolve(right, target))
            }
            Rule::Var(path) => target.lookup(path).is_some_and(truthy),
            Rule::Const(b) => *b,
        }
    }
}

/// JSON-logic truthiness: `false`, `null`, `0`, `""`, `[]` and `{}` are falsy.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn resolve<'a, T: FieldLookup + ?Sized>(operand: &'a Operand, target: &'a T) -> Option<&'a Value> {
    match operand {
        Operand::Path(p) => target.lookup(p),
        Operand::Literal(v) => Some(v),
    }
}

fn compare(left: Option<&Value>, op: CompareOp, right: Option<&Value>) -> bool {
    if !op.is_ordering() {
        let l = left.unwrap_or(&Value::Null);
        let r = right.unwrap_or(&Value::Null);
        let equal = loose_eq(l, r);
        return if op == CompareOp::Eq { equal } else { !equal };
    }

    let (Some(l), Some(r)) = (left, right) else {
        return false;
    };
    let Some(ordering) = order(l, r) else {
        return false;
    };
    match op {
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Eq | CompareOp::Ne => unreachable!("equality handled above"),
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) if l.is_number() && r.is_number() => a == b,
        _ => l == r,
    }
}

fn order(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_rule;
    use serde_json::json;

    fn rule(doc: Value) -> Rule {
        parse_rule(&doc).unwrap()
    }

    #[test]
    fn numeric_comparisons() {
        let data = json!({"a": 2, "b": 2.0, "c": 3});
        assert!(rule(json!({">": [{"var": "c"}, 2]})).evaluate(&data));
        assert!(rule(json!({"==": [{"var": "a"}, {"var": "b"}]})).evaluate(&data));
        assert!(rule(json!({">=": [{"var": "a"}, 2]})).evaluate(&data));
        assert!(!rule(json!({"<": [{"var": "a"}, 2]})).evaluate(&data));
        assert!(rule(json!({"<=": [1, {"var": "a"}, 3]})).evaluate(&data));
    }

    #[test]
    fn missing_fields_fail_orderings_and_equal_null() {
        let data = json!({"a": 1});
        assert!(!rule(json!({">": [{"var": "missing"}, 0]})).evaluate(&data));
        assert!(!rule(json!({"<": [{"var": "missing"}, 0]})).evaluate(&data));
        assert!(rule(json!({"==": [{"var": "missing"}, null]})).evaluate(&data));
        assert!(rule(json!({"!=": [{"var": "missing"}, 0]})).evaluate(&data));
    }

    #[test]
    fn mixed_types_do_not_order() {
        let data = json!({"s": "5"});
        assert!(!rule(json!({">": [{"var": "s"}, 1]})).evaluate(&data));
        assert!(!rule(json!({"==": [{"var": "s"}, 5]})).evaluate(&data));
        assert!(rule(json!({">": [{"var": "s"}, "4"]})).evaluate(&data));
    }

    #[test]
    fn truthiness() {
        let data = json!({"zero": 0, "one": 1, "empty": "", "list": [1], "f": false});
        assert!(!rule(json!({"var": "zero"})).evaluate(&data));
        assert!(rule(json!({"var": "one"})).evaluate(&data));
        assert!(!rule(json!({"var": "empty"})).evaluate(&data));
        assert!(rule(json!({"var": "list"})).evaluate(&data));
        assert!(!rule(json!({"var": "f"})).evaluate(&data));
        assert!(!rule(json!({"var": "nope"})).evaluate(&data));
    }

    #[test]
    fn empty_connectives() {
        let data = json!({});
        assert!(Rule::And(vec![]).evaluate(&data));
        assert!(!Rule::Or(vec![]).evaluate(&data));
    }

    #[test]
    fn evaluates_against_records_with_canonical_counts() {
        let r = Record::parse_line(r#"{"ten_gods":{"正官":2},"self_energy":0.4}"#, 1).unwrap();
        let rl = rule(json!({"and": [
            {">": [{"var": "ten_gods.zheng_guan"}, 1]},
            {"==": [{"var": "ten_gods.qi_sha"}, 0]},
            {"<": [{"var": "self_energy"}, 0.5]}
        ]}));
        assert!(rl.evaluate(&r));
    }
}
