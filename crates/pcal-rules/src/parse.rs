//! # Rule Documents
//!
//! Loads a [`Rule`] from a JSON value (YAML documents go through the same
//! path via `serde`), and writes it back in canonical JSON-logic form.
//!
//! Two input shapes are accepted:
//!
//! ```text
//! JSON-logic:  {"and": [{">": [{"var": "ten_gods.zheng_guan"}, 1]},
//!                       {"!": {"var": "flags.broken"}}]}
//!
//! Tagged:      {"op": "and", "children": [
//!                 {"op": "compare", "path": "ten_gods.zheng_guan", "cmp": ">", "value": 1},
//!                 {"op": "not", "child": {"op": "var", "path": "flags.broken"}}]}
//! ```
//!
//! JSON-logic's three-argument `<` / `<=` (between) is expanded into a
//! conjunction of two comparisons.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use pcal_core::{FieldPath, PcalError};

use crate::ast::{CompareOp, Operand, Rule};

/// Parse a rule document.
pub fn parse_rule(doc: &Value) -> Result<Rule, PcalError> {
    match doc {
        Value::Bool(b) => Ok(Rule::Const(*b)),
        Value::Object(map) if map.contains_key("op") => parse_tagged(map),
        Value::Object(map) => parse_logic(map),
        other => Err(invalid(format!("expected a rule object or boolean, got {other}"))),
    }
}

/// Canonical JSON-logic form of a rule.
pub fn to_json_logic(rule: &Rule) -> Value {
    match rule {
        Rule::And(children) => json!({ "and": children.iter().map(to_json_logic).collect::<Vec<_>>() }),
        Rule::Or(children) => json!({ "or": children.iter().map(to_json_logic).collect::<Vec<_>>() }),
        Rule::Not(inner) => json!({ "!": to_json_logic(inner) }),
        Rule::Compare { left, op, right } => {
            let mut m = Map::new();
            m.insert(
                op.symbol().to_string(),
                Value::Array(vec![operand_json(left), operand_json(right)]),
            );
            Value::Object(m)
        }
        Rule::Var(path) => json!({ "!!": { "var": path.to_string() } }),
        Rule::Const(b) => Value::Bool(*b),
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_json_logic(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let doc = Value::deserialize(deserializer)?;
        parse_rule(&doc).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// JSON-logic
// ---------------------------------------------------------------------------

fn parse_logic(map: &Map<String, Value>) -> Result<Rule, PcalError> {
    let mut entries = map.iter();
    let (key, args) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => {
            return Err(invalid(format!(
                "a JSON-logic node must have exactly one operator key, got {} keys",
                map.len()
            )))
        }
    };

    match key.as_str() {
        "and" => Ok(Rule::And(parse_children(key, args)?)),
        "or" => Ok(Rule::Or(parse_children(key, args)?)),
        "!" | "not" => Ok(Rule::Not(Box::new(parse_rule(single_arg(key, args)?)?))),
        "!!" => {
            let arg = single_arg(key, args)?;
            match parse_operand(arg)? {
                Operand::Path(p) => Ok(Rule::Var(p)),
                Operand::Literal(v) => Ok(Rule::Const(crate::eval::truthy(&v))),
            }
        }
        "var" => Ok(Rule::Var(var_path(args)?)),
        sym => {
            let op = CompareOp::from_symbol(sym)
                .ok_or_else(|| invalid(format!("unsupported operator \"{sym}\"")))?;
            let items = args
                .as_array()
                .ok_or_else(|| invalid(format!("operator \"{sym}\" expects an array of operands")))?;
            match items.len() {
                2 => Ok(Rule::Compare {
                    left: parse_operand(&items[0])?,
                    op,
                    right: parse_operand(&items[1])?,
                }),
                3 if matches!(op, CompareOp::Lt | CompareOp::Le) => {
                    let a = parse_operand(&items[0])?;
                    let b = parse_operand(&items[1])?;
                    let c = parse_operand(&items[2])?;
                    Ok(Rule::And(vec![
                        Rule::Compare { left: a, op, right: b.clone() },
                        Rule::Compare { left: b, op, right: c },
                    ]))
                }
                n => Err(invalid(format!("operator \"{sym}\" expects 2 operands, got {n}"))),
            }
        }
    }
}

fn parse_children(key: &str, args: &Value) -> Result<Vec<Rule>, PcalError> {
    args.as_array()
        .ok_or_else(|| invalid(format!("\"{key}\" expects an array")))?
        .iter()
        .map(parse_rule)
        .collect()
}

fn single_arg<'a>(key: &str, args: &'a Value) -> Result<&'a Value, PcalError> {
    match args {
        Value::Array(items) if items.len() == 1 => Ok(&items[0]),
        Value::Array(items) => Err(invalid(format!(
            "\"{key}\" expects one argument, got {}",
            items.len()
        ))),
        other => Ok(other),
    }
}

fn var_path(args: &Value) -> Result<FieldPath, PcalError> {
    let raw = match args {
        Value::String(s) => s.as_str(),
        Value::Array(items) => match items.as_slice() {
            [Value::String(s)] => s.as_str(),
            [_, _] => {
                return Err(invalid(format!(
                    "\"var\" defaults are not supported, got {args}"
                )))
            }
            _ => return Err(invalid("\"var\" expects a path string".into())),
        },
        _ => return Err(invalid("\"var\" expects a path string".into())),
    };
    FieldPath::parse(raw)
}

fn parse_operand(v: &Value) -> Result<Operand, PcalError> {
    match v {
        Value::Object(map) if map.len() == 1 && map.contains_key("var") => {
            Ok(Operand::Path(var_path(&map["var"])?))
        }
        Value::Object(_) => Err(invalid(format!(
            "comparison operands must be {{\"var\": path}} or literals, got {v}"
        ))),
        literal => Ok(Operand::Literal(literal.clone())),
    }
}

fn operand_json(op: &Operand) -> Value {
    match op {
        Operand::Path(p) => json!({ "var": p.to_string() }),
        Operand::Literal(v) => v.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tagged form
// ---------------------------------------------------------------------------

fn parse_tagged(map: &Map<String, Value>) -> Result<Rule, PcalError> {
    let op = map
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("\"op\" must be a string".into()))?;

    let field = |name: &str| {
        map.get(name)
            .ok_or_else(|| invalid(format!("tagged \"{op}\" node is missing \"{name}\"")))
    };

    match op {
        "and" | "or" => {
            let children = field("children")?
                .as_array()
                .ok_or_else(|| invalid(format!("\"{op}\" children must be an array")))?
                .iter()
                .map(parse_rule)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if op == "and" { Rule::And(children) } else { Rule::Or(children) })
        }
        "not" => Ok(Rule::Not(Box::new(parse_rule(field("child")?)?))),
        "var" => Ok(Rule::Var(var_path(field("path")?)?)),
        "const" => field("value")?
            .as_bool()
            .map(Rule::Const)
            .ok_or_else(|| invalid("\"const\" value must be a boolean".into())),
        "compare" => {
            let cmp = field("cmp")?
                .as_str()
                .and_then(CompareOp::from_symbol)
                .ok_or_else(|| invalid("\"compare\" needs a valid \"cmp\" symbol".into()))?;
            let left = Operand::Path(var_path(field("path")?)?);
            let right = match (map.get("value"), map.get("other")) {
                (Some(v), None) => Operand::Literal(v.clone()),
                (None, Some(p)) => Operand::Path(var_path(p)?),
                _ => {
                    return Err(invalid(
                        "\"compare\" needs exactly one of \"value\" or \"other\"".into(),
                    ))
                }
            };
            Ok(Rule::Compare { left, op: cmp, right })
        }
        other => Err(invalid(format!("unknown tagged op \"{other}\""))),
    }
}

fn invalid(msg: String) -> PcalError {
    PcalError::InvalidRule(msg)
}
