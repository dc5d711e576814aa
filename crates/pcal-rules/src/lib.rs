//! # pcal-rules: Declarative Boolean Rules
//!
//! The symbolic half of a pattern definition: a boolean expression over a
//! record's fields, e.g. "more than one zheng_guan and no qi_sha".
//!
//! - [`ast`]: the [`Rule`] tree.
//! - [`parse`]: JSON-logic and tagged-form loaders, canonical serialization.
//! - [`eval`]: pure evaluation against any [`FieldLookup`].
//!
//! ```
//! use pcal_rules::parse_rule;
//! use serde_json::json;
//!
//! let rule = parse_rule(&json!({">": [{"var": "ten_gods.zheng_guan"}, 1]})).unwrap();
//! assert!(rule.evaluate(&json!({"ten_gods": {"zheng_guan": 2}})));
//! ```

pub mod ast;
pub mod eval;
pub mod parse;

pub use ast::{CompareOp, Operand, Rule};
pub use eval::{truthy, FieldLookup};
pub use parse::{parse_rule, to_json_logic};
