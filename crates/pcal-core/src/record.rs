//! # Records
//!
//! A [`Record`] is the immutable input unit: a ten-god [`CountVector`], the
//! full parsed JSON object (so rules can address any nested field), and an
//! identifier.
//!
//! ## Normalization
//!
//! The count mapping is read from `ten_gods` (or `counts`), keyed by pinyin
//! or Chinese category names. After parsing, `ten_gods` is rewritten to the
//! canonical pinyin keys with all ten categories present (missing ones are
//! zero), so rule paths like `ten_gods.zheng_guan` see exactly what the
//! projector sees.

use serde_json::{Map, Value};

use crate::category::TenGod;
use crate::error::PcalError;
use crate::path::FieldPath;
use crate::tensor::CountVector;

/// Field holding the canonical count mapping after normalization.
pub const COUNTS_FIELD: &str = "ten_gods";

/// Alternate input field accepted for the count mapping.
pub const COUNTS_FIELD_ALT: &str = "counts";

/// Auxiliary field holding the normalized self energy.
pub const SELF_ENERGY_FIELD: &str = "self_energy";

/// An immutable input record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: String,
    line: u64,
    counts: CountVector,
    fields: Value,
}

impl Record {
    /// Parse a single JSON line. `line` is the 1-based position in the source.
    pub fn parse_line(raw: &str, line: u64) -> Result<Self, PcalError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| malformed(line, format!("invalid JSON: {e}")))?;
        Self::from_value(value, line)
    }

    /// Build a record from an already-parsed JSON value.
    pub fn from_value(mut value: Value, line: u64) -> Result<Self, PcalError> {
        let obj = value
            .as_object_mut()
            .ok_or_else(|| malformed(line, "record is not a JSON object".into()))?;

        let raw_counts = obj
            .get(COUNTS_FIELD)
            .or_else(|| obj.get(COUNTS_FIELD_ALT))
            .ok_or_else(|| malformed(line, format!("missing `{COUNTS_FIELD}` mapping")))?;
        let map = raw_counts
            .as_object()
            .ok_or_else(|| malformed(line, format!("`{COUNTS_FIELD}` must be an object")))?;

        let mut counts = [0u32; TenGod::COUNT];
        for (key, raw) in map {
            let Some(god) = TenGod::lookup(key) else {
                tracing::trace!(line, key = %key, "ignoring unknown category key");
                continue;
            };
            counts[god.index()] = parse_count(raw)
                .ok_or_else(|| malformed(line, format!("count for `{key}` is not a non-negative integer: {raw}")))?;
        }
        let counts = CountVector::new(counts);

        let canonical: Map<String, Value> = counts
            .iter()
            .map(|(god, n)| (god.as_str().to_string(), Value::from(n)))
            .collect();
        obj.insert(COUNTS_FIELD.to_string(), Value::Object(canonical));

        let id = match obj.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("line:{line}"),
        };

        Ok(Self {
            id,
            line,
            counts,
            fields: value,
        })
    }

    /// Build a record directly from counts and extra fields. Used by tests and
    /// by callers that already hold structured data.
    pub fn from_counts(id: impl Into<String>, counts: CountVector, extra: Map<String, Value>) -> Self {
        let mut obj = extra;
        let canonical: Map<String, Value> = counts
            .iter()
            .map(|(god, n)| (god.as_str().to_string(), Value::from(n)))
            .collect();
        obj.insert(COUNTS_FIELD.to_string(), Value::Object(canonical));
        let id = id.into();
        obj.insert("id".to_string(), Value::String(id.clone()));
        Self {
            id,
            line: 0,
            counts,
            fields: Value::Object(obj),
        }
    }

    /// Record identifier (`id` field, or `line:<n>` when absent).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 1-based line number in the source (0 for records built in memory).
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Ten-god counts.
    pub fn counts(&self) -> &CountVector {
        &self.counts
    }

    /// The full normalized JSON object.
    pub fn fields(&self) -> &Value {
        &self.fields
    }

    /// Resolve a field path against this record.
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        path.resolve(&self.fields)
    }

    /// Numeric auxiliary field by dotted path.
    pub fn aux(&self, path: &str) -> Option<f64> {
        FieldPath::parse(path).ok()?.resolve(&self.fields)?.as_f64()
    }

    /// Normalized self energy, when the record carries one.
    pub fn self_energy(&self) -> Option<f64> {
        self.fields.get(SELF_ENERGY_FIELD)?.as_f64()
    }
}

fn parse_count(raw: &Value) -> Option<u32> {
    if let Some(n) = raw.as_u64() {
        return u32::try_from(n).ok();
    }
    let f = raw.as_f64()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) {
        Some(f as u32)
    } else {
        None
    }
}

fn malformed(line: u64, reason: String) -> PcalError {
    PcalError::MalformedRecord { line, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_pinyin_counts_and_zero_fills() {
        let r = Record::parse_line(r#"{"id":"c1","ten_gods":{"zheng_guan":2,"qi_sha":1}}"#, 1)
            .unwrap();
        assert_eq!(r.id(), "c1");
        assert_eq!(r.counts().get(TenGod::ZhengGuan), 2);
        assert_eq!(r.counts().get(TenGod::QiSha), 1);
        assert_eq!(r.counts().get(TenGod::BiJian), 0);
        assert_eq!(r.fields()["ten_gods"]["bi_jian"], json!(0));
    }

    #[test]
    fn parses_chinese_keys_into_canonical_field() {
        let r = Record::parse_line(r#"{"counts":{"正官":3,"伤官":1.0}}"#, 7).unwrap();
        assert_eq!(r.counts().get(TenGod::ZhengGuan), 3);
        assert_eq!(r.counts().get(TenGod::ShangGuan), 1);
        assert_eq!(r.fields()["ten_gods"]["zheng_guan"], json!(3));
        assert_eq!(r.id(), "line:7");
    }

    #[test]
    fn numeric_id_is_stringified() {
        let r = Record::parse_line(r#"{"id":42,"ten_gods":{}}"#, 1).unwrap();
        assert_eq!(r.id(), "42");
    }

    #[test]
    fn unknown_category_keys_are_ignored() {
        let r = Record::parse_line(r#"{"ten_gods":{"day_master":"jia","bi_jian":1}}"#, 1).unwrap();
        assert_eq!(r.counts().total(), 1);
    }

    #[test]
    fn rejects_invalid_json() {
        let err = Record::parse_line("{not json", 3).unwrap_err();
        assert!(matches!(err, PcalError::MalformedRecord { line: 3, .. }));
    }

    #[test]
    fn rejects_missing_counts() {
        let err = Record::parse_line(r#"{"id":"x"}"#, 2).unwrap_err();
        assert!(err.to_string().contains("ten_gods"));
    }

    #[test]
    fn rejects_negative_and_fractional_counts() {
        assert!(Record::parse_line(r#"{"ten_gods":{"bi_jian":-1}}"#, 1).is_err());
        assert!(Record::parse_line(r#"{"ten_gods":{"bi_jian":1.5}}"#, 1).is_err());
        assert!(Record::parse_line(r#"{"ten_gods":{"bi_jian":"two"}}"#, 1).is_err());
    }

    #[test]
    fn rejects_non_object_records() {
        assert!(Record::parse_line("[1,2,3]", 1).is_err());
    }

    #[test]
    fn aux_fields_and_self_energy() {
        let r = Record::parse_line(
            r#"{"ten_gods":{},"self_energy":0.35,"meta":{"score":[1,2.5]}}"#,
            1,
        )
        .unwrap();
        assert_eq!(r.self_energy(), Some(0.35));
        assert_eq!(r.aux("meta.score.1"), Some(2.5));
        assert_eq!(r.aux("meta.missing"), None);
    }

    #[test]
    fn from_counts_builds_canonical_fields() {
        let r = Record::from_counts(
            "mem-1",
            CountVector::from_pairs([(TenGod::PianYin, 4)]),
            Map::new(),
        );
        assert_eq!(r.fields()["ten_gods"]["pian_yin"], json!(4));
        assert_eq!(r.fields()["id"], json!("mem-1"));
        assert_eq!(r.line(), 0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Parsing keeps every count, keyed by pinyin or Chinese name, and
        /// falls back to the line number for the id.
        #[test]
        fn counts_survive_parsing(
            counts in prop::array::uniform10(0u32..1000),
            chinese in any::<bool>(),
            line in 1u64..1_000_000,
        ) {
            let map: Map<String, Value> = TenGod::all()
                .iter()
                .map(|g| {
                    let key = if chinese { g.chinese() } else { g.as_str() };
                    (key.to_string(), Value::from(counts[g.index()]))
                })
                .collect();
            let mut doc = Map::new();
            doc.insert(COUNTS_FIELD.to_string(), Value::Object(map));
            let raw = Value::Object(doc).to_string();

            let r = Record::parse_line(&raw, line).unwrap();
            prop_assert_eq!(r.counts().as_array(), &counts);
            prop_assert_eq!(r.id(), format!("line:{line}"));
            prop_assert_eq!(r.line(), line);
        }
    }
}
