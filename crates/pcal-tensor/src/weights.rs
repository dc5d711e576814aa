//! # Weight Matrix
//!
//! The 10×5 coefficient table mapping ten-god counts onto the tensor axes.
//! One row per category, one column per axis, immutable after load.
//!
//! ## Document form
//!
//! ```text
//! weights:
//!   zheng_guan: [1.0, 0.0, 0.0, 0.0, 0.0]
//!   七杀:       [0.0, 0.0, 0.0, 1.0, 0.0]
//! ```
//!
//! Categories absent from the mapping contribute a zero row. Unknown names,
//! rows that are not exactly five numbers and non-finite coefficients are
//! rejected with [`PcalError::InvalidManifest`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use pcal_core::{Axis, PcalError, TenGod, AXES};

/// One row of coefficients `[E, O, M, S, R]`.
pub type WeightRow = [f64; AXES];

/// Category-by-axis projection coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeightMatrix {
    rows: [WeightRow; TenGod::COUNT],
}

impl WeightMatrix {
    /// All-zero matrix.
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Build from rows in [`TenGod::index`] order.
    pub fn new(rows: [WeightRow; TenGod::COUNT]) -> Result<Self, PcalError> {
        let m = Self { rows };
        m.validate()?;
        Ok(m)
    }

    /// Build from a sparse `category → row` map keyed by pinyin or Chinese
    /// names.
    pub fn from_named_rows<'a, I>(rows: I) -> Result<Self, PcalError>
    where
        I: IntoIterator<Item = (&'a str, &'a [f64])>,
    {
        let mut out = [[0.0; AXES]; TenGod::COUNT];
        for (name, row) in rows {
            let god = TenGod::lookup(name).ok_or_else(|| {
                PcalError::InvalidManifest(format!("unknown ten-god category \"{name}\" in weights"))
            })?;
            let row: WeightRow = row.try_into().map_err(|_| {
                PcalError::InvalidManifest(format!(
                    "weight row for \"{name}\" must have {AXES} entries (E, O, M, S, R), got {}",
                    row.len()
                ))
            })?;
            out[god.index()] = row;
        }
        Self::new(out)
    }

    /// Return a copy with one row replaced.
    pub fn with_row(mut self, god: TenGod, row: WeightRow) -> Self {
        self.rows[god.index()] = row;
        self
    }

    /// Coefficients for one category.
    pub fn row(&self, god: TenGod) -> &WeightRow {
        &self.rows[god.index()]
    }

    /// Single coefficient.
    pub fn get(&self, god: TenGod, axis: Axis) -> f64 {
        self.rows[god.index()][axis.index()]
    }

    /// All rows in canonical category order.
    pub fn rows(&self) -> &[WeightRow; TenGod::COUNT] {
        &self.rows
    }

    fn validate(&self) -> Result<(), PcalError> {
        for (god, row) in TenGod::all().iter().zip(&self.rows) {
            if let Some(bad) = row.iter().find(|v| !v.is_finite()) {
                return Err(PcalError::InvalidManifest(format!(
                    "weight row for \"{god}\" contains non-finite value {bad}"
                )));
            }
        }
        Ok(())
    }
}

impl Serialize for WeightMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sparse: BTreeMap<&str, &WeightRow> = TenGod::all()
            .iter()
            .zip(&self.rows)
            .filter(|(_, row)| row.iter().any(|v| *v != 0.0))
            .map(|(god, row)| (god.as_str(), row))
            .collect();
        sparse.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WeightMatrix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Vec<f64>>::deserialize(deserializer)?;
        Self::from_named_rows(raw.iter().map(|(k, v)| (k.as_str(), v.as_slice())))
            .map_err(serde::de::Error::custom)
    }
}
