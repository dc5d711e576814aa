//! # Tensor Axes, Tensors and Count Vectors
//!
//! The 5D derived feature space (Energy, Order, Matter, Stress, Relation)
//! and the fixed-size count vector it is projected from.
//!
//! Tensors are never persisted standalone; they are recomputed on demand from
//! a record's [`CountVector`] and a pattern's weight matrix.

use std::fmt;
use std::ops::{Add, Index, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::category::TenGod;
use crate::error::PcalError;

/// Number of tensor axes. Fixed.
pub const AXES: usize = 5;

// ---------------------------------------------------------------------------
// Axis
// ---------------------------------------------------------------------------

/// A tensor axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    /// Energy.
    #[serde(rename = "E", alias = "energy")]
    E,
    /// Order.
    #[serde(rename = "O", alias = "order")]
    O,
    /// Matter.
    #[serde(rename = "M", alias = "matter")]
    M,
    /// Stress.
    #[serde(rename = "S", alias = "stress")]
    S,
    /// Relation.
    #[serde(rename = "R", alias = "relation")]
    R,
}

impl Axis {
    /// All axes in column order.
    pub fn all() -> &'static [Axis; AXES] {
        &[Self::E, Self::O, Self::M, Self::S, Self::R]
    }

    /// Column index of this axis.
    pub fn index(self) -> usize {
        match self {
            Self::E => 0,
            Self::O => 1,
            Self::M => 2,
            Self::S => 3,
            Self::R => 4,
        }
    }

    /// Single-letter name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E => "E",
            Self::O => "O",
            Self::M => "M",
            Self::S => "S",
            Self::R => "R",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = PcalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "e" | "energy" => Ok(Self::E),
            "o" | "order" => Ok(Self::O),
            "m" | "matter" => Ok(Self::M),
            "s" | "stress" => Ok(Self::S),
            "r" | "relation" => Ok(Self::R),
            _ => Err(PcalError::UnknownAxis(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tensor
// ---------------------------------------------------------------------------

/// A point in the 5D feature space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tensor(pub [f64; AXES]);

impl Tensor {
    /// The origin.
    pub const ZERO: Tensor = Tensor([0.0; AXES]);

    /// Component along `axis`.
    pub fn get(&self, axis: Axis) -> f64 {
        self.0[axis.index()]
    }

    /// Raw components in axis order.
    pub fn as_array(&self) -> &[f64; AXES] {
        &self.0
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        self.0.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Component-wise scaling.
    pub fn scale(&self, k: f64) -> Tensor {
        let mut out = self.0;
        for v in &mut out {
            *v *= k;
        }
        Tensor(out)
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl Index<Axis> for Tensor {
    type Output = f64;

    fn index(&self, axis: Axis) -> &f64 {
        &self.0[axis.index()]
    }
}

impl Add for Tensor {
    type Output = Tensor;

    fn add(self, rhs: Tensor) -> Tensor {
        let mut out = self.0;
        for (o, r) in out.iter_mut().zip(rhs.0) {
            *o += r;
        }
        Tensor(out)
    }
}

impl Sub for Tensor {
    type Output = Tensor;

    fn sub(self, rhs: Tensor) -> Tensor {
        let mut out = self.0;
        for (o, r) in out.iter_mut().zip(rhs.0) {
            *o -= r;
        }
        Tensor(out)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [e, o, m, s, r] = self.0;
        write!(f, "(E={e:.4}, O={o:.4}, M={m:.4}, S={s:.4}, R={r:.4})")
    }
}

// ---------------------------------------------------------------------------
// CountVector
// ---------------------------------------------------------------------------

/// Non-negative ten-god counts in [`TenGod::index`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct CountVector([u32; TenGod::COUNT]);

impl CountVector {
    /// Build from raw counts in canonical order.
    pub fn new(counts: [u32; TenGod::COUNT]) -> Self {
        Self(counts)
    }

    /// Build from `(category, count)` pairs; unlisted categories are zero.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (TenGod, u32)>,
    {
        let mut counts = [0u32; TenGod::COUNT];
        for (god, n) in pairs {
            counts[god.index()] = n;
        }
        Self(counts)
    }

    /// Count for one category.
    pub fn get(&self, god: TenGod) -> u32 {
        self.0[god.index()]
    }

    /// Raw counts in canonical order.
    pub fn as_array(&self) -> &[u32; TenGod::COUNT] {
        &self.0
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.0.iter().map(|&n| u64::from(n)).sum()
    }

    /// Iterate `(category, count)` in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (TenGod, u32)> + '_ {
        TenGod::all().iter().map(move |&g| (g, self.get(g)))
    }
}

impl Add for CountVector {
    type Output = CountVector;

    fn add(self, rhs: CountVector) -> CountVector {
        let mut out = self.0;
        for (o, r) in out.iter_mut().zip(rhs.0) {
            *o = o.saturating_add(r);
        }
        CountVector(out)
    }
}
