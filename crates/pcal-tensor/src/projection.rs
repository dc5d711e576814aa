//! # Tensor Projection
//!
//! `Tensor = Wᵀ · counts`. Pure and allocation-free.

use pcal_core::{CountVector, Record, Tensor, AXES};

use crate::weights::WeightMatrix;

/// Project a count vector into the 5D feature space.
pub fn project(counts: &CountVector, weights: &WeightMatrix) -> Tensor {
    let mut out = [0.0; AXES];
    for (n, row) in counts.as_array().iter().zip(weights.rows()) {
        if *n == 0 {
            continue;
        }
        let n = f64::from(*n);
        for (o, w) in out.iter_mut().zip(row) {
            *o += n * w;
        }
    }
    Tensor(out)
}

/// Project a record's counts.
pub fn project_record(record: &Record, weights: &WeightMatrix) -> Tensor {
    project(record.counts(), weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcal_core::{Axis, TenGod};

    #[test]
    fn projects_weighted_sum() {
        let w = WeightMatrix::zeros()
            .with_row(TenGod::ZhengGuan, [1.0, 0.5, 0.0, 0.0, 0.0])
            .with_row(TenGod::QiSha, [0.0, 0.0, 0.0, 2.0, -1.0]);
        let counts = CountVector::from_pairs([(TenGod::ZhengGuan, 2), (TenGod::QiSha, 3)]);
        let t = project(&counts, &w);
        assert_eq!(t.get(Axis::E), 2.0);
        assert_eq!(t.get(Axis::O), 1.0);
        assert_eq!(t.get(Axis::S), 6.0);
        assert_eq!(t.get(Axis::R), -3.0);
        assert_eq!(t.get(Axis::M), 0.0);
    }

    #[test]
    fn zero_counts_project_to_origin() {
        let w = WeightMatrix::zeros().with_row(TenGod::BiJian, [1.0; AXES]);
        assert_eq!(project(&CountVector::default(), &w), Tensor::ZERO);
    }
}
