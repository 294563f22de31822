//! Axis-aligned bounding box with cached range sum.
//!
//! Arithmetic for range sums is f64 even though points are stored as f32,
//! since range sums can accumulate across high dimension counts.

use crate::errors::{check_config, Result};

#[derive(Clone, Debug)]
pub struct BoundingBox {
    min_values: Vec<f32>,
    max_values: Vec<f32>,
    range_sum: f64,
}

impl BoundingBox {
    pub fn new(min_values: Vec<f32>, max_values: Vec<f32>) -> Result<Self> {
        check_config(min_values.len() == max_values.len(), "mismatched lengths")?;
        let range_sum = min_values
            .iter()
            .zip(&max_values)
            .map(|(&lo, &hi)| (hi - lo) as f64)
            .sum();
        Ok(BoundingBox {
            min_values,
            max_values,
            range_sum,
        })
    }

    /// The bounding box of a single point.
    pub fn of_point(point: &[f32]) -> Self {
        BoundingBox {
            min_values: point.to_vec(),
            max_values: point.to_vec(),
            range_sum: 0.0,
        }
    }

    pub fn min_values(&self) -> &[f32] {
        &self.min_values
    }

    pub fn max_values(&self) -> &[f32] {
        &self.max_values
    }

    pub fn range_sum(&self) -> f64 {
        self.range_sum
    }

    pub fn contains(&self, point: &[f32]) -> bool {
        self.min_values
            .iter()
            .zip(&self.max_values)
            .zip(point)
            .all(|((&lo, &hi), &p)| lo <= p && p <= hi)
    }

    /// Union of `self` with `other`, as a new box (boxes are immutable
    /// under union).
    pub fn merge(&self, other: &BoundingBox) -> BoundingBox {
        let min_values: Vec<f32> = self
            .min_values
            .iter()
            .zip(&other.min_values)
            .map(|(&a, &b)| a.min(b))
            .collect();
        let max_values: Vec<f32> = self
            .max_values
            .iter()
            .zip(&other.max_values)
            .map(|(&a, &b)| a.max(b))
            .collect();
        let range_sum = min_values
            .iter()
            .zip(&max_values)
            .map(|(&lo, &hi)| (hi - lo) as f64)
            .sum();
        BoundingBox {
            min_values,
            max_values,
            range_sum,
        }
    }

    /// Union of `self` with the box of a single point.
    pub fn merge_point(&self, point: &[f32]) -> BoundingBox {
        let min_values: Vec<f32> = self
            .min_values
            .iter()
            .zip(point)
            .map(|(&a, &b)| a.min(b))
            .collect();
        let max_values: Vec<f32> = self
            .max_values
            .iter()
            .zip(point)
            .map(|(&a, &b)| a.max(b))
            .collect();
        let range_sum = min_values
            .iter()
            .zip(&max_values)
            .map(|(&lo, &hi)| (hi - lo) as f64)
            .sum();
        BoundingBox {
            min_values,
            max_values,
            range_sum,
        }
    }

    /// Probability that a random cut separates `point` from this box,
    /// used by score visitors walking the ancestor chain.
    pub fn probability_of_cut(&self, point: &[f32]) -> f64 {
        self.probability_of_cut_with_missing(point, None)
    }

    pub fn probability_of_cut_with_missing(
        &self,
        point: &[f32],
        missing: Option<&[bool]>,
    ) -> f64 {
        let mut outside = 0.0f64;
        for i in 0..point.len() {
            if let Some(m) = missing {
                if m[i] {
                    continue;
                }
            }
            if self.min_values[i] - point[i] > 0.0 {
                outside += (self.min_values[i] - point[i]) as f64;
            } else if point[i] - self.max_values[i] > 0.0 {
                outside += (point[i] - self.max_values[i]) as f64;
            }
        }
        if outside == 0.0 {
            0.0
        } else if self.range_sum == 0.0 {
            1.0
        } else {
            outside / (self.range_sum + outside)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_grows_to_cover_both() {
        let a = BoundingBox::of_point(&[0.0, 0.0]);
        let b = BoundingBox::of_point(&[1.0, 2.0]);
        let merged = a.merge(&b);
        assert_eq!(merged.min_values(), &[0.0, 0.0]);
        assert_eq!(merged.max_values(), &[1.0, 2.0]);
        assert_eq!(merged.range_sum(), 3.0);
    }

    #[test]
    fn probability_of_cut_zero_when_inside() {
        let b = BoundingBox::new(vec![0.0, 0.0], vec![10.0, 10.0]).unwrap();
        assert_eq!(b.probability_of_cut(&[5.0, 5.0]), 0.0);
        assert!(b.probability_of_cut(&[20.0, 5.0]) > 0.0);
    }
}
