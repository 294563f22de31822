//! Random axis-aligned cut selection.

use rand::Rng;

use crate::bounding_box::BoundingBox;

#[derive(Debug, Clone, Copy)]
pub struct Cut {
    pub dimension: usize,
    pub value: f32,
}

impl Cut {
    pub fn new(dimension: usize, value: f32) -> Self {
        Cut { dimension, value }
    }

    /// Choose a cut uniformly at random in the non-overlapping slab of
    /// `merged_box = bounding_box ∪ {point}`, given a uniform draw
    /// `factor ∈ [0,1)`. Returns the chosen cut and whether it actually
    /// separates `point` from `bounding_box` (i.e. whether this is a valid
    /// place to insert a new internal node).
    pub fn random_cut_and_separation(
        bounding_box: &BoundingBox,
        factor: f64,
        point: &[f32],
    ) -> (Cut, bool) {
        let min_values = bounding_box.min_values();
        let max_values = bounding_box.max_values();

        let mut range: f64 = min_values
            .iter()
            .zip(max_values)
            .zip(point)
            .map(|((&lo, &hi), &p)| {
                if p < lo {
                    (lo - p) as f64
                } else if p > hi {
                    (p - hi) as f64
                } else {
                    0.0
                }
            })
            .sum();
        if range == 0.0 {
            return (Cut::new(usize::MAX, 0.0), false);
        }
        range += bounding_box.range_sum();
        range *= factor;

        let mut dim = 0usize;
        let mut new_cut = f32::MAX;
        while dim < point.len() {
            let lo = point[dim].min(min_values[dim]);
            let hi = point[dim].max(max_values[dim]);
            let gap = (hi - lo) as f64;
            if gap > range || (gap == range && dim == point.len() - 1) {
                new_cut = lo + range as f32;
                if new_cut <= lo || new_cut >= hi {
                    new_cut = lo;
                }
                break;
            }
            range -= gap;
            dim += 1;
        }

        let lo = min_values[dim];
        let hi = max_values[dim];
        let separates =
            (point[dim] <= new_cut && new_cut < lo) || (hi <= new_cut && new_cut < point[dim]);
        (Cut::new(dim, new_cut), separates)
    }

    pub fn is_left(&self, point: &[f32]) -> bool {
        point[self.dimension] <= self.value
    }

    pub fn draw_factor(rng: &mut impl Rng) -> f64 {
        rng.gen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_inside_box_never_separates() {
        let b = BoundingBox::new(vec![0.0, 0.0], vec![10.0, 10.0]).unwrap();
        let (_, separated) = Cut::random_cut_and_separation(&b, 0.5, &[5.0, 5.0]);
        assert!(!separated);
    }

    #[test]
    fn point_far_outside_can_separate() {
        let b = BoundingBox::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let mut any_separated = false;
        for i in 0..50 {
            let factor = (i as f64 + 0.5) / 50.0;
            let (_, separated) = Cut::random_cut_and_separation(&b, factor, &[100.0, 0.5]);
            any_separated |= separated;
        }
        assert!(any_separated);
    }
}
