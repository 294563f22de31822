//! Per-dimension directional attribution vector: a `(high, low)` pair of
//! length-D accumulators tracking how much a query's deviation above and
//! below the tree's structure is attributable to each coordinate.

use crate::bounding_box::BoundingBox;

#[derive(Clone, Debug)]
pub struct DiVector {
    pub high: Vec<f64>,
    pub low: Vec<f64>,
}

impl DiVector {
    pub fn empty(dimensions: usize) -> Self {
        DiVector {
            high: vec![0.0; dimensions],
            low: vec![0.0; dimensions],
        }
    }

    pub fn dimensions(&self) -> usize {
        self.high.len()
    }

    pub fn assign_as_probability_of_cut(&mut self, bounding_box: &BoundingBox, point: &[f32]) {
        let minsum: f64 = self
            .low
            .iter_mut()
            .zip(bounding_box.min_values())
            .zip(point)
            .map(|((x, &lo), &p)| {
                *x = if lo - p > 0.0 { (lo - p) as f64 } else { 0.0 };
                *x
            })
            .sum();
        let maxsum: f64 = self
            .high
            .iter_mut()
            .zip(point)
            .zip(bounding_box.max_values())
            .map(|((x, &p), &hi)| {
                *x = if p - hi > 0.0 { (p - hi) as f64 } else { 0.0 };
                *x
            })
            .sum();
        let sum = minsum + maxsum;
        if sum != 0.0 {
            self.scale(1.0 / (bounding_box.range_sum() + sum));
        }
    }

    pub fn add_to(&self, other: &mut DiVector) {
        for (x, &y) in other.high.iter_mut().zip(&self.high) {
            *x += y;
        }
        for (x, &y) in other.low.iter_mut().zip(&self.low) {
            *x += y;
        }
    }

    pub fn add_to_scaled(&self, other: &mut DiVector, factor: f64) {
        for (x, &y) in other.high.iter_mut().zip(&self.high) {
            *x += y * factor;
        }
        for (x, &y) in other.low.iter_mut().zip(&self.low) {
            *x += y * factor;
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for x in self.high.iter_mut() {
            *x *= factor;
        }
        for x in self.low.iter_mut() {
            *x *= factor;
        }
    }

    pub fn total(&self) -> f64 {
        self.high.iter().sum::<f64>() + self.low.iter().sum::<f64>()
    }

    /// Rescale so `total()` equals `value`, spreading evenly if currently
    /// all-zero.
    pub fn normalize(&mut self, value: f64) {
        let current = self.total();
        if current <= 0.0 {
            let v = value / (2.0 * self.high.len() as f64);
            self.high.iter_mut().for_each(|x| *x = v);
            self.low.iter_mut().for_each(|x| *x = v);
        } else {
            self.scale(value / current);
        }
    }

    pub fn high_low_sum(&self, index: usize) -> f64 {
        self.high[index] + self.low[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rescales_total() {
        let mut v = DiVector {
            high: vec![1.0, 0.0],
            low: vec![0.0, 1.0],
        };
        v.normalize(4.0);
        assert!((v.total() - 4.0).abs() < 1e-9);
    }
}
