//! Miscellaneous utility structs and functions.

use std::fmt::Debug;

/// An interval on the real number line.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: std::cmp::PartialOrd> Interval<T> {
    /// Returns true if this interval contains the value.
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Interval<f64> {
    /// Returns the centre/mid-point of the interval.
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.min + self.max)
    }

    pub fn lerp(&self, t: f64) -> f64 {
        self.min + t * (self.max - self.min)
    }

    pub fn inv_lerp(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({:?}, {:?})", &self.min, &self.max)
    }
}

/// Iterates over `0..count`, starting at `start` and wrapping around.
pub fn rotated_range(count: usize, start: usize) -> impl Iterator<Item = usize> {
    (0..count)
        .map(move |i| i + start)
        .map(move |i| if i >= count { i - count } else { i })
}

/// Linearly interpolates a piecewise-linear function given by `(x, y)` points
/// sorted by `x`. Values outside the points are held constant.
pub fn interpolate(points: &[(f64, f64)], x: f64) -> Option<f64> {
    let (first, last) = (points.first()?, points.last()?);
    if x <= first.0 {
        return Some(first.1);
    }
    if x >= last.0 {
        return Some(last.1);
    }
    let idx = points.partition_point(|(px, _)| *px <= x);
    let (x0, y0) = points[idx - 1];
    let (x1, y1) = points[idx];
    if x1 <= x0 {
        return Some(y1);
    }
    Some(Interval::new(y0, y1).lerp(Interval::new(x0, x1).inv_lerp(x)))
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn rotated_range_wraps() {
        let order: Vec<_> = rotated_range(4, 2).collect();
        assert_eq!(order, vec![2, 3, 0, 1]);
    }

    #[test]
    fn interpolate_piecewise() {
        let points = [(0.0, 1.0), (100.0, 0.5), (200.0, 0.5)];
        assert_eq!(interpolate(&[], 5.0), None);
        assert_approx_eq!(interpolate(&points, -10.0).unwrap(), 1.0);
        assert_approx_eq!(interpolate(&points, 50.0).unwrap(), 0.75);
        assert_approx_eq!(interpolate(&points, 150.0).unwrap(), 0.5);
        assert_approx_eq!(interpolate(&points, 500.0).unwrap(), 0.5);
    }

    #[test]
    fn interval_contains() {
        let zone = Interval::new(10.0, 20.0);
        assert!(zone.contains(10.0));
        assert!(!zone.contains(20.5));
        assert_approx_eq!(zone.midpoint(), 15.0);
    }
}
