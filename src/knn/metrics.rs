//! Distance kernels over equal-length vectors, all promoting to `f64`
//! Stateless free functions: no process-wide math handle is kept, so
//! callers are free to run these concurrently from any number of worker
//! threads without coordination.

use crate::error::{DbError, Result};

const MEAN_EARTH_RADIUS_METERS: f64 = 6_371_000.0;

fn check_len(a: &[f64], b: &[f64]) -> Result<()> {
    if a.len() != b.len() {
        return Err(DbError::VectorSizeMismatch { expected: a.len(), found: b.len() });
    }
    Ok(())
}

/// Manhattan distance: `sum(|a_i - b_i|)`.
pub fn l1(a: &[f64], b: &[f64]) -> Result<f64> {
    check_len(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum())
}

/// Euclidean distance: `sqrt(sum(d_i^2))`.
pub fn l2(a: &[f64], b: &[f64]) -> Result<f64> {
    check_len(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt())
}

/// Minkowski distance for integer `p`: `sum(d_i^p)^(1/p)`.
pub fn lp(a: &[f64], b: &[f64], p: i32) -> Result<f64> {
    check_len(a, b)?;
    if p < 1 {
        return Err(DbError::UnsupportedPredicate(format!("Lp metric requires p >= 1, got {p}")));
    }
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y).abs().powi(p)).sum();
    Ok(sum.powf(1.0 / p as f64))
}

/// Cosine distance: `1 - (a . b) / (|a| * |b|)`.
pub fn cosine(a: &[f64], b: &[f64]) -> Result<f64> {
    check_len(a, b)?;
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(1.0);
    }
    Ok(1.0 - dot / (norm_a * norm_b))
}

/// Absolute inner product distance: `-|a . b|`, so smaller is "closer"
/// (largest magnitude dot product wins).
pub fn absolute_inner_product(a: &[f64], b: &[f64]) -> Result<f64> {
    check_len(a, b)?;
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    Ok(-dot.abs())
}

/// Great-circle distance in meters. `a[0]`/`b[0]` are latitude, `a[1]`/`b[1]`
/// longitude, both in degrees; requires logical size 2.
pub fn haversine(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != 2 || b.len() != 2 {
        return Err(DbError::VectorSizeMismatch { expected: 2, found: a.len().max(b.len()) });
    }
    let (lat1, lon1) = (a[0].to_radians(), a[1].to_radians());
    let (lat2, lon2) = (b[0].to_radians(), b[1].to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();
    Ok(MEAN_EARTH_RADIUS_METERS * c)
}

/// Hamming distance between equal-length bit vectors: count of differing
/// positions.
pub fn hamming(a: &[bool], b: &[bool]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(DbError::VectorSizeMismatch { expected: a.len(), found: b.len() });
    }
    Ok(a.iter().zip(b).filter(|(x, y)| x != y).count() as f64)
}

/// The distance metric a kNN scan uses, plus its nominal per-component cost
/// for planner cost estimates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    L1,
    L2,
    Lp(i32),
    Cosine,
    AbsoluteInnerProduct,
    Haversine,
    Hamming,
}

impl Metric {
    /// Nominal floating-point ops per vector component, used by a planner's
    /// cost model; not an exact instruction count.
    pub fn nominal_cost_per_component(&self) -> f64 {
        match self {
            Metric::L1 => 2.0,
            Metric::L2 => 3.0,
            Metric::Lp(_) => 4.0,
            Metric::Cosine => 4.0,
            Metric::AbsoluteInnerProduct => 2.0,
            Metric::Haversine => 8.0,
            Metric::Hamming => 1.0,
        }
    }

    pub fn distance(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        match self {
            Metric::L1 => l1(a, b),
            Metric::L2 => l2(a, b),
            Metric::Lp(p) => lp(a, b, *p),
            Metric::Cosine => cosine(a, b),
            Metric::AbsoluteInnerProduct => absolute_inner_product(a, b),
            Metric::Haversine => haversine(a, b),
            Metric::Hamming => Err(DbError::UnsupportedPredicate(
                "hamming distance requires bit vectors; use Metric::distance_bits".to_string(),
            )),
        }
    }

    pub fn distance_bits(&self, a: &[bool], b: &[bool]) -> Result<f64> {
        match self {
            Metric::Hamming => hamming(a, b),
            _ => Err(DbError::UnsupportedPredicate(
                "only the hamming metric operates on bit vectors".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_matches_known_value() {
        assert_eq!(l2(&[0.0, 0.0], &[3.0, 4.0]).unwrap(), 5.0);
    }

    #[test]
    fn l1_sums_absolute_differences() {
        assert_eq!(l1(&[1.0, 2.0], &[4.0, 0.0]).unwrap(), 5.0);
    }

    #[test]
    fn lp_with_p_two_matches_l2() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 0.0, -1.0];
        assert!((lp(&a, &b, 2).unwrap() - l2(&a, &b).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn cosine_of_identical_vectors_is_zero() {
        let v = [1.0, 2.0, 3.0];
        assert!(cosine(&v, &v).unwrap().abs() < 1e-12);
    }

    #[test]
    fn haversine_same_point_is_zero() {
        assert!(haversine(&[51.5, -0.1], &[51.5, -0.1]).unwrap() < 1e-6);
    }

    #[test]
    fn hamming_counts_differing_bits() {
        let a = [true, false, true, true];
        let b = [true, true, true, false];
        assert_eq!(hamming(&a, &b).unwrap(), 2.0);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(l2(&[1.0], &[1.0, 2.0]).is_err());
    }
}
