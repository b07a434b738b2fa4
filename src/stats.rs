//! Statistical support functions for the chi-squared combiner.
//!
//! - [`chi_squared_upper_tail`]: `P(X >= x2)` for even degrees of freedom
//! - [`gaussian_density`] / [`gaussian_cdf`]: the unit normal
//! - [`inverse_gaussian_upper_tail`] / [`inverse_gaussian_cdf`]: approximate
//!   inverses, for deriving cutoffs from a target error rate
//!
//! All functions are pure.

use std::f64::consts::PI;

use crate::error::StatsError;

/// Result type for statistics functions.
pub type StatsResult<T> = std::result::Result<T, StatsError>;

/// Beyond this |z| the unit normal tail is zero at f64 precision.
const GAUSSIAN_SATURATION: f64 = 8.3;

/// Probability that a chi-squared variable with `dof` degrees of freedom is
/// at least `x2`.
///
/// For even `dof = 2k` the tail is `exp(-m) * sum_{i<k} m^i / i!` with
/// `m = x2 / 2`; terms are built incrementally from the previous one. The
/// sum is clamped to 1.0 since accumulated rounding can overshoot by a few
/// ULP when `x2` is small and `dof` large.
pub fn chi_squared_upper_tail(x2: f64, dof: u32) -> StatsResult<f64> {
    if dof % 2 != 0 {
        return Err(StatsError::OddDegreesOfFreedom { dof });
    }
    if x2.is_nan() {
        return Err(StatsError::NotANumber);
    }
    if x2 <= 0.0 {
        return Ok(1.0);
    }
    if x2.is_infinite() {
        return Ok(0.0);
    }

    let m = x2 / 2.0;
    let mut term = (-m).exp();
    let mut sum = term;
    for i in 1..dof / 2 {
        term *= m / f64::from(i);
        sum += term;
    }
    Ok(sum.min(1.0))
}

/// Density of the unit Gaussian at `z`.
pub fn gaussian_density(z: f64) -> f64 {
    (-z * z / 2.0).exp() / (2.0 * PI).sqrt()
}

/// Area under the unit Gaussian from -inf to `z`.
///
/// Accurate in a fixed-point sense: for `z <= -8.3` this returns 0.0 because
/// the mirrored tail is indistinguishable from 1.0.
pub fn gaussian_cdf(z: f64) -> f64 {
    let a = z.abs();
    let half_area = if a >= GAUSSIAN_SATURATION {
        0.5
    } else {
        // Series for the area from 0 to a; stop once adding a term no
        // longer changes the sum.
        let z2 = a * a;
        let mut term = a * gaussian_density(a);
        let mut next = term;
        let mut sum = 0.0;
        let mut i = 1.0;
        while sum != next {
            sum = next;
            i += 2.0;
            term *= z2 / i;
            next += term;
        }
        sum
    };

    if z >= 0.0 {
        0.5 + half_area
    } else {
        0.5 - half_area
    }
}

/// `z` such that the area under the unit Gaussian from `z` to +inf is `p`.
///
/// Low-accuracy rational approximation (Abramowitz & Stegun 26.2.22), absolute
/// error at most 3e-3.
pub fn inverse_gaussian_upper_tail(p: f64) -> StatsResult<f64> {
    check_probability(p)?;

    let (p, flipped) = if p > 0.5 { (1.0 - p, true) } else { (p, false) };
    let z = if p == 0.0 {
        GAUSSIAN_SATURATION
    } else {
        let t = (-2.0 * p.ln()).sqrt();
        t - (2.30753 + 0.27061 * t) / (1.0 + 0.99229 * t + 0.04481 * t * t)
    };
    Ok(if flipped { -z } else { z })
}

/// `z` such that the area under the unit Gaussian from -inf to `z` is `p`.
///
/// One Newton step on top of [`inverse_gaussian_upper_tail`] roughly doubles
/// the number of correct digits.
pub fn inverse_gaussian_cdf(p: f64) -> StatsResult<f64> {
    check_probability(p)?;
    let z = inverse_gaussian_upper_tail(1.0 - p)?;
    Ok(z + (p - gaussian_cdf(z)) / gaussian_density(z))
}

fn check_probability(p: f64) -> StatsResult<()> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(StatsError::ProbabilityOutOfRange { p })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chi2_zero_statistic_is_certain() {
        for dof in (0..=400).step_by(2) {
            assert_eq!(chi_squared_upper_tail(0.0, dof).unwrap(), 1.0, "dof={dof}");
        }
    }

    #[test]
    fn chi2_rejects_odd_dof() {
        let err = chi_squared_upper_tail(1.0, 3).unwrap_err();
        assert!(matches!(err, StatsError::OddDegreesOfFreedom { dof: 3 }));
    }

    #[test]
    fn chi2_rejects_nan() {
        assert!(matches!(
            chi_squared_upper_tail(f64::NAN, 2),
            Err(StatsError::NotANumber)
        ));
    }

    #[test]
    fn chi2_two_dof_is_exponential() {
        // With 2 degrees of freedom the tail is exactly exp(-x/2).
        for x in [0.5, 1.0, 3.0, 10.0] {
            let q = chi_squared_upper_tail(x, 2).unwrap();
            assert!((q - (-x / 2.0f64).exp()).abs() < 1e-15);
        }
    }

    #[test]
    fn chi2_known_values() {
        // Reference values from standard chi-squared tables.
        let q = chi_squared_upper_tail(9.488, 4).unwrap();
        assert!((q - 0.05).abs() < 1e-4, "q={q}");
        let q = chi_squared_upper_tail(18.307, 10).unwrap();
        assert!((q - 0.05).abs() < 1e-4, "q={q}");
    }

    #[test]
    fn chi2_is_non_increasing() {
        for dof in [2, 4, 10, 50, 300] {
            let mut prev = 1.0;
            for step in 0..2000 {
                let x = f64::from(step) * 0.25;
                let q = chi_squared_upper_tail(x, dof).unwrap();
                // Allow a few ULP of rounding noise near 1.0.
                assert!(q <= prev + 1e-12, "dof={dof} x={x}: {q} > {prev}");
                prev = q;
            }
        }
    }

    #[test]
    fn chi2_never_exceeds_one() {
        assert!(chi_squared_upper_tail(100.0, 300).unwrap() <= 1.0);
        assert!(chi_squared_upper_tail(1e-9, 1000).unwrap() <= 1.0);
    }

    #[test]
    fn chi2_extremes() {
        assert_eq!(chi_squared_upper_tail(f64::INFINITY, 4).unwrap(), 0.0);
        assert_eq!(chi_squared_upper_tail(-1.0, 4).unwrap(), 1.0);
        assert_eq!(chi_squared_upper_tail(1e6, 4).unwrap(), 0.0);
    }

    #[test]
    fn gaussian_density_peak() {
        assert!((gaussian_density(0.0) - 0.398_942_280_401_432_7).abs() < 1e-15);
        assert_eq!(gaussian_density(1.5), gaussian_density(-1.5));
    }

    #[test]
    fn gaussian_cdf_known_values() {
        assert_eq!(gaussian_cdf(0.0), 0.5);
        assert!((gaussian_cdf(1.0) - 0.841_344_746_068_543).abs() < 1e-12);
        assert!((gaussian_cdf(-1.96) - 0.024_997_895_148_220).abs() < 1e-12);
        assert_eq!(gaussian_cdf(9.0), 1.0);
        assert_eq!(gaussian_cdf(-9.0), 0.0);
    }

    #[test]
    fn gaussian_cdf_is_symmetric() {
        for z in [0.1, 0.7, 2.5, 5.0] {
            assert!((gaussian_cdf(z) + gaussian_cdf(-z) - 1.0).abs() < 1e-14);
        }
    }

    #[test]
    fn inverse_upper_tail_is_coarse_inverse() {
        for p in [0.001, 0.05, 0.3, 0.5, 0.8, 0.99] {
            let z = inverse_gaussian_upper_tail(p).unwrap();
            let back = 1.0 - gaussian_cdf(z);
            assert!((back - p).abs() < 3e-3, "p={p} back={back}");
        }
    }

    #[test]
    fn inverse_cdf_refines_to_inverse() {
        for p in [0.01, 0.1, 0.25, 0.5, 0.75, 0.9, 0.99] {
            let z = inverse_gaussian_cdf(p).unwrap();
            assert!((gaussian_cdf(z) - p).abs() < 1e-4, "p={p} z={z}");
        }
        assert!((inverse_gaussian_cdf(0.975).unwrap() - 1.959_964).abs() < 1e-3);
    }

    #[test]
    fn inverse_saturates_at_bounds() {
        assert_eq!(inverse_gaussian_upper_tail(0.0).unwrap(), 8.3);
        assert_eq!(inverse_gaussian_upper_tail(1.0).unwrap(), -8.3);
        assert!(inverse_gaussian_cdf(0.0).unwrap() < -8.0);
        assert!(inverse_gaussian_cdf(1.0).unwrap() > 8.0);
    }

    #[test]
    fn inverse_rejects_out_of_range() {
        for p in [-0.1, 1.5, f64::NAN] {
            assert!(matches!(
                inverse_gaussian_cdf(p),
                Err(StatsError::ProbabilityOutOfRange { .. })
            ));
            assert!(inverse_gaussian_upper_tail(p).is_err());
        }
    }
}
