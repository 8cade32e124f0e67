//! Sample rate factor/multiplier encoding.
//!
//! The fixed header stores the nominal rate as two signed 16-bit values.
//! A positive factor is samples per second and a negative factor is
//! seconds per sample; the multiplier then scales (positive) or divides
//! (negative) the factor.

use crate::{MseedError, Result};

/// Largest rate, numerator and denominator representable in the header.
pub const MAX_FACTOR: i32 = i16::MAX as i32;

/// Relative difference below which two rates are considered equal.
pub const RATE_TOLERANCE: f64 = 0.0001;

/// Nominal sample rate in Hz from the header factor and multiplier.
pub fn nominal_rate(factor: i16, multiplier: i16) -> f64 {
    let f = f64::from(factor);
    let m = f64::from(multiplier);
    let mut rate = match factor {
        f_ if f_ > 0 => f,
        f_ if f_ < 0 => -1.0 / f,
        _ => 0.0,
    };
    if multiplier > 0 {
        rate *= m;
    } else if multiplier < 0 {
        rate = -(rate / m);
    }
    rate
}

/// Encode a rate in Hz as `(factor, multiplier)`.
///
/// Integral rates map to `(rate, 1)`. Other rates are approximated by a
/// rational `num/den` and returned as `(num, -den)`.
pub fn factor_multiplier(rate: f64) -> Result<(i16, i16)> {
    if !rate.is_finite() || rate < 0.0 || rate > f64::from(MAX_FACTOR) {
        return Err(MseedError::SampleRate(rate));
    }

    if rate - rate.trunc() < 0.000_001 {
        let factor = rate as i16;
        let multiplier = if factor != 0 { 1 } else { 0 };
        return Ok((factor, multiplier));
    }

    let (num, den, _) = rational_approx(rate, MAX_FACTOR, 1e-12);
    let factor = i16::try_from(num).map_err(|_| MseedError::SampleRate(rate))?;
    let multiplier = i16::try_from(-den).map_err(|_| MseedError::SampleRate(rate))?;
    Ok((factor, multiplier))
}

/// Continued fraction approximation of `real` as `num / den` with both
/// terms below `max_value`, stopping once within `precision`.
///
/// Returns `(num, den, iterations)`; the sign is carried on `num`.
pub fn rational_approx(real: f64, max_value: i32, precision: f64) -> (i32, i32, u32) {
    let positive = real >= 0.0;
    let target = real.abs();
    let max_value = i64::from(max_value);

    let mut realj = target;
    let mut bj = (realj + precision) as i64;
    realj = 1.0 / (realj - bj as f64);

    let (mut aj, mut aj1) = (bj, 1i64);
    let (mut bj_den, mut bj1) = (1i64, 0i64);
    let (mut pnum, mut pden) = (aj, bj_den);
    let (mut num, mut den) = (aj, bj_den);
    let mut iterations = 1;

    while (target - aj as f64 / bj_den as f64).abs() > precision
        && aj < max_value
        && bj_den < max_value
    {
        let aj2 = aj1;
        aj1 = aj;
        let bj2 = bj1;
        bj1 = bj_den;

        bj = (realj + precision) as i64;
        realj = 1.0 / (realj - bj as f64);
        aj = bj.saturating_mul(aj1).saturating_add(aj2);
        bj_den = bj.saturating_mul(bj1).saturating_add(bj2);

        num = pnum;
        den = pden;
        pnum = aj;
        pden = bj_den;
        iterations += 1;
    }

    if pnum < max_value && pden < max_value {
        num = pnum;
        den = pden;
    }

    let num = num as i32;
    (if positive { num } else { -num }, den as i32, iterations)
}

/// True when `a` and `b` differ by less than [`RATE_TOLERANCE`] relative
/// to `b`.
pub fn is_rate_tolerable(a: f64, b: f64) -> bool {
    (1.0 - a / b).abs() < RATE_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nominal_rate_cases() {
        assert_eq!(nominal_rate(20, 1), 20.0);
        assert_eq!(nominal_rate(40, 0), 40.0);
        assert_eq!(nominal_rate(-10, 1), 0.1);
        assert_eq!(nominal_rate(1, -10), 0.1);
        assert_eq!(nominal_rate(-60, -1), 1.0 / 60.0);
        assert_eq!(nominal_rate(0, 0), 0.0);
        assert_eq!(nominal_rate(2, 50), 100.0);
    }

    #[test]
    fn test_factor_multiplier_integral() {
        assert_eq!(factor_multiplier(100.0).unwrap(), (100, 1));
        assert_eq!(factor_multiplier(1.0).unwrap(), (1, 1));
        assert_eq!(factor_multiplier(0.0).unwrap(), (0, 0));
        assert_eq!(factor_multiplier(32767.0).unwrap(), (32767, 1));
    }

    #[test]
    fn test_factor_multiplier_fractional() {
        for rate in [0.1, 0.5, 0.025, 2.5, 1.0 / 3.0, 0.016_666_666_666_666_666] {
            let (f, m) = factor_multiplier(rate).unwrap();
            assert!(m < 0, "rate {rate} should use a dividing multiplier");
            let back = nominal_rate(f, m);
            assert!(
                (back - rate).abs() / rate < 1e-6,
                "rate {rate} -> ({f}, {m}) -> {back}"
            );
        }
        assert_eq!(factor_multiplier(0.1).unwrap(), (1, -10));
        assert_eq!(factor_multiplier(2.5).unwrap(), (5, -2));
    }

    #[test]
    fn test_factor_multiplier_rejects_out_of_range() {
        assert!(factor_multiplier(-1.0).is_err());
        assert!(factor_multiplier(32768.0).is_err());
        assert!(factor_multiplier(f64::NAN).is_err());
    }

    #[test]
    fn test_rational_approx_pi() {
        let (num, den, _) = rational_approx(std::f64::consts::PI, 1000, 1e-12);
        assert_eq!((num, den), (355, 113));
        let (num, den, _) = rational_approx(-0.75, 100, 1e-12);
        assert_eq!((num, den), (-3, 4));
    }

    #[test]
    fn test_rate_tolerance() {
        assert!(is_rate_tolerable(100.0, 100.005));
        assert!(!is_rate_tolerable(100.0, 100.02));
        assert!(!is_rate_tolerable(1.0, 0.0));
    }
}
