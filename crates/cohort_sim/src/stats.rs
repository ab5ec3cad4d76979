//! Standard normal CDF and quantile, and helpers for run-level parameter sampling.

use rand::Rng;
use rand_distr::{Beta, Distribution, Gamma};

use crate::error::ConfigError;

/// Complementary error function, fractional error below 1.2e-7 everywhere.
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

const A: [f64; 6] = [
    -3.969_683_028_665_376e1,
    2.209_460_984_245_205e2,
    -2.759_285_104_469_687e2,
    1.383_577_518_672_69e2,
    -3.066_479_806_614_716e1,
    2.506_628_277_459_239,
];
const B: [f64; 5] = [
    -5.447_609_879_822_406e1,
    1.615_858_368_580_409e2,
    -1.556_989_798_598_866e2,
    6.680_131_188_771_972e1,
    -1.328_068_155_288_572e1,
];
const C: [f64; 6] = [
    -7.784_894_002_430_293e-3,
    -3.223_964_580_411_365e-1,
    -2.400_758_277_161_838,
    -2.549_732_539_343_734,
    4.374_664_141_464_968,
    2.938_163_982_698_783,
];
const D: [f64; 4] = [
    7.784_695_709_041_462e-3,
    3.224_671_290_700_398e-1,
    2.445_134_137_142_996,
    3.754_408_661_907_416,
];
const P_LOW: f64 = 0.024_25;

/// Inverse of the standard normal CDF (Acklam's rational approximation).
/// Returns -inf at 0 and +inf at 1.
pub fn probit(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };
    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

/// Quantile `u` of a normal(mean, sd) truncated to `[lower, upper]`.
pub fn truncated_normal_quantile(mean: f64, sd: f64, lower: f64, upper: f64, u: f64) -> f64 {
    if sd <= 0.0 {
        return mean.clamp(lower, upper);
    }
    let lo = normal_cdf((lower - mean) / sd);
    let hi = normal_cdf((upper - mean) / sd);
    let x = mean + sd * probit(lo + u * (hi - lo));
    x.clamp(lower, upper)
}

/// Standard deviation implied by a 95% confidence interval.
pub fn confidence_interval_sd(lower: f64, upper: f64) -> f64 {
    (upper - lower) / (2.0 * 1.96)
}

/// Empirical percentile of each value: its average rank (1-based, ties share the mean rank)
/// divided by the number of values. Results lie in (0, 1].
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // Ranks start..end (0-based) share their mean, 1-based.
        let rank = (start + end + 1) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank / n as f64;
        }
        start = end;
    }
    ranks
}

/// Draws from a beta distribution parameterized by its mean and variance.
pub fn sample_beta<R: Rng + ?Sized>(
    rng: &mut R,
    mean: f64,
    variance: f64,
) -> Result<f64, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidParameter {
        name: "beta distribution",
        reason,
    };
    if !(0.0 < mean && mean < 1.0) || variance <= 0.0 || variance >= mean * (1.0 - mean) {
        return Err(invalid(format!("mean {mean}, variance {variance}")));
    }
    let common = mean * (1.0 - mean) / variance - 1.0;
    let beta = Beta::new(mean * common, (1.0 - mean) * common)
        .map_err(|e| invalid(e.to_string()))?;
    Ok(beta.sample(rng))
}

/// Draws from a gamma distribution parameterized by its mean and standard deviation.
pub fn sample_gamma<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> Result<f64, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidParameter {
        name: "gamma distribution",
        reason,
    };
    if mean <= 0.0 || sd <= 0.0 {
        return Err(invalid(format!("mean {mean}, sd {sd}")));
    }
    let shape = (mean / sd).powi(2);
    let gamma = Gamma::new(shape, sd * sd / mean).map_err(|e| invalid(e.to_string()))?;
    Ok(gamma.sample(rng))
}

/// Finds `x` in `[lo, hi]` with `f(x) = target` for a monotone `f` by bisection. Returns the
/// nearer bound when the target lies outside `f`'s range on the interval.
pub fn solve_monotone(f: impl Fn(f64) -> f64, target: f64, mut lo: f64, mut hi: f64) -> f64 {
    let increasing = f(hi) >= f(lo);
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if (f(mid) < target) == increasing {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-9 {
            break;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn cdf_matches_reference_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.96) - 0.975_002_1).abs() < 1e-6);
        assert!((normal_cdf(-1.0) - 0.158_655_25).abs() < 1e-6);
    }

    #[test]
    fn probit_inverts_cdf_across_tails() {
        for p in [1e-6, 0.001, 0.02, 0.3, 0.5, 0.77, 0.99, 0.999_99] {
            let x = probit(p);
            assert!((normal_cdf(x) - p).abs() < 1e-6 * p.max(1e-3), "p={p} x={x}");
        }
        assert_eq!(probit(0.0), f64::NEG_INFINITY);
        assert_eq!(probit(1.0), f64::INFINITY);
    }

    #[test]
    fn truncated_normal_respects_bounds() {
        let sd = confidence_interval_sd(0.263, 0.351);
        for u in [0.0, 0.001, 0.5, 0.999, 1.0] {
            let x = truncated_normal_quantile(0.308, sd, 0.2, 0.4, u);
            assert!((0.2..=0.4).contains(&x));
        }
        let median = truncated_normal_quantile(0.308, sd, 0.2, 0.4, 0.5);
        assert!((median - 0.308).abs() < 1e-3);
    }

    #[test]
    fn percentile_ranks_average_ties() {
        assert_eq!(percentile_ranks(&[3.0, 1.0, 2.0, 2.0]), vec![1.0, 0.25, 0.625, 0.625]);
        assert!(percentile_ranks(&[]).is_empty());
    }

    #[test]
    fn beta_rejects_impossible_variance() {
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(sample_beta(&mut rng, 0.2, 0.5).is_err());
        let x = sample_beta(&mut rng, 0.2, 0.001).expect("beta");
        assert!((0.0..=1.0).contains(&x));
    }

    #[test]
    fn gamma_matches_its_mean() {
        let mut rng = SmallRng::seed_from_u64(9);
        let n = 20_000;
        let mean = (0..n)
            .map(|_| sample_gamma(&mut rng, 1.7, 0.15).expect("gamma"))
            .sum::<f64>()
            / n as f64;
        assert!((mean - 1.7).abs() < 0.01, "mean {mean}");
        assert!(sample_gamma(&mut rng, -1.0, 0.1).is_err());
    }

    #[test]
    fn bisection_finds_roots_of_either_direction() {
        let up = solve_monotone(|x| x * x, 2.0, 0.0, 4.0);
        assert!((up - 2f64.sqrt()).abs() < 1e-6);
        let down = solve_monotone(|x| 10.0 - x, 3.0, 0.0, 10.0);
        assert!((down - 7.0).abs() < 1e-6);
        assert!((solve_monotone(|x| x, 20.0, 0.0, 10.0) - 10.0).abs() < 1e-6);
    }
}
