//! Sample sizing and confidence intervals for proportions.

use serde::{Deserialize, Serialize};

use crate::error::{CensusError, Result};

/// Proportion assumed when sizing a sample (maximum variance).
const CONSERVATIVE_PROPORTION: f64 = 0.5;

/// Decimal places kept on critical values, matching published z tables.
const Z_DECIMALS: u32 = 3;

/// A proportion estimate with its interval, all in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceInterval {
    /// Point estimate `successes / total`.
    pub estimate: f64,
    /// Lower bound, clamped at 0.
    pub lower: f64,
    /// Upper bound, clamped at 1.
    pub upper: f64,
    /// Half-width before clamping.
    pub margin: f64,
}

impl ConfidenceInterval {
    /// Interval for an empty sample.
    pub const EMPTY: ConfidenceInterval = ConfidenceInterval {
        estimate: 0.0,
        lower: 0.0,
        upper: 0.0,
        margin: 0.0,
    };

    /// The same interval scaled to percentages.
    pub fn as_percentages(&self) -> ConfidenceInterval {
        ConfidenceInterval {
            estimate: self.estimate * 100.0,
            lower: self.lower * 100.0,
            upper: self.upper * 100.0,
            margin: self.margin * 100.0,
        }
    }
}

/// Two-tailed normal critical value for a confidence level in `(0, 1)`.
///
/// The value is rounded to three decimals, so `0.95` yields `1.96` and
/// `0.99` yields `2.576`.
pub fn z_score(confidence_level: f64) -> Result<f64> {
    check_open_unit("confidence_level", confidence_level)?;
    let tail = (1.0 - confidence_level) / 2.0;
    Ok(round_f64(-normal_quantile(tail), Z_DECIMALS))
}

/// Minimum sample size for estimating a proportion.
///
/// Uses `n = ceil(z² · p(1−p) / E²)` with `p = 0.5`.
pub fn required_sample_size(confidence_level: f64, margin_of_error: f64) -> Result<usize> {
    check_open_unit("margin_of_error", margin_of_error)?;
    let z = z_score(confidence_level)?;
    let p = CONSERVATIVE_PROPORTION;
    let n = (z * z * p * (1.0 - p) / (margin_of_error * margin_of_error)).ceil();
    Ok((n as usize).max(1))
}

/// Normal-approximation (Wald) interval for `successes / total`.
pub fn interval(successes: usize, total: usize, confidence_level: f64) -> Result<ConfidenceInterval> {
    let z = z_score(confidence_level)?;
    check_counts(successes, total)?;
    if total == 0 {
        return Ok(ConfidenceInterval::EMPTY);
    }

    let n = total as f64;
    let p = successes as f64 / n;
    let margin = z * (p * (1.0 - p) / n).sqrt();
    Ok(ConfidenceInterval {
        estimate: p,
        lower: (p - margin).max(0.0),
        upper: (p + margin).min(1.0),
        margin,
    })
}

/// Wilson score interval for `successes / total`.
///
/// Better behaved than [`interval`] for small samples and extreme proportions.
pub fn wilson_interval(
    successes: usize,
    total: usize,
    confidence_level: f64,
) -> Result<ConfidenceInterval> {
    let z = z_score(confidence_level)?;
    check_counts(successes, total)?;
    if total == 0 {
        return Ok(ConfidenceInterval::EMPTY);
    }

    let n = total as f64;
    let p = successes as f64 / n;
    let z2 = z * z;
    let denom = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denom;
    let margin = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt() / denom;
    Ok(ConfidenceInterval {
        estimate: p,
        lower: (center - margin).max(0.0).min(p),
        upper: (center + margin).min(1.0).max(p),
        margin,
    })
}

/// Round a floating point value to `decimals` decimal places.
pub fn round_f64(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Divide, returning 0 for an empty denominator.
pub fn safe_ratio(numer: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        numer as f64 / denom as f64
    }
}

fn check_open_unit(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(CensusError::Config(format!(
            "{name} must be strictly between 0 and 1, got {value}"
        )))
    }
}

fn check_counts(successes: usize, total: usize) -> Result<()> {
    if successes > total {
        return Err(CensusError::Other(format!(
            "successes ({successes}) exceed total ({total})"
        )));
    }
    Ok(())
}

/// Lower-tail standard normal quantile for `p` in `(0, 0.5]`.
///
/// Acklam's rational approximation; relative error below 1.2e-9.
fn normal_quantile(p: f64) -> f64 {
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
        3.754_408_361_907_416,
    ];
    const P_LOW: f64 = 0.02425;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    }
}
