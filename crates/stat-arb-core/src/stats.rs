use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::StatArbError;
use crate::StatArbResult;

// ---------------------------------------------------------------------------
// Moments
// ---------------------------------------------------------------------------

pub fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().copied().sum::<Decimal>() / Decimal::from(values.len() as u64)
}

/// Population variance (divisor n).
pub fn population_variance(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    sum_sq_dev(values) / Decimal::from(values.len() as u64)
}

/// Sample variance (divisor n - 1).
pub fn sample_variance(values: &[Decimal]) -> Decimal {
    if values.len() < 2 {
        return Decimal::ZERO;
    }
    sum_sq_dev(values) / Decimal::from(values.len() as u64 - 1)
}

fn sum_sq_dev(values: &[Decimal]) -> Decimal {
    let m = mean(values);
    values
        .iter()
        .map(|v| {
            let d = *v - m;
            d * d
        })
        .sum()
}

/// Square root; zero for non-positive input.
pub fn sqrt(value: Decimal) -> Decimal {
    if value <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    value.sqrt().unwrap_or(Decimal::ZERO)
}

/// Pearson correlation coefficient between two equal-length series.
pub fn pearson_correlation(x: &[Decimal], y: &[Decimal]) -> StatArbResult<Decimal> {
    let mean_x = mean(x);
    let mean_y = mean(y);

    let mut cov = Decimal::ZERO;
    let mut var_x = Decimal::ZERO;
    let mut var_y = Decimal::ZERO;
    for (xi, yi) in x.iter().zip(y) {
        let dx = *xi - mean_x;
        let dy = *yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = sqrt(var_x) * sqrt(var_y);
    if denom.is_zero() {
        return Err(StatArbError::DegenerateSeries(
            "Pearson correlation: zero variance".into(),
        ));
    }
    Ok(cov / denom)
}

// ---------------------------------------------------------------------------
// Regression
// ---------------------------------------------------------------------------

/// Simple regression y = intercept + slope × x.
#[derive(Debug, Clone)]
pub struct SimpleFit {
    pub slope: Decimal,
    pub intercept: Decimal,
    pub residuals: Vec<Decimal>,
}

/// Ordinary least squares of `y` on `x` with an intercept.
pub fn simple_ols(x: &[Decimal], y: &[Decimal]) -> StatArbResult<SimpleFit> {
    let mean_x = mean(x);
    let mean_y = mean(y);

    let mut sxy = Decimal::ZERO;
    let mut sxx = Decimal::ZERO;
    for (xi, yi) in x.iter().zip(y) {
        let dx = *xi - mean_x;
        sxy += dx * (*yi - mean_y);
        sxx += dx * dx;
    }
    if sxx.is_zero() {
        return Err(StatArbError::DegenerateSeries(
            "regressor has zero variance".into(),
        ));
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let residuals = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| *yi - intercept - slope * *xi)
        .collect();
    Ok(SimpleFit {
        slope,
        intercept,
        residuals,
    })
}

/// Pivots smaller than this fraction of the largest diagonal are treated as zero.
const PIVOT_TOLERANCE: Decimal = dec!(0.00000000000000000001);

/// Multiple regression fit with coefficient standard errors.
#[derive(Debug, Clone)]
pub struct MultiFit {
    pub coefficients: Vec<Decimal>,
    pub std_errors: Vec<Decimal>,
    pub ssr: Decimal,
    pub nobs: usize,
}

/// OLS of `y` on the design matrix `rows` (one row per observation, caller
/// supplies the constant column). Solves the normal equations by
/// Gauss-Jordan elimination with partial pivoting.
pub fn multi_ols(rows: &[Vec<Decimal>], y: &[Decimal]) -> StatArbResult<MultiFit> {
    let nobs = rows.len();
    let k = rows.first().map(|r| r.len()).unwrap_or(0);
    if k == 0 || nobs <= k {
        return Err(StatArbError::InsufficientData {
            required: k + 1,
            actual: nobs,
        });
    }

    let mut xtx = vec![vec![Decimal::ZERO; k]; k];
    let mut xty = vec![Decimal::ZERO; k];
    for (row, yi) in rows.iter().zip(y) {
        for i in 0..k {
            xty[i] += row[i] * *yi;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let inv = invert(xtx)?;
    let coefficients: Vec<Decimal> = (0..k)
        .map(|i| (0..k).map(|j| inv[i][j] * xty[j]).sum())
        .collect();

    let ssr: Decimal = rows
        .iter()
        .zip(y)
        .map(|(row, yi)| {
            let fitted: Decimal = row.iter().zip(&coefficients).map(|(x, b)| *x * *b).sum();
            let e = *yi - fitted;
            e * e
        })
        .sum();
    let sigma2 = ssr / Decimal::from((nobs - k) as u64);
    let std_errors = (0..k).map(|i| sqrt(sigma2 * inv[i][i])).collect();

    Ok(MultiFit {
        coefficients,
        std_errors,
        ssr,
        nobs,
    })
}

fn invert(mut a: Vec<Vec<Decimal>>) -> StatArbResult<Vec<Vec<Decimal>>> {
    let k = a.len();
    let scale = (0..k).map(|i| a[i][i].abs()).max().unwrap_or(Decimal::ONE);
    let tolerance = scale * PIVOT_TOLERANCE;
    let mut inv: Vec<Vec<Decimal>> = (0..k)
        .map(|i| {
            (0..k)
                .map(|j| if i == j { Decimal::ONE } else { Decimal::ZERO })
                .collect()
        })
        .collect();

    for col in 0..k {
        let pivot = (col..k)
            .max_by(|&r1, &r2| a[r1][col].abs().cmp(&a[r2][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() <= tolerance {
            return Err(StatArbError::DegenerateSeries(
                "singular design matrix in regression".into(),
            ));
        }
        a.swap(col, pivot);
        inv.swap(col, pivot);

        let p = a[col][col];
        for j in 0..k {
            a[col][j] /= p;
            inv[col][j] /= p;
        }
        for r in 0..k {
            if r == col {
                continue;
            }
            let factor = a[r][col];
            if factor.is_zero() {
                continue;
            }
            for j in 0..k {
                let da = factor * a[col][j];
                let di = factor * inv[col][j];
                a[r][j] -= da;
                inv[r][j] -= di;
            }
        }
    }
    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_vs_sample_variance() {
        let v = [dec!(2), dec!(4), dec!(4), dec!(4), dec!(5), dec!(5), dec!(7), dec!(9)];
        assert_eq!(population_variance(&v), dec!(4));
        assert_eq!(sample_variance(&v), dec!(32) / dec!(7));
    }

    #[test]
    fn test_sqrt_basic() {
        assert!((sqrt(dec!(4)) - dec!(2)).abs() < dec!(0.0000001));
        assert_eq!(sqrt(Decimal::ZERO), Decimal::ZERO);
        assert_eq!(sqrt(dec!(-4)), Decimal::ZERO);
    }

    #[test]
    fn test_pearson_perfect_negative() {
        let x: Vec<Decimal> = (1..=10).map(Decimal::from).collect();
        let y: Vec<Decimal> = (1..=10).map(|i| Decimal::from(11 - i)).collect();
        let r = pearson_correlation(&x, &y).unwrap();
        assert!(r < dec!(-0.999));
    }

    #[test]
    fn test_simple_ols_exact_line() {
        let x: Vec<Decimal> = (1..=6).map(Decimal::from).collect();
        let y: Vec<Decimal> = x.iter().map(|v| dec!(3) * *v + dec!(2)).collect();
        let fit = simple_ols(&x, &y).unwrap();
        assert_eq!(fit.slope, dec!(3));
        assert_eq!(fit.intercept, dec!(2));
        assert!(fit.residuals.iter().all(|e| e.is_zero()));
    }

    #[test]
    fn test_simple_ols_constant_regressor_fails() {
        let x = vec![dec!(5); 8];
        let y: Vec<Decimal> = (1..=8).map(Decimal::from).collect();
        assert!(matches!(
            simple_ols(&x, &y),
            Err(StatArbError::DegenerateSeries(_))
        ));
    }

    #[test]
    fn test_multi_ols_matches_simple_ols() {
        let x = [dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)];
        let y = [dec!(2.1), dec!(3.9), dec!(6.2), dec!(7.8), dec!(10.1)];
        let rows: Vec<Vec<Decimal>> = x.iter().map(|v| vec![Decimal::ONE, *v]).collect();
        let multi = multi_ols(&rows, &y).unwrap();
        let simple = simple_ols(&x, &y).unwrap();
        assert!((multi.coefficients[1] - simple.slope).abs() < dec!(0.0000001));
        assert!((multi.coefficients[0] - simple.intercept).abs() < dec!(0.0000001));
        assert!(multi.std_errors[1] > Decimal::ZERO);
    }

    #[test]
    fn test_multi_ols_collinear_fails() {
        let rows: Vec<Vec<Decimal>> = (1..=6)
            .map(|i| vec![Decimal::ONE, Decimal::from(i), Decimal::from(2 * i)])
            .collect();
        let y: Vec<Decimal> = (1..=6).map(Decimal::from).collect();
        assert!(multi_ols(&rows, &y).is_err());
    }
}
