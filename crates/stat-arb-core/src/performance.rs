use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};

use crate::stats;
use crate::types::{Money, Rate};

/// Performance of one backtest. Ratios that are undefined for the run
/// (no trades, no return variance, no losing trades) are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// (final equity − initial capital) / initial capital
    pub total_return: Rate,
    pub total_pnl: Money,
    pub final_equity: Money,
    /// Mean per-bar return × bars per year
    pub annualized_return: Option<Rate>,
    /// Sample std of per-bar returns × sqrt(bars per year)
    pub annualized_volatility: Option<Rate>,
    pub sharpe_ratio: Option<Decimal>,
    pub sortino_ratio: Option<Decimal>,
    pub cagr: Option<Rate>,
    /// Largest peak-to-trough decline as a fraction of the peak
    pub max_drawdown: Rate,
    /// Same decline in currency
    pub max_drawdown_abs: Money,
    pub num_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: Option<Rate>,
    pub profit_factor: Option<Decimal>,
    pub gross_profit: Money,
    pub gross_loss: Money,
    pub average_trade_pnl: Option<Money>,
    pub total_costs: Money,
}

/// Summarise an equity curve (one value per bar, after marking) and the
/// net PnL of each closed trade.
///
/// Sharpe and Sortino use per-bar returns of the equity curve, annualised
/// with `bars_per_year`.
pub fn summarize_performance(
    initial_capital: Money,
    equity_curve: &[Money],
    trade_pnls: &[Money],
    total_costs: Money,
    bars_per_year: Decimal,
) -> PerformanceSummary {
    let final_equity = equity_curve.last().copied().unwrap_or(initial_capital);
    let total_pnl = final_equity - initial_capital;
    let total_return = if initial_capital.is_zero() {
        Decimal::ZERO
    } else {
        total_pnl / initial_capital
    };

    let returns = bar_returns(initial_capital, equity_curve);
    let (annualized_return, annualized_volatility, sharpe_ratio, sortino_ratio) =
        risk_adjusted(&returns, bars_per_year);

    let (max_drawdown, max_drawdown_abs) = max_drawdown(initial_capital, equity_curve);

    let winning_trades = trade_pnls.iter().filter(|p| **p > Decimal::ZERO).count();
    let losing_trades = trade_pnls.iter().filter(|p| **p < Decimal::ZERO).count();
    let gross_profit: Money = trade_pnls.iter().filter(|p| **p > Decimal::ZERO).sum();
    let gross_loss: Money = trade_pnls.iter().filter(|p| **p < Decimal::ZERO).sum();
    let num_trades = trade_pnls.len();

    let win_rate = (num_trades > 0)
        .then(|| Decimal::from(winning_trades as u64) / Decimal::from(num_trades as u64));
    let profit_factor = (!gross_loss.is_zero()).then(|| gross_profit / gross_loss.abs());
    let average_trade_pnl = (num_trades > 0)
        .then(|| trade_pnls.iter().copied().sum::<Decimal>() / Decimal::from(num_trades as u64));

    PerformanceSummary {
        total_return,
        total_pnl,
        final_equity,
        annualized_return,
        annualized_volatility,
        sharpe_ratio,
        sortino_ratio,
        cagr: cagr(initial_capital, final_equity, equity_curve.len(), bars_per_year),
        max_drawdown,
        max_drawdown_abs,
        num_trades,
        winning_trades,
        losing_trades,
        win_rate,
        profit_factor,
        gross_profit,
        gross_loss,
        average_trade_pnl,
        total_costs,
    }
}

/// Simple returns bar over bar, the first against the initial capital.
/// Bars following non-positive equity are skipped.
fn bar_returns(initial_capital: Money, equity_curve: &[Money]) -> Vec<Decimal> {
    let mut prev = initial_capital;
    let mut returns = Vec::with_capacity(equity_curve.len());
    for &equity in equity_curve {
        if prev > Decimal::ZERO {
            returns.push(equity / prev - Decimal::ONE);
        }
        prev = equity;
    }
    returns
}

type RiskAdjusted = (
    Option<Decimal>,
    Option<Decimal>,
    Option<Decimal>,
    Option<Decimal>,
);

fn risk_adjusted(returns: &[Decimal], bars_per_year: Decimal) -> RiskAdjusted {
    if returns.len() < 2 {
        return (None, None, None, None);
    }
    let n = Decimal::from(returns.len() as u64);
    let mean = stats::mean(returns);
    let std = stats::sqrt(stats::sample_variance(returns));
    let sqrt_bpy = stats::sqrt(bars_per_year);

    let annualized_return = mean * bars_per_year;
    let annualized_volatility = std * sqrt_bpy;
    let sharpe = (!std.is_zero()).then(|| mean / std * sqrt_bpy);

    let downside_sq: Decimal = returns
        .iter()
        .filter(|r| **r < Decimal::ZERO)
        .map(|r| *r * *r)
        .sum();
    let downside = stats::sqrt(downside_sq / n);
    let sortino = (!downside.is_zero()).then(|| mean / downside * sqrt_bpy);

    (
        Some(annualized_return),
        Some(annualized_volatility),
        sharpe,
        sortino,
    )
}

/// (fractional, absolute) maximum drawdown, with the initial capital as the
/// first peak.
fn max_drawdown(initial_capital: Money, equity_curve: &[Money]) -> (Rate, Money) {
    let mut peak = initial_capital;
    let mut max_dd = Decimal::ZERO;
    let mut max_dd_abs = Decimal::ZERO;
    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
        }
        let decline = peak - equity;
        if decline > max_dd_abs {
            max_dd_abs = decline;
        }
        if peak > Decimal::ZERO {
            let dd = decline / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    (max_dd, max_dd_abs)
}

fn cagr(initial: Money, final_equity: Money, bars: usize, bars_per_year: Decimal) -> Option<Rate> {
    if bars == 0 || initial <= Decimal::ZERO || final_equity <= Decimal::ZERO {
        return None;
    }
    let years = Decimal::from(bars as u64) / bars_per_year;
    if years.is_zero() {
        return None;
    }
    let growth = (final_equity / initial).checked_powd(Decimal::ONE / years)?;
    Some(growth - Decimal::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_flat_equity_has_undefined_ratios() {
        let equity = vec![dec!(1000); 30];
        let summary = summarize_performance(dec!(1000), &equity, &[], Decimal::ZERO, dec!(252));
        assert_eq!(summary.num_trades, 0);
        assert_eq!(summary.total_return, Decimal::ZERO);
        assert_eq!(summary.sharpe_ratio, None);
        assert_eq!(summary.win_rate, None);
        assert_eq!(summary.profit_factor, None);
        assert_eq!(summary.max_drawdown, Decimal::ZERO);
    }

    #[test]
    fn test_drawdown_peak_to_trough() {
        let equity = vec![dec!(1100), dec!(880), dec!(990), dec!(1200)];
        let (dd, abs) = max_drawdown(dec!(1000), &equity);
        assert_eq!(dd, dec!(0.2));
        assert_eq!(abs, dec!(220));
    }

    #[test]
    fn test_drawdown_no_loss() {
        let equity = vec![dec!(1010), dec!(1030), dec!(1040)];
        assert_eq!(max_drawdown(dec!(1000), &equity), (Decimal::ZERO, Decimal::ZERO));
    }

    #[test]
    fn test_trade_statistics() {
        let pnls = vec![dec!(100), dec!(-50), dec!(30), dec!(-10)];
        let equity = vec![dec!(1100), dec!(1050), dec!(1080), dec!(1070)];
        let summary = summarize_performance(dec!(1000), &equity, &pnls, dec!(4), dec!(252));
        assert_eq!(summary.num_trades, 4);
        assert_eq!(summary.win_rate, Some(dec!(0.5)));
        assert_eq!(summary.gross_profit, dec!(130));
        assert_eq!(summary.gross_loss, dec!(-60));
        assert_eq!(summary.profit_factor, Some(dec!(130) / dec!(60)));
        assert_eq!(summary.average_trade_pnl, Some(dec!(17.5)));
        assert_eq!(summary.total_return, dec!(0.07));
        assert!(summary.sharpe_ratio.is_some());
        assert!(summary.sortino_ratio.is_some());
    }

    #[test]
    fn test_sharpe_sign_follows_mean_return() {
        let rising: Vec<Decimal> = (1..=20).map(|i| dec!(1000) + Decimal::from(i * i)).collect();
        let summary = summarize_performance(dec!(1000), &rising, &[dec!(400)], Decimal::ZERO, dec!(252));
        assert!(summary.sharpe_ratio.unwrap() > Decimal::ZERO);
        assert_eq!(summary.sortino_ratio, None);
    }

    #[test]
    fn test_cagr_one_year_equals_total_return() {
        let equity = vec![dec!(1100); 252];
        let summary = summarize_performance(dec!(1000), &equity, &[], Decimal::ZERO, dec!(252));
        assert!((summary.cagr.unwrap() - dec!(0.1)).abs() < dec!(0.000001));
    }
}
