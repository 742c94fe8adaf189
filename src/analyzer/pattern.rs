use crate::analyzer::indicators::{align_forward_filled, complete_rows, smoothed_returns, IndicatorRow};
use crate::analyzer::report::{
    AnalysisError, AnalysisReport, ChartLine, ChartSpec, Conditions, HandleMetrics,
    MovingAverages, TradePlan,
};
use crate::model::Series;
use crate::utils::round_to;

/// Fewest raw bars accepted before any indicator is computed.
pub const MIN_BARS: usize = 200;

const HANDLE_BARS: usize = 10;
const PRE_HANDLE_SPAN: usize = 15;
const PRE_HANDLE_BARS: usize = 5;
const REL_STRENGTH_BARS: usize = 10;
const MA200_TREND_BARS: usize = 30;
const VOLUME_SPIKE_RATIO: f64 = 1.3;

const MAX_BELOW_HIGH_PCT: f64 = 25.0;
const MIN_ABOVE_LOW_PCT: f64 = 25.0;
const MIN_REL_STRENGTH: f64 = 3.0;
const MAX_HANDLE_DROP_PCT: f64 = 10.0;

const ENTRY_BUFFER: f64 = 1.01;
const FIRST_TARGET: f64 = 1.15;
const SECOND_TARGET: f64 = 1.25;

/// Trait defining the interface for a price-pattern analyzer.
pub trait Analyzer {
    fn analyze(
        &self,
        symbol: &str,
        prices: &Series,
        benchmark: &Series,
    ) -> Result<(AnalysisReport, ChartSpec), AnalysisError>;
}

/// Cup-with-handle detector over daily bars.
#[derive(Debug, Default, Clone, Copy)]
pub struct CupHandleAnalyzer;

impl CupHandleAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for CupHandleAnalyzer {
    fn analyze(
        &self,
        symbol: &str,
        prices: &Series,
        benchmark: &Series,
    ) -> Result<(AnalysisReport, ChartSpec), AnalysisError> {
        if prices.len() < MIN_BARS {
            return Err(AnalysisError::InsufficientData(format!(
                "{} has {} daily bars, at least {} are required",
                symbol,
                prices.len(),
                MIN_BARS
            )));
        }
        if benchmark.is_empty() {
            return Err(AnalysisError::BenchmarkUnavailable(format!(
                "no bars for benchmark {}",
                benchmark.symbol
            )));
        }
        validate_series(prices)?;
        validate_series(benchmark)?;

        let rows = complete_rows(prices);
        if rows.is_empty() {
            return Err(AnalysisError::InsufficientData(format!(
                "{} has no bars with a full 52-week history",
                symbol
            )));
        }

        let benchmark_returns = align_benchmark(&rows, benchmark)?;
        let report = evaluate(symbol, &rows, &benchmark_returns)?;
        let chart = chart_spec(symbol, &rows);
        Ok((report, chart))
    }
}

/// Rejects unordered dates and prices that would poison the ratios.
fn validate_series(series: &Series) -> Result<(), AnalysisError> {
    for (i, bar) in series.bars.iter().enumerate() {
        let prices = [bar.open, bar.high, bar.low, bar.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(AnalysisError::AnalysisFailed(format!(
                "{}: non-positive or non-finite price on {}",
                series.symbol, bar.date
            )));
        }
        if i > 0 && series.bars[i - 1].date >= bar.date {
            return Err(AnalysisError::AnalysisFailed(format!(
                "{}: dates are not strictly ascending at {}",
                series.symbol, bar.date
            )));
        }
    }
    Ok(())
}

/// Benchmark smoothed returns reindexed onto `rows`, one value per row.
fn align_benchmark(rows: &[IndicatorRow], benchmark: &Series) -> Result<Vec<f64>, AnalysisError> {
    let target_dates: Vec<_> = rows.iter().map(|r| r.date).collect();
    let returns = smoothed_returns(&benchmark.closes());
    let aligned = align_forward_filled(&target_dates, &benchmark.dates(), &returns);

    let values: Option<Vec<f64>> = aligned.into_iter().collect();
    match values {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AnalysisError::BenchmarkAlignmentFailed(format!(
            "{} does not cover {} .. {}",
            benchmark.symbol,
            target_dates.first().map(|d| d.to_string()).unwrap_or_default(),
            target_dates.last().map(|d| d.to_string()).unwrap_or_default()
        ))),
    }
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

/// `(numerator / denominator) * 100`, refusing degenerate denominators.
fn percent_of(numerator: f64, denominator: f64, what: &str) -> Result<f64, AnalysisError> {
    if denominator == 0.0 || !denominator.is_finite() {
        return Err(AnalysisError::AnalysisFailed(format!("{what} is zero")));
    }
    let pct = numerator / denominator * 100.0;
    if pct.is_finite() {
        Ok(pct)
    } else {
        Err(AnalysisError::AnalysisFailed(format!("{what} ratio is not finite")))
    }
}

fn relative_strength(rows: &[IndicatorRow], benchmark: &[f64]) -> Result<f64, AnalysisError> {
    let target = tail(rows, REL_STRENGTH_BARS);
    let index = tail(benchmark, REL_STRENGTH_BARS);

    let mut sum = 0.0;
    for (row, &bench) in target.iter().zip(index) {
        if bench == 0.0 {
            return Err(AnalysisError::AnalysisFailed(format!(
                "benchmark smoothed return is zero on {}",
                row.date
            )));
        }
        sum += row.smoothed_return / bench;
    }
    let mean = sum / target.len().min(index.len()) as f64;
    if mean.is_finite() {
        Ok(mean)
    } else {
        Err(AnalysisError::AnalysisFailed("relative strength is not finite".into()))
    }
}

fn handle_metrics(rows: &[IndicatorRow], ma50: f64) -> Result<HandleMetrics, AnalysisError> {
    let handle = tail(rows, HANDLE_BARS);
    let high = handle.iter().map(|r| r.close).fold(f64::NEG_INFINITY, f64::max);
    let low = handle.iter().map(|r| r.close).fold(f64::INFINITY, f64::min);
    let volume_avg = handle.iter().map(|r| r.volume as f64).sum::<f64>() / handle.len() as f64;

    Ok(HandleMetrics {
        high,
        low,
        drop_pct: percent_of(high - low, high, "handle high")?,
        volume_avg,
        above_ma50: high > ma50,
    })
}

/// No red candle on above-average volume in the five bars before the handle.
fn no_heavy_red_volume(rows: &[IndicatorRow], avg_volume_50: f64) -> bool {
    let span = tail(rows, PRE_HANDLE_SPAN);
    let pre_handle = &span[..span.len().min(PRE_HANDLE_BARS)];
    !pre_handle
        .iter()
        .any(|r| r.close < r.open && r.volume as f64 > avg_volume_50)
}

fn volume_spike(rows: &[IndicatorRow]) -> bool {
    tail(rows, HANDLE_BARS)
        .iter()
        .any(|r| r.volume as f64 > r.volume_ma50 * VOLUME_SPIKE_RATIO)
}

fn ma200_uptrend(rows: &[IndicatorRow]) -> bool {
    tail(rows, MA200_TREND_BARS)
        .windows(2)
        .all(|w| w[1].ma200 >= w[0].ma200)
}

fn evaluate(
    symbol: &str,
    rows: &[IndicatorRow],
    benchmark: &[f64],
) -> Result<AnalysisReport, AnalysisError> {
    let latest = rows
        .last()
        .ok_or_else(|| AnalysisError::InsufficientData(format!("{symbol} has no usable bars")))?;

    let moving_averages = MovingAverages {
        ma21: latest.ma21,
        ma40: latest.ma40,
        ma50: latest.ma50,
        ma150: latest.ma150,
        ma200: latest.ma200,
    };

    let rel_strength = relative_strength(rows, benchmark)?;
    let from_high_pct = percent_of(latest.high_52w - latest.close, latest.high_52w, "52-week high")?;
    let from_low_pct = percent_of(latest.close - latest.low_52w, latest.low_52w, "52-week low")?;
    let handle = handle_metrics(rows, latest.ma50)?;

    let handle_below_high_pct =
        percent_of(latest.high_52w - handle.high, latest.high_52w, "52-week high")?;
    let handle_above_low_pct =
        percent_of(handle.high - latest.low_52w, latest.low_52w, "52-week low")?;

    let conditions = Conditions {
        handle_above_ma50: handle.above_ma50,
        ma_stacked: latest.ma50 > latest.ma150 && latest.ma150 > latest.ma200,
        ma200_uptrend: ma200_uptrend(rows),
        near_52w_high: handle_below_high_pct <= MAX_BELOW_HIGH_PCT,
        above_52w_low: handle_above_low_pct >= MIN_ABOVE_LOW_PCT,
        volume_spike: volume_spike(rows),
        strong_relative_strength: rel_strength > MIN_REL_STRENGTH,
        shallow_handle: handle.drop_pct <= MAX_HANDLE_DROP_PCT,
        quiet_handle_volume: handle.volume_avg < latest.volume_ma50,
        no_heavy_red_volume: no_heavy_red_volume(rows, latest.volume_ma50),
    };
    let verdict = conditions.all();

    let trade_plan = verdict.then(|| {
        let entry = round_to(handle.high * ENTRY_BUFFER, 2);
        TradePlan {
            entry,
            target1: round_to(entry * FIRST_TARGET, 2),
            target2: round_to(entry * SECOND_TARGET, 2),
            stop: round_to(latest.ma21.min(latest.ma40), 2),
        }
    });

    Ok(AnalysisReport {
        symbol: symbol.to_string(),
        as_of: latest.date,
        current_price: latest.close,
        high_52w: latest.high_52w,
        low_52w: latest.low_52w,
        from_high_pct,
        from_low_pct,
        current_volume: latest.volume,
        avg_volume_50: latest.volume_ma50,
        moving_averages,
        rel_strength,
        handle,
        conditions,
        verdict,
        trade_plan,
    })
}

fn chart_spec(symbol: &str, rows: &[IndicatorRow]) -> ChartSpec {
    let line = |label: &str, dashed: bool, pick: fn(&IndicatorRow) -> f64| ChartLine {
        label: label.to_string(),
        values: rows.iter().map(pick).collect(),
        dashed,
    };

    ChartSpec {
        title: format!("{symbol} - cup with handle"),
        dates: rows.iter().map(|r| r.date).collect(),
        lines: vec![
            line("Close", false, |r| r.close),
            line("MA21", true, |r| r.ma21),
            line("MA40", true, |r| r.ma40),
            line("MA50", true, |r| r.ma50),
            line("MA150", true, |r| r.ma150),
            line("MA200", true, |r| r.ma200),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::report::FailureKind;
    use crate::model::Bar;
    use chrono::{Duration, NaiveDate};

    const BARS: usize = 300;
    const RISE_BARS: usize = 290;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
    }

    fn bar(i: usize, close: f64, volume: u64) -> Bar {
        Bar {
            date: start() + Duration::days(i as i64),
            open: close - 0.1,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume,
        }
    }

    /// Steady rise followed by a 10-bar handle drifting ~5% lower on light
    /// volume, with one heavy-volume day three bars from the end.
    fn cup_with_handle() -> Series {
        let mut bars = Vec::with_capacity(BARS);
        let mut close = 0.0;
        for i in 0..BARS {
            let volume = if i < RISE_BARS {
                close = 60.0 + 0.2 * i as f64;
                1_000_000
            } else {
                close *= 0.995;
                if i == BARS - 3 { 2_000_000 } else { 600_000 }
            };
            bars.push(bar(i, close, volume));
        }
        Series::new("CUP", bars)
    }

    /// Index whose daily returns are the target's divided by `strength`, so
    /// the smoothed-return ratio equals `strength` on every bar.
    fn benchmark_with_strength(target: &Series, strength: f64) -> Series {
        let mut level = 4000.0;
        let mut bars = Vec::with_capacity(target.len());
        for (i, b) in target.bars.iter().enumerate() {
            if i > 0 {
                let prev = target.bars[i - 1].close;
                level *= 1.0 + (b.close / prev - 1.0) / strength;
            }
            bars.push(Bar {
                date: b.date,
                open: level,
                high: level,
                low: level,
                close: level,
                volume: 0,
            });
        }
        Series::new("^GSPC", bars)
    }

    fn steady_benchmark(len: usize) -> Series {
        let bars = (0..len)
            .map(|i| {
                let level = 4000.0 * 1.001f64.powi(i as i32);
                Bar {
                    date: start() + Duration::days(i as i64),
                    open: level,
                    high: level,
                    low: level,
                    close: level,
                    volume: 0,
                }
            })
            .collect();
        Series::new("^GSPC", bars)
    }

    #[test]
    fn qualifying_pattern_yields_trade_plan() {
        let prices = cup_with_handle();
        let benchmark = benchmark_with_strength(&prices, 4.0);

        let (report, chart) = CupHandleAnalyzer::new()
            .analyze("CUP", &prices, &benchmark)
            .expect("analysis should succeed");

        assert!((report.rel_strength - 4.0).abs() < 1e-6);
        assert!(report.conditions.all(), "failed: {:?}", report.conditions.failed());
        assert!(report.verdict);
        assert!(report.handle.drop_pct > 4.0 && report.handle.drop_pct < 5.0);
        assert_eq!(report.current_volume, 600_000);

        let plan = report.trade_plan.expect("trade plan present");
        assert_eq!(plan.entry, round_to(report.handle.high * 1.01, 2));
        assert_eq!(plan.target1, round_to(plan.entry * 1.15, 2));
        assert_eq!(plan.target2, round_to(plan.entry * 1.25, 2));
        let ma = report.moving_averages;
        assert_eq!(plan.stop, round_to(ma.ma21.min(ma.ma40), 2));

        assert_eq!(chart.lines.len(), 6);
        assert_eq!(chart.dates.len(), BARS - 251);
        assert!(chart.lines.iter().all(|l| l.values.len() == chart.dates.len()));
        assert_eq!(chart.lines[0].label, "Close");
        assert!(!chart.lines[0].dashed && chart.lines[5].dashed);
    }

    #[test]
    fn weak_relative_strength_fails_only_that_condition() {
        let prices = cup_with_handle();
        let benchmark = benchmark_with_strength(&prices, 2.0);

        let (report, _) = CupHandleAnalyzer::new()
            .analyze("CUP", &prices, &benchmark)
            .unwrap();

        assert!((report.rel_strength - 2.0).abs() < 1e-6);
        assert!(!report.verdict);
        assert!(report.trade_plan.is_none());
        assert_eq!(report.conditions.failed(), vec!["strong_relative_strength"]);
        assert!(report.summary().contains("strong_relative_strength"));
    }

    #[test]
    fn flat_benchmark_tail_is_an_analysis_failure() {
        let prices = cup_with_handle();
        let mut benchmark = benchmark_with_strength(&prices, 4.0);
        let level = benchmark.bars[BARS - 7].close;
        for b in benchmark.bars[BARS - 6..].iter_mut() {
            b.open = level;
            b.high = level;
            b.low = level;
            b.close = level;
        }

        let err = CupHandleAnalyzer::new()
            .analyze("CUP", &prices, &benchmark)
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::AnalysisFailed);
        assert!(err.message().contains("zero"));
    }

    #[test]
    fn opposite_benchmark_returns_keep_their_sign() {
        let prices = cup_with_handle();
        let benchmark = benchmark_with_strength(&prices, -2.0);

        let (report, _) = CupHandleAnalyzer::new()
            .analyze("CUP", &prices, &benchmark)
            .unwrap();

        assert!((report.rel_strength + 2.0).abs() < 1e-6);
        assert!(!report.conditions.strong_relative_strength);
        assert!(!report.verdict);
    }

    #[test]
    fn benchmark_only_days_do_not_fill_target_gaps() {
        let mut prices = cup_with_handle();
        let benchmark_bars = benchmark_with_strength(&prices, 4.0).bars;

        // The target skips a day before its last bar; the benchmark trades on
        // that skipped day (with a jump) and not on the target's last date.
        let skipped = prices.bars[BARS - 1].date;
        prices.bars[BARS - 1].date = skipped + Duration::days(1);
        let mut bars = benchmark_bars;
        let jump = bars[BARS - 1].close * 1.5;
        bars[BARS - 1] = Bar { open: jump, high: jump, low: jump, close: jump, ..bars[BARS - 1].clone() };
        let benchmark = Series::new("^GSPC", bars);

        let (report, _) = CupHandleAnalyzer::new()
            .analyze("CUP", &prices, &benchmark)
            .unwrap();

        let target = smoothed_returns(&prices.closes());
        let index = smoothed_returns(&benchmark.closes());
        let expected = (BARS - 10..BARS)
            .map(|i| target[i].unwrap() / index[i.min(BARS - 2)].unwrap())
            .sum::<f64>()
            / 10.0;
        assert!((report.rel_strength - expected).abs() < 1e-9);
    }

    #[test]
    fn rising_series_without_volume_anomalies() {
        let bars: Vec<Bar> = (0..BARS).map(|i| bar(i, 50.0 + 0.5 * i as f64, 1_000_000)).collect();
        let prices = Series::new("UP", bars);
        let benchmark = benchmark_with_strength(&prices, 4.0);

        let (report, _) = CupHandleAnalyzer::new()
            .analyze("UP", &prices, &benchmark)
            .unwrap();

        assert!(report.conditions.ma200_uptrend);
        assert!(report.conditions.ma_stacked);
        assert!(!report.conditions.volume_spike);
        assert!(!report.conditions.quiet_handle_volume);
        assert!(!report.verdict);
        assert!(report.trade_plan.is_none());
    }

    #[test]
    fn fewer_than_200_bars_is_insufficient() {
        let prices = Series::new("TINY", (0..199).map(|i| bar(i, 10.0, 1)).collect());
        let err = CupHandleAnalyzer::new()
            .analyze("TINY", &prices, &steady_benchmark(199))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InsufficientData);

        // Content is irrelevant below the threshold, even a missing benchmark.
        let err = CupHandleAnalyzer::new()
            .analyze("TINY", &prices, &Series::empty("^GSPC"))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InsufficientData);
    }

    #[test]
    fn no_full_year_window_is_insufficient() {
        let prices = Series::new("MID", (0..220).map(|i| bar(i, 10.0 + i as f64, 1)).collect());
        let err = CupHandleAnalyzer::new()
            .analyze("MID", &prices, &steady_benchmark(220))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InsufficientData);
    }

    #[test]
    fn empty_benchmark_is_unavailable() {
        let err = CupHandleAnalyzer::new()
            .analyze("CUP", &cup_with_handle(), &Series::empty("^GSPC"))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::BenchmarkUnavailable);
    }

    #[test]
    fn benchmark_starting_after_target_fails_alignment() {
        let prices = cup_with_handle();
        let late: Vec<Bar> = (0..20)
            .map(|i| {
                let mut b = bar(BARS + i, 4000.0 + i as f64, 0);
                b.open = b.close;
                b
            })
            .collect();
        let err = CupHandleAnalyzer::new()
            .analyze("CUP", &prices, &Series::new("^GSPC", late))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::BenchmarkAlignmentFailed);
    }

    #[test]
    fn zero_price_is_reported_not_raised() {
        let mut prices = cup_with_handle();
        prices.bars[10].close = 0.0;
        let err = CupHandleAnalyzer::new()
            .analyze("CUP", &prices, &steady_benchmark(BARS))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::AnalysisFailed);
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let mut prices = cup_with_handle();
        prices.bars[20].date = prices.bars[19].date;
        let err = CupHandleAnalyzer::new()
            .analyze("CUP", &prices, &steady_benchmark(BARS))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::AnalysisFailed);
        assert!(err.message().contains("ascending"));
    }

    #[test]
    fn flat_handle_has_zero_drop() {
        let bars: Vec<Bar> = (0..BARS)
            .map(|i| {
                let close = 60.0 + 0.2 * i.min(RISE_BARS - 1) as f64;
                bar(i, close, 1_000_000)
            })
            .collect();
        let prices = Series::new("FLAT", bars);

        let (report, _) = CupHandleAnalyzer::new()
            .analyze("FLAT", &prices, &steady_benchmark(BARS))
            .unwrap();

        assert_eq!(report.handle.high, report.handle.low);
        assert_eq!(report.handle.drop_pct, 0.0);
        assert!(report.conditions.shallow_handle);
    }

    #[test]
    fn repeated_analysis_is_identical() {
        let prices = cup_with_handle();
        let benchmark = benchmark_with_strength(&prices, 4.0);
        let analyzer = CupHandleAnalyzer::new();

        let first = analyzer.analyze("CUP", &prices, &benchmark).unwrap();
        let second = analyzer.analyze("CUP", &prices, &benchmark).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn heavy_red_bar_before_handle_is_flagged() {
        let mut prices = cup_with_handle();
        let idx = BARS - 12;
        prices.bars[idx].open = prices.bars[idx].close + 1.0;
        prices.bars[idx].volume = 5_000_000;
        let benchmark = benchmark_with_strength(&prices, 4.0);

        let (report, _) = CupHandleAnalyzer::new()
            .analyze("CUP", &prices, &benchmark)
            .unwrap();
        assert!(!report.conditions.no_heavy_red_volume);
        assert!(report.trade_plan.is_none());
    }
}
