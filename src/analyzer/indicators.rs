//! Trailing-window indicators computed in one pass per series.
//!
//! Every output is aligned with its input by index; `None` marks a row whose
//! window is not yet fully populated.

use crate::model::Series;
use chrono::NaiveDate;
use std::collections::VecDeque;

pub const MA_WINDOWS: [usize; 5] = [21, 40, 50, 150, 200];
pub const VOLUME_MA_WINDOW: usize = 50;
pub const YEAR_WINDOW: usize = 252;
pub const RETURN_SMOOTHING: usize = 5;

/// Simple moving average over the trailing `window` values.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let opt: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    rolling_mean_opt(&opt, window)
}

/// Moving average over values that may be undefined; a window containing an
/// undefined value yields `None`.
pub fn rolling_mean_opt(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if window == 0 {
        out.resize(values.len(), None);
        return out;
    }

    let mut buf: VecDeque<Option<f64>> = VecDeque::with_capacity(window + 1);
    let mut sum = 0.0;
    let mut missing = 0usize;
    // Length of the trailing run of identical values; a window made of one
    // repeated value yields that value exactly instead of the drifted sum.
    let mut run = 0usize;
    let mut last: Option<f64> = None;

    for &value in values {
        buf.push_back(value);
        match value {
            Some(v) => {
                sum += v;
                run = if last == Some(v) { run + 1 } else { 1 };
            }
            None => {
                missing += 1;
                run = 0;
            }
        }
        last = value;
        if buf.len() > window {
            match buf.pop_front().flatten() {
                Some(old) => sum -= old,
                None => missing -= 1,
            }
        }
        let full = buf.len() == window && missing == 0;
        out.push(full.then(|| match last {
            Some(v) if run >= window => v,
            _ => sum / window as f64,
        }));
    }
    out
}

pub fn rolling_max(values: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling_extreme(values, window, |candidate, held| candidate >= held)
}

pub fn rolling_min(values: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling_extreme(values, window, |candidate, held| candidate <= held)
}

/// Monotonic-deque extremum: `dominates(new, old)` evicts `old` from the back.
fn rolling_extreme(
    values: &[f64],
    window: usize,
    dominates: impl Fn(f64, f64) -> bool,
) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut deque: VecDeque<usize> = VecDeque::new();

    for (i, &value) in values.iter().enumerate() {
        while let Some(&back) = deque.back() {
            if dominates(value, values[back]) {
                deque.pop_back();
            } else {
                break;
            }
        }
        deque.push_back(i);

        while let Some(&front) = deque.front() {
            if front + window <= i {
                deque.pop_front();
            } else {
                break;
            }
        }

        let full = window > 0 && i + 1 >= window;
        out.push(if full {
            deque.front().map(|&idx| values[idx])
        } else {
            None
        });
    }
    out
}

/// One-period percent change; the first row is undefined.
pub fn pct_change(values: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &value in values {
        out.push(prev.map(|p| (value - p) / p));
        prev = Some(value);
    }
    out
}

/// Daily return smoothed by a trailing 5-bar mean.
pub fn smoothed_returns(closes: &[f64]) -> Vec<Option<f64>> {
    rolling_mean_opt(&pct_change(closes), RETURN_SMOOTHING)
}

/// Reindexes `values` (keyed by `source_dates`) onto `target_dates`, keeping a
/// value only where the dates match, then forward-fills along the target
/// dates. Source-only dates never contribute. Both date lists must be ascending.
pub fn align_forward_filled(
    target_dates: &[NaiveDate],
    source_dates: &[NaiveDate],
    values: &[Option<f64>],
) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(target_dates.len());
    let mut cursor = 0usize;
    let mut carried: Option<f64> = None;

    for date in target_dates {
        while cursor < source_dates.len() && source_dates[cursor] < *date {
            cursor += 1;
        }
        if source_dates.get(cursor) == Some(date) {
            if let Some(v) = values.get(cursor).copied().flatten() {
                carried = Some(v);
            }
        }
        out.push(carried);
    }
    out
}

/// Per-date indicator columns for one series, aligned by index.
#[derive(Debug, Clone)]
pub struct DerivedIndicators {
    pub ma21: Vec<Option<f64>>,
    pub ma40: Vec<Option<f64>>,
    pub ma50: Vec<Option<f64>>,
    pub ma150: Vec<Option<f64>>,
    pub ma200: Vec<Option<f64>>,
    pub volume_ma50: Vec<Option<f64>>,
    pub high_52w: Vec<Option<f64>>,
    pub low_52w: Vec<Option<f64>>,
    pub smoothed_return: Vec<Option<f64>>,
}

impl DerivedIndicators {
    pub fn compute(series: &Series) -> Self {
        let closes = series.closes();
        let volumes = series.volumes();
        let [w21, w40, w50, w150, w200] = MA_WINDOWS;

        Self {
            ma21: rolling_mean(&closes, w21),
            ma40: rolling_mean(&closes, w40),
            ma50: rolling_mean(&closes, w50),
            ma150: rolling_mean(&closes, w150),
            ma200: rolling_mean(&closes, w200),
            volume_ma50: rolling_mean(&volumes, VOLUME_MA_WINDOW),
            high_52w: rolling_max(&closes, YEAR_WINDOW),
            low_52w: rolling_min(&closes, YEAR_WINDOW),
            smoothed_return: smoothed_returns(&closes),
        }
    }

    /// Builds the row at `i` only when every indicator is defined there.
    fn complete_row(&self, series: &Series, i: usize) -> Option<IndicatorRow> {
        let bar = series.bars.get(i)?;
        Some(IndicatorRow {
            date: bar.date,
            open: bar.open,
            close: bar.close,
            volume: bar.volume,
            ma21: self.ma21.get(i).copied().flatten()?,
            ma40: self.ma40.get(i).copied().flatten()?,
            ma50: self.ma50.get(i).copied().flatten()?,
            ma150: self.ma150.get(i).copied().flatten()?,
            ma200: self.ma200.get(i).copied().flatten()?,
            volume_ma50: self.volume_ma50.get(i).copied().flatten()?,
            high_52w: self.high_52w.get(i).copied().flatten()?,
            low_52w: self.low_52w.get(i).copied().flatten()?,
            smoothed_return: self.smoothed_return.get(i).copied().flatten()?,
        })
    }
}

/// A bar together with all of its fully-populated indicators.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRow {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub volume: u64,
    pub ma21: f64,
    pub ma40: f64,
    pub ma50: f64,
    pub ma150: f64,
    pub ma200: f64,
    pub volume_ma50: f64,
    pub high_52w: f64,
    pub low_52w: f64,
    pub smoothed_return: f64,
}

/// Computes indicators and keeps only rows where all of them are defined.
pub fn complete_rows(series: &Series) -> Vec<IndicatorRow> {
    let derived = DerivedIndicators::compute(series);
    (0..series.len())
        .filter_map(|i| derived.complete_row(series, i))
        .collect()
}
