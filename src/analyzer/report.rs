use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::Write;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MovingAverages {
    pub ma21: f64,
    pub ma40: f64,
    pub ma50: f64,
    pub ma150: f64,
    pub ma200: f64,
}

/// Statistics of the last 10 bars (the handle).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HandleMetrics {
    pub high: f64,
    pub low: f64,
    pub drop_pct: f64,
    pub volume_avg: f64,
    pub above_ma50: bool,
}

/// The individual rules of the cup-with-handle verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Conditions {
    pub handle_above_ma50: bool,
    /// MA50 > MA150 > MA200.
    pub ma_stacked: bool,
    pub ma200_uptrend: bool,
    /// Handle high within 25% of the 52-week high.
    pub near_52w_high: bool,
    /// Handle high at least 25% above the 52-week low.
    pub above_52w_low: bool,
    pub volume_spike: bool,
    pub strong_relative_strength: bool,
    pub shallow_handle: bool,
    pub quiet_handle_volume: bool,
    pub no_heavy_red_volume: bool,
}

impl Conditions {
    pub fn checklist(&self) -> [(&'static str, bool); 10] {
        [
            ("handle_above_ma50", self.handle_above_ma50),
            ("ma_stacked", self.ma_stacked),
            ("ma200_uptrend", self.ma200_uptrend),
            ("near_52w_high", self.near_52w_high),
            ("above_52w_low", self.above_52w_low),
            ("volume_spike", self.volume_spike),
            ("strong_relative_strength", self.strong_relative_strength),
            ("shallow_handle", self.shallow_handle),
            ("quiet_handle_volume", self.quiet_handle_volume),
            ("no_heavy_red_volume", self.no_heavy_red_volume),
        ]
    }

    pub fn all(&self) -> bool {
        self.checklist().iter().all(|(_, ok)| *ok)
    }

    pub fn failed(&self) -> Vec<&'static str> {
        self.checklist()
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| *name)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TradePlan {
    pub entry: f64,
    pub target1: f64,
    pub target2: f64,
    pub stop: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub current_price: f64,
    pub high_52w: f64,
    pub low_52w: f64,
    pub from_high_pct: f64,
    pub from_low_pct: f64,
    pub current_volume: u64,
    pub avg_volume_50: f64,
    pub moving_averages: MovingAverages,
    pub rel_strength: f64,
    pub handle: HandleMetrics,
    pub conditions: Conditions,
    pub verdict: bool,
    pub trade_plan: Option<TradePlan>,
}

impl AnalysisReport {
    /// Plain-text rendition used by the page and the logs.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let yes = |b: bool| if b { "yes" } else { "no" };
        let c = &self.conditions;

        let _ = writeln!(out, "Close ({}): ${:.2}", self.as_of, self.current_price);
        let _ = writeln!(out, "Below 52-week high: {:.2}%", self.from_high_pct);
        let _ = writeln!(out, "Above 52-week low: {:.2}%", self.from_low_pct);
        let _ = writeln!(out, "Volume: {}", group_thousands(self.current_volume as f64));
        let _ = writeln!(out, "50-day average volume: {}", group_thousands(self.avg_volume_50));
        let _ = writeln!(out);
        let _ = writeln!(out, "Handle:");
        let _ = writeln!(out, "- pullback: {:.2}%", self.handle.drop_pct);
        let _ = writeln!(out, "- average volume: {}", group_thousands(self.handle.volume_avg));
        let _ = writeln!(out, "- above MA50: {}", yes(self.handle.above_ma50));
        let _ = writeln!(out, "- MA50 > MA150 > MA200: {}", yes(c.ma_stacked));
        let _ = writeln!(out, "- MA200 rising for 30 days: {}", yes(c.ma200_uptrend));
        let _ = writeln!(
            out,
            "- relative strength vs index: {:.2}x ({})",
            self.rel_strength,
            if c.strong_relative_strength { "strong" } else { "weak" }
        );
        let _ = writeln!(out, "- no heavy red volume before handle: {}", yes(c.no_heavy_red_volume));
        let _ = writeln!(out, "- volume breakout: {}", yes(c.volume_spike));
        let _ = writeln!(out);

        match &self.trade_plan {
            Some(plan) => {
                let _ = writeln!(out, "{} meets every cup-with-handle condition.", self.symbol);
                let _ = writeln!(out, "Handle top: ${:.2}", self.handle.high);
                let _ = writeln!(out, "Entry (handle top +1%): ${:.2}", plan.entry);
                let _ = writeln!(out, "Target 1 (+15%): ${:.2}", plan.target1);
                let _ = writeln!(out, "Target 2 (+25%): ${:.2}", plan.target2);
                let _ = writeln!(out, "Stop (lower of MA21/MA40): ${:.2}", plan.stop);
            }
            None => {
                let _ = writeln!(
                    out,
                    "{} does not meet all cup-with-handle conditions yet (failed: {}).",
                    self.symbol,
                    c.failed().join(", ")
                );
            }
        }
        out
    }
}

fn group_thousands(value: f64) -> String {
    let digits = format!("{:.0}", value.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0.0 && grouped != "0" {
        grouped.insert(0, '-');
    }
    grouped
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartLine {
    pub label: String,
    pub values: Vec<f64>,
    pub dashed: bool,
}

/// Data a renderer needs to draw the diagnostic chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub title: String,
    pub dates: Vec<NaiveDate>,
    pub lines: Vec<ChartLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InsufficientData,
    BenchmarkUnavailable,
    BenchmarkAlignmentFailed,
    AnalysisFailed,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("benchmark unavailable: {0}")]
    BenchmarkUnavailable(String),
    #[error("benchmark alignment failed: {0}")]
    BenchmarkAlignmentFailed(String),
    #[error("analysis failed: {0}")]
    AnalysisFailed(String),
}

impl AnalysisError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AnalysisError::InsufficientData(_) => FailureKind::InsufficientData,
            AnalysisError::BenchmarkUnavailable(_) => FailureKind::BenchmarkUnavailable,
            AnalysisError::BenchmarkAlignmentFailed(_) => FailureKind::BenchmarkAlignmentFailed,
            AnalysisError::AnalysisFailed(_) => FailureKind::AnalysisFailed,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AnalysisError::InsufficientData(m)
            | AnalysisError::BenchmarkUnavailable(m)
            | AnalysisError::BenchmarkAlignmentFailed(m)
            | AnalysisError::AnalysisFailed(m) => m,
        }
    }
}
