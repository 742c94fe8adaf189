// Analyzer module: rolling indicators, the cup-with-handle rules and their report.

pub mod indicators;
pub mod pattern;
pub mod report;

// Re-export the main Analyzer implementation for ease of use.
pub use pattern::{Analyzer, CupHandleAnalyzer};
pub use report::{AnalysisError, AnalysisReport, ChartSpec};
