// SVG chart output for analysis reports
use crate::analyzer::ChartSpec;
use crate::model::ChartError;
use crate::utils::{escape_html, unique_token};
use std::fmt::Write;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

const WIDTH: f64 = 1200.0;
const HEIGHT: f64 = 600.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 50.0;
const Y_TICKS: usize = 5;
const X_TICKS: usize = 6;
const COLORS: [&str; 6] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b"];

pub trait ChartRenderer: Send + Sync {
    /// Draws `spec` and returns the path of the written file.
    fn render(&self, spec: &ChartSpec) -> Result<PathBuf, ChartError>;
}

/// Writes `chart_<token>.svg` files into a served directory.
pub struct SvgChartRenderer {
    output_dir: PathBuf,
}

impl SvgChartRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Deletes rendered charts last modified at least `max_age` ago.
    /// Returns how many files were removed.
    pub fn prune(&self, max_age: Duration) -> Result<usize, ChartError> {
        let entries = match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with("chart_") && name.ends_with(".svg")) {
                continue;
            }
            let expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.elapsed().ok())
                .is_some_and(|age| age >= max_age);
            if !expired {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove {}: {}", entry.path().display(), e),
            }
        }
        if removed > 0 {
            info!("Pruned {} old charts from {}", removed, self.output_dir.display());
        }
        Ok(removed)
    }
}

impl ChartRenderer for SvgChartRenderer {
    fn render(&self, spec: &ChartSpec) -> Result<PathBuf, ChartError> {
        let svg = draw_svg(spec)?;
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("chart_{}.svg", unique_token()));
        fs::write(&path, svg)?;
        info!("Chart written: {}", path.display());
        Ok(path)
    }
}

fn value_range(spec: &ChartSpec) -> Option<(f64, f64)> {
    let mut values = spec
        .lines
        .iter()
        .flat_map(|l| l.values.iter().copied())
        .filter(|v| v.is_finite());
    let first = values.next()?;
    let (lo, hi) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if hi - lo < f64::EPSILON {
        Some((lo - 1.0, hi + 1.0))
    } else {
        let pad = (hi - lo) * 0.05;
        Some((lo - pad, hi + pad))
    }
}

fn draw_svg(spec: &ChartSpec) -> Result<String, ChartError> {
    if spec.dates.is_empty() || spec.lines.iter().all(|l| l.values.is_empty()) {
        return Err(ChartError::EmptySeries);
    }
    let (lo, hi) = value_range(spec).ok_or(ChartError::EmptySeries)?;

    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let last = (spec.dates.len() - 1).max(1) as f64;
    let x = |i: usize| MARGIN_LEFT + plot_w * i as f64 / last;
    let y = |v: f64| MARGIN_TOP + plot_h * (hi - v) / (hi - lo);

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="28" font-size="18" text-anchor="middle">{}</text>"#,
        WIDTH / 2.0,
        escape_html(&spec.title)
    );

    // Grid and price axis
    for t in 0..=Y_TICKS {
        let v = lo + (hi - lo) * t as f64 / Y_TICKS as f64;
        let py = y(v);
        let _ = writeln!(
            svg,
            r##"<line x1="{MARGIN_LEFT}" y1="{py:.1}" x2="{:.1}" y2="{py:.1}" stroke="#e0e0e0"/>"##,
            WIDTH - MARGIN_RIGHT
        );
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" font-size="11" text-anchor="end">{v:.2}</text>"#,
            MARGIN_LEFT - 6.0,
            py + 4.0
        );
    }

    // Date axis
    let ticks = X_TICKS.min(spec.dates.len());
    for t in 0..ticks {
        let i = if ticks == 1 { 0 } else { t * (spec.dates.len() - 1) / (ticks - 1) };
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" font-size="11" text-anchor="middle">{}</text>"#,
            x(i),
            HEIGHT - MARGIN_BOTTOM + 18.0,
            spec.dates[i]
        );
    }
    let _ = writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" font-size="12" text-anchor="middle">Date</text>"#,
        MARGIN_LEFT + plot_w / 2.0,
        HEIGHT - 8.0
    );
    let _ = writeln!(
        svg,
        r#"<text x="16" y="{:.1}" font-size="12" text-anchor="middle" transform="rotate(-90 16 {:.1})">Price</text>"#,
        MARGIN_TOP + plot_h / 2.0,
        MARGIN_TOP + plot_h / 2.0
    );

    for (n, line) in spec.lines.iter().enumerate() {
        let color = COLORS[n % COLORS.len()];
        let points: Vec<String> = line
            .values
            .iter()
            .enumerate()
            .take(spec.dates.len())
            .filter(|(_, v)| v.is_finite())
            .map(|(i, &v)| format!("{:.1},{:.1}", x(i), y(v)))
            .collect();
        let dash = if line.dashed { r#" stroke-dasharray="6 4""# } else { "" };
        let width = if line.dashed { 1.2 } else { 2.0 };
        let _ = writeln!(
            svg,
            r#"<polyline fill="none" stroke="{color}" stroke-width="{width}"{dash} points="{}"/>"#,
            points.join(" ")
        );

        // Legend
        let ly = MARGIN_TOP + 10.0 + 18.0 * n as f64;
        let lx = MARGIN_LEFT + 12.0;
        let _ = writeln!(
            svg,
            r#"<line x1="{lx:.1}" y1="{ly:.1}" x2="{:.1}" y2="{ly:.1}" stroke="{color}" stroke-width="{width}"{dash}/>"#,
            lx + 24.0
        );
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" font-size="12">{}</text>"#,
            lx + 30.0,
            ly + 4.0,
            escape_html(&line.label)
        );
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}
