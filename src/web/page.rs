// HTML for the form page
use super::handler::Analysis;
use crate::analyzer::AnalysisError;
use crate::model::{Market, TickerEntry};
use crate::utils::escape_html;
use std::fmt::Write;

pub struct IndexView<'a> {
    pub market: Market,
    pub tickers: &'a [TickerEntry],
    pub selected_ticker: &'a str,
    pub custom_ticker: &'a str,
    pub outcome: Option<&'a Result<Analysis, AnalysisError>>,
}

const STYLE: &str = "body{font-family:sans-serif;max-width:1280px;margin:2em auto;padding:0 1em}\
form{display:flex;gap:.8em;flex-wrap:wrap;align-items:center}\
select,input,button{font-size:1em;padding:.3em}\
pre{background:#f6f8fa;padding:1em;white-space:pre-wrap}\
table{border-collapse:collapse;margin:1em 0}td,th{border:1px solid #ddd;padding:.3em .8em;text-align:left}\
.pass{color:#1a7f37}.fail{color:#cf222e}.error{color:#cf222e;font-weight:bold}\
img{max-width:100%}";

fn condition_label(key: &str) -> &'static str {
    match key {
        "handle_above_ma50" => "Handle high above MA50",
        "ma_stacked" => "MA50 > MA150 > MA200",
        "ma200_uptrend" => "MA200 rising for 30 days",
        "near_52w_high" => "Handle within 25% of 52-week high",
        "above_52w_low" => "Handle 25%+ above 52-week low",
        "volume_spike" => "Volume spike in handle",
        "strong_relative_strength" => "Relative strength above 3x",
        "shallow_handle" => "Handle pullback at most 10%",
        "quiet_handle_volume" => "Handle volume below 50-day average",
        "no_heavy_red_volume" => "No heavy red volume before handle",
        _ => "Unknown condition",
    }
}

pub fn render(view: &IndexView) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
<title>Cup with Handle scanner</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
<h1>Cup with Handle scanner</h1>\n"
    );

    render_form(&mut html, view);

    match view.outcome {
        Some(Ok(analysis)) => render_analysis(&mut html, analysis),
        Some(Err(e)) => {
            let _ = writeln!(html, "<p class=\"error\">{}</p>", escape_html(&e.to_string()));
        }
        None => {}
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn render_form(html: &mut String, view: &IndexView) {
    html.push_str("<form method=\"post\" action=\"/\">\n");
    html.push_str(
        "<label>Market <select name=\"market\" onchange=\"location.href='/?market='+this.value\">\n",
    );
    for market in Market::ALL {
        let selected = if market == view.market { " selected" } else { "" };
        let _ = writeln!(html, "<option value=\"{market}\"{selected}>{market}</option>");
    }
    html.push_str("</select></label>\n");

    html.push_str("<label>Ticker <select name=\"ticker\">\n<option value=\"\">--</option>\n");
    for entry in view.tickers {
        let symbol = escape_html(&entry.symbol);
        let selected = if entry.symbol == view.selected_ticker { " selected" } else { "" };
        let label = if entry.name.is_empty() {
            symbol.clone()
        } else {
            format!("{} - {}", symbol, escape_html(&entry.name))
        };
        let _ = writeln!(html, "<option value=\"{symbol}\"{selected}>{label}</option>");
    }
    html.push_str("</select></label>\n");

    let _ = writeln!(
        html,
        "<label>Or type a ticker <input type=\"text\" name=\"custom_ticker\" value=\"{}\" placeholder=\"AAPL / 005930\"></label>",
        escape_html(view.custom_ticker)
    );
    html.push_str("<button type=\"submit\">Analyze</button>\n</form>\n");
}

fn render_analysis(html: &mut String, analysis: &Analysis) {
    let report = &analysis.report;
    let heading = match &analysis.name {
        Some(name) => format!("{} ({})", escape_html(&analysis.symbol), escape_html(name)),
        None => escape_html(&analysis.symbol),
    };
    let _ = writeln!(html, "<h2>{heading}</h2>");
    let _ = writeln!(html, "<pre>{}</pre>", escape_html(&report.summary()));

    html.push_str("<table>\n<tr><th>Condition</th><th>Result</th></tr>\n");
    for (key, ok) in report.conditions.checklist() {
        let (class, mark) = if ok { ("pass", "pass") } else { ("fail", "fail") };
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td class=\"{class}\">{mark}</td></tr>",
            escape_html(condition_label(key))
        );
    }
    html.push_str("</table>\n");

    if let Some(plan) = &report.trade_plan {
        let _ = writeln!(
            html,
            "<table>\n<tr><th>Entry</th><th>Target 1</th><th>Target 2</th><th>Stop</th></tr>\n\
<tr><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td></tr>\n</table>",
            plan.entry, plan.target1, plan.target2, plan.stop
        );
    }

    if let Some(url) = &analysis.chart_url {
        let _ = writeln!(
            html,
            "<img src=\"{}\" alt=\"{} chart\">",
            escape_html(url),
            escape_html(&analysis.symbol)
        );
    }
}
