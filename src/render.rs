//! Markdown rendering of per-exchange comment sections.
//!
//! One section per exchange/timerange: a header naming the exchange and the
//! trading modes with raw output available, a right-aligned metrics table
//! with one column per report, and a collapsible raw-output block.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::results::{sorted_report_names, ExchangeResults};

/// Trading modes in header/cell order.
pub const TRADING_MODES: [&str; 2] = ["spot", "futures"];

/// Metrics whose numeric values render as percentages.
const PERCENT_METRICS: [&str; 6] = [
    "market_change",
    "max_drawdown",
    "profit_mean_pct",
    "profit_sum_pct",
    "profit_total_pct",
    "winrate",
];

/// First letter uppercased, the rest lowercased.
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// The header prefix stale-comment detection matches on.
pub fn comment_header_prefix(exchange: &str) -> String {
    format!("## {}", capitalize(exchange))
}

fn metric_label(key: &str) -> &str {
    match key {
        "max_drawdown" => "Max Drawdown",
        "profit_mean_pct" => "Profit Mean",
        "profit_sum_pct" => "Profit Sum",
        "market_change" => "Market Change",
        "profit_total_pct" => "Profit Total",
        "winrate" => "Win Rate",
        "duration_avg" => "Average Duration",
        "trades" => "Trades",
        other => other,
    }
}

/// Round to 4 decimal places, trim trailing zeros but keep one decimal digit.
fn format_percent(value: f64) -> String {
    let mut text = format!("{:.4}", value);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.push('0');
    }
    format!("{} %", text)
}

fn render_value(key: &str, value: &Value) -> String {
    match value {
        Value::Number(number) if PERCENT_METRICS.contains(&key) => {
            // Integer inputs keep their shape: `50` renders `50 %`, not `50.0 %`.
            if number.is_f64() {
                number
                    .as_f64()
                    .map(format_percent)
                    .unwrap_or_else(|| number.to_string())
            } else {
                format!("{} %", number)
            }
        }
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// One table cell: the per-mode values for a single report, spot before
/// futures, joined with ` / `. Modes with no data ("n/a") drop out as long
/// as at least one mode has a real value.
fn render_cell(key: &str, per_mode: &BTreeMap<String, Value>) -> String {
    let mut parts = Vec::new();
    for mode in TRADING_MODES {
        if let Some(value) = per_mode.get(mode) {
            parts.push(render_value(key, value));
        }
    }
    for (mode, value) in per_mode {
        if !TRADING_MODES.contains(&mode.as_str()) {
            parts.push(render_value(key, value));
        }
    }

    let real: Vec<String> = parts.into_iter().filter(|part| part != "n/a").collect();
    if real.is_empty() {
        "n/a".to_string()
    } else {
        real.join(" / ")
    }
}

fn output_file_path(base_dir: &Path, exchange: &str, mode: &str, timerange: &str) -> PathBuf {
    base_dir
        .join("current")
        .join(format!("backtest-output-{}-{}-{}.txt", exchange, mode, timerange))
}

/// Render the full comment body for one exchange/timerange.
pub fn render_section(
    repo: &str,
    base_dir: &Path,
    exchange: &str,
    results: &ExchangeResults,
    timerange: &str,
) -> String {
    let report_names = sorted_report_names(&results.names);

    // Trading modes with a raw output file available for this timerange.
    let mut available: Vec<(&str, PathBuf)> = Vec::new();
    for mode in TRADING_MODES {
        let path = output_file_path(base_dir, exchange, mode, timerange);
        if path.exists() {
            available.push((mode, path));
        }
    }

    let prefix = comment_header_prefix(exchange);
    let mut body = if available.is_empty() {
        format!("{} - {}\n\n", prefix, timerange)
    } else {
        let modes: Vec<&str> = available.iter().map(|(mode, _)| *mode).collect();
        format!("{} ({}) - {}\n\n", prefix, modes.join(", "), timerange)
    };

    let mut header_row = String::from("|   ");
    let mut align_row = String::from("| --: ");
    for name in &report_names {
        if name == "Current" {
            header_row.push_str(&format!("| {} ", name));
        } else {
            header_row.push_str(&format!(
                "| [{}](https://github.com/{}/commit/{}) ",
                name, repo, results.names[name]
            ));
        }
        align_row.push_str("| --: ");
    }
    body.push_str(&header_row);
    body.push_str("|\n");
    body.push_str(&align_row);
    body.push_str("|\n");

    if let Some(metrics) = results.timeranges.get(timerange) {
        for (key, per_report) in metrics {
            let mut row = format!("| {} ", metric_label(key));
            for name in &report_names {
                let cell = per_report
                    .get(name)
                    .map(|per_mode| render_cell(key, per_mode))
                    .unwrap_or_else(|| "n/a".to_string());
                row.push_str(&format!("| {} ", cell));
            }
            body.push_str(&row);
            body.push_str("|\n");
        }
    }

    if available.is_empty() {
        body.push_str("\n<details>\n");
        body.push_str("<summary>Detailed Backtest Output</summary>\n");
        body.push_str("⚠️ No backtest output file found for this exchange and timerange.\n");
        body.push_str("</details>\n");
    } else {
        for (mode, path) in &available {
            body.push_str("\n<details>\n");
            if available.len() > 1 {
                body.push_str(&format!(
                    "<summary>Detailed Backtest Output ({}) (click to see details)</summary>\n",
                    mode
                ));
            } else {
                body.push_str("<summary>Detailed Backtest Output (click to see details)</summary>\n");
            }
            match fs::read_to_string(path) {
                Ok(text) => body.push_str(&format!("{}\n", text.trim())),
                Err(error) => body.push_str(&format!("⚠️ Failed to read file: {}\n", error)),
            }
            body.push_str("</details>\n\n");
        }
    }

    body.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn percent_formatting_rounds_to_four_places() {
        assert_eq!(format_percent(12.34567), "12.3457 %");
        assert_eq!(format_percent(0.123_456), "0.1235 %");
    }

    #[test]
    fn percent_formatting_keeps_one_decimal_digit() {
        assert_eq!(format_percent(5.0), "5.0 %");
        assert_eq!(format_percent(10.5), "10.5 %");
    }

    #[test]
    fn capitalize_matches_header_convention() {
        assert_eq!(capitalize("binance"), "Binance");
        assert_eq!(capitalize("OKX"), "Okx");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn known_metric_labels() {
        assert_eq!(metric_label("max_drawdown"), "Max Drawdown");
        assert_eq!(metric_label("winrate"), "Win Rate");
        assert_eq!(metric_label("trades"), "Trades");
        assert_eq!(metric_label("duration_avg"), "Average Duration");
        assert_eq!(metric_label("custom_metric"), "custom_metric");
    }

    #[test]
    fn integer_percentages_render_without_forced_decimal() {
        let per_mode: BTreeMap<String, Value> =
            [("spot".to_string(), json!(50))].into_iter().collect();
        assert_eq!(render_cell("winrate", &per_mode), "50 %");

        let per_mode: BTreeMap<String, Value> =
            [("spot".to_string(), json!(-3))].into_iter().collect();
        assert_eq!(render_cell("max_drawdown", &per_mode), "-3 %");
    }

    #[test]
    fn percentage_cells_format_numbers_and_pass_strings_through() {
        let per_mode: BTreeMap<String, Value> =
            [("spot".to_string(), json!(12.34567))].into_iter().collect();
        assert_eq!(render_cell("winrate", &per_mode), "12.3457 %");

        let per_mode: BTreeMap<String, Value> =
            [("spot".to_string(), json!("n/a"))].into_iter().collect();
        assert_eq!(render_cell("winrate", &per_mode), "n/a");
    }

    #[test]
    fn non_percentage_cells_render_raw() {
        let per_mode: BTreeMap<String, Value> =
            [("spot".to_string(), json!(42))].into_iter().collect();
        assert_eq!(render_cell("trades", &per_mode), "42");

        let per_mode: BTreeMap<String, Value> =
            [("spot".to_string(), json!("1:02:00"))].into_iter().collect();
        assert_eq!(render_cell("duration_avg", &per_mode), "1:02:00");
    }

    #[test]
    fn multi_mode_cells_join_spot_before_futures() {
        let per_mode: BTreeMap<String, Value> = [
            ("futures".to_string(), json!(2.0)),
            ("spot".to_string(), json!(1.0)),
        ]
        .into_iter()
        .collect();
        assert_eq!(render_cell("winrate", &per_mode), "1.0 % / 2.0 %");
    }

    #[test]
    fn multi_mode_cells_drop_missing_modes() {
        let per_mode: BTreeMap<String, Value> = [
            ("futures".to_string(), json!("n/a")),
            ("spot".to_string(), json!(1.0)),
        ]
        .into_iter()
        .collect();
        assert_eq!(render_cell("winrate", &per_mode), "1.0 %");

        let per_mode: BTreeMap<String, Value> = [
            ("futures".to_string(), json!("n/a")),
            ("spot".to_string(), json!("n/a")),
        ]
        .into_iter()
        .collect();
        assert_eq!(render_cell("winrate", &per_mode), "n/a");
    }
}
