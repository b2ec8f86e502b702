pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Tabular section of a result, in order of preference: the trade list,
/// the ranked grid, then per-bar spread points.
pub(crate) fn primary_rows(result: &Value) -> Option<&Vec<Value>> {
    let map = result.as_object()?;
    if let Some(Value::Object(bt)) = map.get("backtest") {
        if let Some(Value::Array(trades)) = bt.get("trades") {
            return Some(trades);
        }
    }
    ["trades", "ranked", "points"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_array))
}

/// Render a scalar for a table cell or CSV field.
pub(crate) fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
