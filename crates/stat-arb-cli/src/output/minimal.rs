use serde_json::Value;

/// Print just the key answer from the output.
///
/// Looks for well-known fields (including one level of nesting, e.g.
/// `backtest.summary`) in priority order, then falls back to the first
/// field of the result.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let priority_paths: [&[&str]; 8] = [
        &["current_position"],
        &["is_cointegrated"],
        &["cointegration", "p_value"],
        &["best", "point"],
        &["summary", "total_return"],
        &["backtest", "summary", "total_return"],
        &["trades"],
        &["points"],
    ];

    for path in priority_paths {
        if let Some(val) = lookup(result_obj, path) {
            if !val.is_null() {
                println!("{}", format_minimal(val));
                return;
            }
        }
    }

    if let Some((key, val)) = result_obj.as_object().and_then(|m| m.iter().next()) {
        println!("{}: {}", key, format_minimal(val));
        return;
    }

    println!("{}", format_minimal(result_obj));
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => format!("{} rows", arr.len()),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
