use serde_json::Value;
use std::io;

use super::{format_scalar, primary_rows};

/// Write output as CSV to stdout.
///
/// Results carrying trades, a ranked grid or spread points are written as
/// one row per element; anything else becomes a `field,value` listing.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Some(rows) = primary_rows(result) {
        write_array_csv(&mut wtr, rows);
    } else if let Value::Object(map) = result {
        let _ = wtr.write_record(["field", "value"]);
        for (key, val) in map {
            let _ = wtr.write_record([key.as_str(), &format_scalar(val)]);
        }
    } else {
        let _ = wtr.write_record([&format_scalar(result)]);
    }

    let _ = wtr.flush();
}

fn write_array_csv(wtr: &mut csv::Writer<io::StdoutLock<'_>>, arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        return;
    };
    let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
    let _ = wtr.write_record(&headers);

    for item in arr {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(*h).map(format_scalar).unwrap_or_default())
                .collect();
            let _ = wtr.write_record(&row);
        }
    }
}
