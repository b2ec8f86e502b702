use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{format_scalar, primary_rows};

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => match map.get("result") {
            Some(result) => print_result_table(result, map),
            None => print_flat_object(map),
        },
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{}", value),
    }
}

fn print_result_table(result: &Value, envelope: &Map<String, Value>) {
    if let Value::Object(res_map) = result {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in res_map {
            match val {
                // Nested sections print one line per field
                Value::Object(inner) => {
                    for (k, v) in inner {
                        if !v.is_array() {
                            builder.push_record([format!("{key}.{k}"), format_scalar(v)]);
                        }
                    }
                }
                Value::Array(arr) => {
                    builder.push_record([key.clone(), format!("[{} rows]", arr.len())]);
                }
                _ => builder.push_record([key.clone(), format_scalar(val)]),
            }
        }
        println!("{}", Table::from(builder));

        if let Some(rows) = primary_rows(result) {
            if !rows.is_empty() {
                println!();
                print_array_table(rows);
            }
        }
    } else {
        println!("{}", format_scalar(result));
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_flat_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &format_scalar(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_scalar).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_scalar(item));
        }
    }
}
