use crate::cli::OutputFormat;
use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", to_pretty(value)),
        OutputFormat::Table => print_as_table(value),
    }
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print rows of label/value pairs as a rounded table.
pub fn print_pairs(rows: &[(&str, String)]) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (label, value) in rows {
        builder.push_record([label.to_string(), value.clone()]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

fn print_as_table(value: &Value) {
    match value {
        Value::Object(obj) if !obj.is_empty() => {
            let rows: Vec<(&str, String)> = obj
                .iter()
                .map(|(k, v)| (k.as_str(), cell(v)))
                .collect();
            print_pairs(&rows);
        }
        Value::Array(items) if !items.is_empty() => {
            let mut builder = Builder::default();
            builder.push_record(["#", "Value"]);
            for (i, item) in items.iter().enumerate() {
                builder.push_record([i.to_string(), cell(item)]);
            }
            println!("{}", builder.build().with(Style::rounded()));
        }
        other => println!("{}", to_pretty(other)),
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
