//! Output formatting: table, JSON, plain.
//!
//! Backend documents are schemaless, so tables are built column by column
//! with `tabled::builder::Builder` rather than a `Tabled` derive.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde_json::Value;
use tabled::{builder::Builder, settings::Style};

use vitrine_core::ItemId;

use crate::cli::{ColorMode, OutputFormat};

/// Columns shown when `--columns` is not given.
const MAX_AUTO_COLUMNS: usize = 6;

const CELL_WIDTH: usize = 40;

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of documents in the chosen format.
pub fn render_list(format: OutputFormat, items: &[Value], columns: &[String]) -> String {
    match format {
        OutputFormat::Table => {
            let columns = if columns.is_empty() {
                infer_columns(items)
            } else {
                columns.to_vec()
            };
            render_table(items, &columns)
        }
        OutputFormat::Json => render_json(items, false),
        OutputFormat::JsonCompact => render_json(items, true),
        OutputFormat::Plain => items
            .iter()
            .filter_map(ItemId::of)
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Render a single document in the chosen format.
pub fn render_single(format: OutputFormat, doc: &Value) -> String {
    match format {
        OutputFormat::Table => render_detail(doc),
        OutputFormat::Json => render_json(doc, false),
        OutputFormat::JsonCompact => render_json(doc, true),
        OutputFormat::Plain => ItemId::of(doc).map(|id| id.to_string()).unwrap_or_default(),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// A status line on stderr, dimmed when color is on.
pub fn status(message: &str, color: bool, quiet: bool) {
    if quiet {
        return;
    }
    if color {
        eprintln!("{}", message.dimmed());
    } else {
        eprintln!("{message}");
    }
}

// ── Format-specific renderers ────────────────────────────────────────

/// `id` first, then scalar fields in first-seen order.
fn infer_columns(items: &[Value]) -> Vec<String> {
    let mut columns = vec!["id".to_owned()];
    for obj in items.iter().filter_map(Value::as_object) {
        for (name, value) in obj {
            if columns.len() >= MAX_AUTO_COLUMNS {
                return columns;
            }
            let skip = matches!(name.as_str(), "_id" | "id" | "__v")
                || value.is_object()
                || value.is_array();
            if !skip && !columns.contains(name) {
                columns.push(name.clone());
            }
        }
    }
    columns
}

fn render_table(items: &[Value], columns: &[String]) -> String {
    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(String::as_str));
    for doc in items {
        builder.push_record(columns.iter().map(|col| cell(doc, col)));
    }
    builder.build().with(Style::rounded()).to_string()
}

fn render_detail(doc: &Value) -> String {
    let Some(obj) = doc.as_object() else {
        return display_value(doc);
    };
    let mut builder = Builder::default();
    for (name, value) in obj {
        builder.push_record([name.clone(), truncate(&display_value(value))]);
    }
    builder.build().with(Style::rounded()).to_string()
}

fn cell(doc: &Value, column: &str) -> String {
    if column == "id" {
        return ItemId::of(doc).map(|id| id.to_string()).unwrap_or_default();
    }
    doc.get(column)
        .map(|v| truncate(&display_value(v)))
        .unwrap_or_default()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= CELL_WIDTH {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(CELL_WIDTH - 1).collect();
    out.push('…');
    out
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    // Values built from serde_json::Value always serialize.
    rendered.unwrap_or_default()
}
