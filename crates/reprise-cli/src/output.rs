//! Output formatting for CLI

use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Generic two-column row
#[derive(Tabled)]
pub struct FieldRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl FieldRow {
    pub fn new(field: &str, value: impl ToString) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// A command result renderable in every output format
pub trait Report: Serialize {
    type Row: Tabled;

    fn rows(&self) -> Vec<Self::Row>;

    fn text(&self) -> String;
}

/// Format a report based on the selected format
pub fn render<R: Report>(report: &R, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
        OutputFormat::Table => Table::new(report.rows()).with(Style::rounded()).to_string(),
        OutputFormat::Text => report.text(),
    })
}

/// Print a report to stdout
pub fn emit<R: Report>(report: &R, format: OutputFormat) -> anyhow::Result<()> {
    println!("{}", render(report, format)?);
    Ok(())
}
