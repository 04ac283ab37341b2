use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

/// Two-column FIELD/VALUE table.
pub fn print_fields(fields: &[(&str, String)]) {
    let mut table = table(&["FIELD", "VALUE"]);
    for (name, value) in fields {
        table.add_row(vec![name.to_string(), value.clone()]);
    }
    println!("{table}");
}

/// `name: value` lines, names aligned.
pub fn print_pretty_fields(title: &str, fields: &[(&str, String)]) {
    println!("{title}:");
    let width = fields.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, value) in fields {
        println!("  {:<width$}  {value}", format!("{name}:"), width = width + 1);
    }
}

/// Thread address as the target prints it, padded to its word size.
pub fn format_address(address: u64, word_size: usize) -> String {
    let digits = word_size.clamp(1, 8) * 2;
    format!("0x{address:0digits$X}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_pad_to_word_size() {
        assert_eq!(format_address(0x1234, 4), "0x00001234");
        assert_eq!(format_address(0xBEEF, 2), "0xBEEF");
        assert_eq!(format_address(0x1, 0), "0x01");
    }
}
