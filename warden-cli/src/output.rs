//! Terminal output formatting

use colored::*;
use serde::Serialize;

/// Formats command results for the terminal
pub struct OutputFormatter {
    json: bool,
}

impl OutputFormatter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Whether raw JSON output was requested
    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn print_success(&self, message: &str) {
        println!("{} {}", "✓".bright_green().bold(), message);
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{} {}", "✗".bright_red().bold(), message.bright_red());
    }

    pub fn print_warning(&self, message: &str) {
        println!("{} {}", "⚠".bright_yellow().bold(), message.bright_yellow());
    }

    pub fn print_info(&self, message: &str) {
        println!("{} {}", "ℹ".bright_blue().bold(), message);
    }

    /// Pretty-printed JSON of any reply payload
    pub fn print_json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Two-column key/value listing
    pub fn print_fields(&self, fields: &[(&str, String)]) {
        let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in fields {
            println!("  {:width$}  {}", key.bright_cyan(), value, width = width);
        }
    }

    /// Table with headers and rows
    pub fn print_table(&self, headers: &[&str], rows: &[Vec<String>]) {
        if rows.is_empty() {
            self.print_info("No data to display");
            return;
        }

        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(width) = widths.get_mut(i) {
                    *width = (*width).max(cell.chars().count());
                }
            }
        }

        self.print_separator(&widths, '┌', '┬', '┐');
        print!("│");
        for (header, width) in headers.iter().zip(&widths) {
            print!(" {:width$} │", header.bright_cyan().bold(), width = width);
        }
        println!();
        self.print_separator(&widths, '├', '┼', '┤');

        for row in rows {
            print!("│");
            for (cell, width) in row.iter().zip(&widths) {
                print!(" {:width$} │", cell, width = width);
            }
            println!();
        }
        self.print_separator(&widths, '└', '┴', '┘');
    }

    fn print_separator(&self, widths: &[usize], left: char, middle: char, right: char) {
        let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        println!("{}{}{}", left, segments.join(&middle.to_string()), right);
    }
}

/// Yes/no with color
pub fn flag(value: bool) -> String {
    if value {
        "yes".bright_green().to_string()
    } else {
        "no".bright_red().to_string()
    }
}
