//! Output formatting for the CLI.

use clap::ValueEnum;
use serde::Serialize;
use summarizer_api_client::Notice;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print a value: `text` renders it for humans, `json` serializes it.
pub fn print<T: Serialize>(value: &T, format: &OutputFormat, text: impl FnOnce(&T)) {
    match format {
        OutputFormat::Text => text(value),
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: could not encode output: {}", e),
        },
    }
}

/// Print a success message.
pub fn print_success(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "status": "success", "message": message }));
        }
    }
}

/// Print an error message.
pub fn print_error(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("Error: {}", message),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "status": "error", "message": message }));
        }
    }
}

/// Print a user-facing notice.
pub fn print_notice(notice: &Notice, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}: {}", notice.title, notice.description),
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "status": "notice", "notice": notice }));
        }
    }
}

/// A failure whose notice has already been printed.
#[derive(Debug)]
pub struct NoticeReported(pub Notice);

impl std::fmt::Display for NoticeReported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.0.title, self.0.description)
    }
}

impl std::error::Error for NoticeReported {}

/// Print `notice` and turn it into the command's error.
pub fn report_failure(notice: Notice, format: &OutputFormat) -> anyhow::Error {
    print_notice(&notice, format);
    NoticeReported(notice).into()
}

/// Print a table row.
pub fn print_row(label: &str, value: &str) {
    println!("  {:<16} {}", format!("{}:", label), value);
}

/// Print a divider line.
pub fn print_divider() {
    println!("{}", "-".repeat(50));
}

/// Print a heading.
pub fn print_heading(text: &str) {
    println!("\n{}", text);
    print_divider();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parses_from_cli_value() {
        assert_eq!(OutputFormat::from_str("json", true).unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("TEXT", true).unwrap(), OutputFormat::Text);
        assert!(OutputFormat::from_str("yaml", true).is_err());
    }
}
