//! Terminal text helpers for the CLI's human-readable output. JSON
//! output paths bypass this module entirely.

use colored::Colorize;

pub fn muted(content: impl std::fmt::Display) -> String {
  content.to_string().dimmed().to_string()
}

pub fn bold(content: impl std::fmt::Display) -> String {
  content.to_string().bold().to_string()
}

pub enum Color {
  Red,
  Green,
  Blue,
  Yellow,
}

pub fn colored(content: impl std::fmt::Display, color: Color) -> String {
  let s = content.to_string();
  match color {
    Color::Red => s.red().to_string(),
    Color::Green => s.green().to_string(),
    Color::Blue => s.blue().to_string(),
    Color::Yellow => s.yellow().to_string(),
  }
}

/// Renders an error and its `source()` chain the way the CLI prints
/// a failed reconciliation: one line per cause, indented.
pub fn format_error(error: &anyhow::Error) -> String {
  let chain: Vec<String> =
    error.chain().skip(1).map(|e| e.to_string()).collect();
  let trace = if !chain.is_empty() {
    let mut out = format!("\n\n{}:", muted("CAUSED BY"));
    for (i, msg) in chain.iter().enumerate() {
      out.push_str(&format!("\n\t{}: {msg}", muted(i + 1)));
    }
    out
  } else {
    String::new()
  };
  format!("{}: {error}{trace}", colored("ERROR", Color::Red))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn format_error_includes_top_level_message() {
    let err = anyhow::anyhow!("reconciliation failed");
    let rendered = format_error(&err);
    assert!(rendered.contains("reconciliation failed"));
  }

  #[test]
  fn format_error_includes_source_chain() {
    let err = anyhow::anyhow!("low-level io error")
      .context("failed to write artifact");
    let rendered = format_error(&err);
    assert!(rendered.contains("failed to write artifact"));
    assert!(rendered.contains("low-level io error"));
  }
}
