//! Terminal rendering for import summaries and export file naming.
//!
//! Summaries stay bounded: long change lists are previewed rather than
//! printed in full, and the complete per-row detail goes to the log file.

use crate::core::diff::{Diff, DiffEntry};
use crate::core::error::PceResult;
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;

const PREVIEW_ROWS: usize = 20;
const PREVIEW_FIELDS: usize = 6;
const LINE_CHARS: usize = 120;

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Render up to `max_items` messages joined with `sep`.
pub fn preview_messages(messages: &[String], max_items: usize, sep: &str) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let shown = messages
        .iter()
        .take(max_items)
        .map(|m| compact_line(m, LINE_CHARS))
        .collect::<Vec<_>>()
        .join(sep);
    if messages.len() > max_items {
        format!("{}{}(+{} more)", shown, sep, messages.len() - max_items)
    } else {
        shown
    }
}

fn entry_line(verb: &str, entry: &DiffEntry) -> String {
    let fields: Vec<String> = entry.changed_fields().iter().map(|f| f.to_string()).collect();
    compact_line(
        &format!(
            "{} line {} {}: {}",
            verb,
            entry.line,
            entry.target,
            preview_messages(&fields, PREVIEW_FIELDS, ", ")
        ),
        LINE_CHARS,
    )
}

/// Print what an import would do.
pub fn print_summary(out: &mut dyn Write, command: &str, diff: &Diff) -> PceResult<()> {
    writeln!(
        out,
        "{} {} to update, {} to create, {} unchanged, {} skipped, {} new label(s)",
        format!("{}:", command).bold(),
        diff.updates.len().to_string().yellow(),
        diff.creates.len().to_string().green(),
        diff.unchanged,
        diff.skipped,
        diff.new_labels.len()
    )?;
    for label in &diff.new_labels {
        writeln!(out, "  new label {}:{}", label.key, label.value)?;
    }
    let mut lines: Vec<String> = diff.updates.iter().map(|e| entry_line("update", e)).collect();
    lines.extend(diff.creates.iter().map(|e| entry_line("create", e)));
    if !lines.is_empty() {
        writeln!(out, "  {}", preview_messages(&lines, PREVIEW_ROWS, "\n  "))?;
    }
    Ok(())
}

pub fn print_done(out: &mut dyn Write, message: &str) -> PceResult<()> {
    writeln!(out, "{} {}", "done:".green().bold(), message)?;
    Ok(())
}

/// Unix-epoch seconds.
pub fn timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `--output-file` if given, otherwise `<command>-<epoch>.csv`.
pub fn export_file_name(command: &str, output_file: Option<PathBuf>) -> PathBuf {
    output_file.unwrap_or_else(|| PathBuf::from(format!("{}-{}.csv", command, timestamp())))
}
