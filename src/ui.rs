//! Terminal output for CLI commands.

use anyhow::Result;
use metasync::Record;
use serde::Serialize;

/// Width of the table separator line.
const TABLE_WIDTH: usize = 96;

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print records as a table, newest first, followed by a count line.
pub fn print_records(records: &[Record], total: u64) {
    println!(
        "{:<36}  {:<28}  {:>10}  {:<12}  {}",
        "ID", "NAME", "SIZE", "TYPE", "CREATED"
    );
    println!("{}", "-".repeat(TABLE_WIDTH));
    for record in records {
        let created = record
            .created_at
            .map_or_else(|| "-".to_string(), |ts| ts.format("%Y-%m-%d %H:%M").to_string());
        println!(
            "{:<36}  {:<28}  {:>10}  {:<12}  {created}",
            record.id,
            truncate(&record.name, 28),
            format_size(record.size),
            truncate(&record.media_type, 12),
        );
    }
    println!("\n{} of {total} records", records.len());
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('~');
    out
}

/// Human-readable byte size with binary units.
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
