use crate::ledger::FeeStatement;
use crate::models::{RowRejection, SkippedRow};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::info;

fn file_stem_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Export a student's installment table to CSV, with a totals row at the end
pub fn export_fee_statement(statement: &FeeStatement, dir: &Path) -> Result<PathBuf> {
    // Generate filename with timestamp
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let who = statement
        .student
        .roll_no
        .as_deref()
        .unwrap_or(&statement.student.id);
    let filepath = dir.join(format!("fees_{}_{}.csv", file_stem_safe(who), timestamp));

    let mut wtr = csv::Writer::from_path(&filepath).context("Failed to create CSV file")?;

    wtr.write_record([
        "installment_no",
        "due_date",
        "amount",
        "paid_amount",
        "pending_amount",
        "paid_date",
        "status",
    ])
    .context("Failed to write CSV headers")?;

    for line in &statement.lines {
        wtr.write_record([
            line.installment_no.to_string(),
            format_date(Some(line.due_date)),
            line.amount.to_string(),
            line.paid.to_string(),
            line.pending.to_string(),
            format_date(line.paid_date),
            line.status.to_string(),
        ])
        .context("Failed to write CSV record")?;
    }

    // Totals row against final fees, not the installment sum
    wtr.write_record([
        "total".to_string(),
        String::new(),
        statement.final_fees.to_string(),
        statement.totals.total_collected.to_string(),
        statement.totals.total_pending.to_string(),
        String::new(),
        String::new(),
    ])
    .context("Failed to write CSV totals")?;

    wtr.flush().context("Failed to flush CSV writer")?;

    info!(path = %filepath.display(), "exported fee statement");
    Ok(filepath)
}

/// Export rows the server rejected, plus rows dropped before sending, so they can be fixed
pub fn export_rejections(
    test_id: &str,
    rejections: &[RowRejection],
    skipped: &[SkippedRow],
    dir: &Path,
) -> Result<PathBuf> {
    if rejections.is_empty() && skipped.is_empty() {
        anyhow::bail!("No rejected rows to export");
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let filepath = dir.join(format!("rejections_{}_{}.csv", file_stem_safe(test_id), timestamp));

    let mut wtr = csv::Writer::from_path(&filepath).context("Failed to create CSV file")?;

    wtr.write_record(["source", "row", "student", "reason"])
        .context("Failed to write CSV headers")?;

    for rejection in rejections {
        wtr.write_record([
            "server".to_string(),
            rejection.row.map(|r| r.to_string()).unwrap_or_default(),
            rejection.student.clone().unwrap_or_default(),
            rejection.reason.clone(),
        ])
        .context("Failed to write CSV record")?;
    }

    for row in skipped {
        wtr.write_record([
            "local".to_string(),
            row.line.to_string(),
            String::new(),
            row.reason.clone(),
        ])
        .context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV writer")?;

    info!(path = %filepath.display(), "exported rejected rows");
    Ok(filepath)
}
