//! Writes a [`Report`] as a workbook sheet that spreadsheet programs can open.
use super::{Report, ReportMode};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const COLUMNS: &[&str] = &[
    "STT",
    "Expense date",
    "Income date",
    "Description",
    "Kind",
    "Income",
    "Expense",
    "Balance",
    "Receipt",
];

/// Banner row, header row, one row per report row, then a totals footer.
///
/// The `Kind` column carries `Thu`/`Chi` for conditional row colouring.
/// Amounts are written as plain integers so they stay numeric in the sheet.
pub fn write_workbook<W: Write>(report: &Report, writer: W) -> Result<()> {
    let mut csv = csv::WriterBuilder::new().flexible(true).from_writer(writer);

    let banner = match report.mode {
        ReportMode::SinceLastSettlement => report.title(),
        ReportMode::Window(_) => format!(
            "{} (opening balance {})",
            report.title(),
            report.opening_balance
        ),
    };
    csv.write_record([banner.as_str()])?;
    csv.write_record(COLUMNS)?;

    for row in &report.rows {
        let (kind, income, expense) = match row.kind {
            Some(kind) if kind.is_income() => {
                (kind.to_string(), row.amount.to_string(), String::new())
            }
            Some(kind) => (kind.to_string(), String::new(), row.amount.to_string()),
            None => (String::new(), String::new(), String::new()),
        };
        csv.write_record([
            row.index.map(|i| i.to_string()).unwrap_or_default(),
            row.expense_date.clone(),
            row.income_date.clone(),
            row.description.clone(),
            kind,
            income,
            expense,
            row.balance.to_string(),
            row.receipt_link.clone(),
        ])?;
    }

    csv.write_record([
        String::new(),
        String::new(),
        String::new(),
        "Total".to_string(),
        String::new(),
        report.total_income.to_string(),
        report.total_expense.to_string(),
        report.closing_balance.to_string(),
        String::new(),
    ])?;
    csv.flush()?;
    Ok(())
}

pub fn to_file(report: &Report, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create export file {}", path.display()))?;
    write_workbook(report, file)
        .with_context(|| format!("Failed to write export file {}", path.display()))?;
    tracing::info!("Exported {} rows to {}", report.rows.len(), path.display());
    Ok(())
}
