//! Settlement reports over the ledger.
//!
//! Everything here is pure: it takes transactions and returns new rows.
pub mod export;

use crate::money::Money;
use crate::store::RowId;
use crate::transaction::{DISPLAY_DATE_FORMAT, Kind, Transaction, capitalize};
use anyhow::{Context, Error, Result, bail};
use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const OPENING_BALANCE_LABEL: &str = "Opening Balance";

/// A transaction with the running balance after applying it.
#[derive(Debug, Clone, PartialEq)]
pub struct Balanced {
    pub transaction: Transaction,
    pub balance: i64,
}

/// Sorts by `(date, id)` and annotates each transaction with the running balance.
pub fn compute_running_balance(transactions: &[Transaction]) -> Vec<Balanced> {
    transactions
        .iter()
        .sorted_by_key(|tx| (tx.date, tx.id))
        .scan(0i64, |balance, tx| {
            *balance += tx.signed_amount();
            Some(Balanced {
                transaction: tx.clone(),
                balance: *balance,
            })
        })
        .collect()
}

/// Inclusive date range of a windowed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Window { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Parses `START..END`.
impl FromStr for Window {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = s
            .split_once("..")
            .with_context(|| format!("Window must look like START..END: '{}'", s))?;
        Ok(Window {
            start: crate::transaction::parse_date(start)?,
            end: crate::transaction::parse_date(end)?,
        })
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format(DISPLAY_DATE_FORMAT),
            self.end.format(DISPLAY_DATE_FORMAT)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReportMode {
    /// Everything since the books last balanced to exactly zero.
    SinceLastSettlement,
    Window(Window),
}

/// One display row. Exactly one of the two date columns is filled for a
/// transaction; the opening balance row fills neither.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub index: Option<usize>,
    pub id: Option<RowId>,
    pub kind: Option<Kind>,
    pub expense_date: String,
    pub income_date: String,
    pub description: String,
    pub amount: i64,
    pub balance: i64,
    pub receipt_link: String,
}

impl ReportRow {
    fn opening(balance: i64) -> Self {
        ReportRow {
            index: None,
            id: None,
            kind: None,
            expense_date: String::new(),
            income_date: String::new(),
            description: OPENING_BALANCE_LABEL.to_string(),
            amount: 0,
            balance,
            receipt_link: String::new(),
        }
    }

    fn from_transaction(index: usize, tx: &Transaction, balance: i64) -> Self {
        let date = tx.date.format(DISPLAY_DATE_FORMAT).to_string();
        let (expense_date, income_date) = match tx.kind {
            Kind::Expense => (date, String::new()),
            Kind::Income => (String::new(), date),
        };
        ReportRow {
            index: Some(index),
            id: Some(tx.id),
            kind: Some(tx.kind),
            expense_date,
            income_date,
            description: capitalize(&tx.description),
            amount: tx.amount,
            balance,
            receipt_link: tx.receipt_link.clone(),
        }
    }

    pub fn is_opening(&self) -> bool {
        self.kind.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub mode: ReportMode,
    pub rows: Vec<ReportRow>,
    pub opening_balance: i64,
    pub closing_balance: i64,
    pub total_income: i64,
    pub total_expense: i64,
}

impl Report {
    fn new(
        mode: ReportMode,
        rows: Vec<ReportRow>,
        opening_balance: i64,
        closing_balance: i64,
    ) -> Self {
        let (total_income, total_expense) =
            rows.iter().fold((0, 0), |(income, expense), row| match row.kind {
                Some(Kind::Income) => (income + row.amount, expense),
                Some(Kind::Expense) => (income, expense + row.amount),
                None => (income, expense),
            });
        Report {
            mode,
            rows,
            opening_balance,
            closing_balance,
            total_income,
            total_expense,
        }
    }

    /// Rows that stand for real transactions.
    pub fn transactions(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows.iter().filter(|row| !row.is_opening())
    }

    pub fn title(&self) -> String {
        match self.mode {
            ReportMode::SinceLastSettlement => "Settlement since last zero balance".to_string(),
            ReportMode::Window(window) => format!("Settlement {}", window),
        }
    }
}

/// Builds a settlement report.
///
/// Without a window, reports since the last exact zero of the running
/// balance, or only income if the ledger currently balances to zero. With a
/// window, starts from a synthetic opening balance row.
pub fn build_settlement_report(transactions: &[Transaction], window: Option<Window>) -> Report {
    let balanced = compute_running_balance(transactions);
    match window {
        None => since_last_settlement(&balanced),
        Some(window) => windowed(&balanced, window),
    }
}

fn since_last_settlement(balanced: &[Balanced]) -> Report {
    let closing = balanced.last().map_or(0, |b| b.balance);
    let selected: Vec<&Transaction> = if balanced.is_empty() {
        Vec::new()
    } else if closing == 0 {
        balanced
            .iter()
            .map(|b| &b.transaction)
            .filter(|tx| tx.kind.is_income())
            .collect()
    } else {
        // exact zero only: a balance that jumps over zero is not a settlement
        let start = balanced
            .iter()
            .rposition(|b| b.balance == 0)
            .map_or(0, |i| i + 1);
        balanced[start..].iter().map(|b| &b.transaction).collect()
    };
    let rows = selected
        .into_iter()
        .enumerate()
        .scan(0i64, |balance, (i, tx)| {
            *balance += tx.signed_amount();
            Some(ReportRow::from_transaction(i + 1, tx, *balance))
        })
        .collect();
    Report::new(ReportMode::SinceLastSettlement, rows, 0, closing)
}

fn windowed(balanced: &[Balanced], window: Window) -> Report {
    let opening = balanced
        .iter()
        .take_while(|b| b.transaction.date < window.start)
        .last()
        .map_or(0, |b| b.balance);
    let mut rows = vec![ReportRow::opening(opening)];
    let mut balance = opening;
    rows.extend(
        balanced
            .iter()
            .map(|b| &b.transaction)
            .filter(|tx| window.contains(tx.date))
            .enumerate()
            .map(|(i, tx)| {
                balance += tx.signed_amount();
                ReportRow::from_transaction(i + 1, tx, balance)
            }),
    );
    Report::new(ReportMode::Window(window), rows, opening, balance)
}

/// Checks that a report's balance column is consistent with its amounts.
pub fn verify(report: &Report) -> Result<()> {
    let mut balance = report.opening_balance;
    for row in report.transactions() {
        balance += row.kind.map_or(0, |kind| kind.signed(row.amount));
        if balance != row.balance {
            bail!(
                "Balance mismatch at row {:?}: expected {}, found {}",
                row.index,
                balance,
                row.balance
            );
        }
    }
    Ok(())
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title())?;
        writeln!(
            f,
            "{:>4} | {:12} | {:11} | {:32} | {:>16} | {:>16} | {:>16}",
            "#", "Expense date", "Income date", "Description", "Income", "Expense", "Balance"
        )?;
        for row in &self.rows {
            let index = row.index.map(|i| i.to_string()).unwrap_or_default();
            let (income, expense) = match row.kind {
                Some(Kind::Income) => (Money::from(row.amount).to_string(), String::new()),
                Some(Kind::Expense) => (String::new(), Money::from(row.amount).to_string()),
                None => (String::new(), String::new()),
            };
            writeln!(
                f,
                "{:>4} | {:12} | {:11} | {:32} | {:>16} | {:>16} | {:>16}",
                index,
                row.expense_date,
                row.income_date,
                row.description,
                income,
                expense,
                Money::from(row.balance).to_string()
            )?;
        }
        write!(
            f,
            "{:>4} | {:12} | {:11} | {:32} | {:>16} | {:>16} | {:>16}",
            "",
            "",
            "",
            "Total",
            Money::from(self.total_income).to_string(),
            Money::from(self.total_expense).to_string(),
            Money::from(self.closing_balance).to_string()
        )
    }
}

#[cfg(test)]
mod report_tests {
    use super::*;
    use crate::transaction::Kind::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn tx(id: RowId, day: u32, kind: Kind, amount: i64) -> Transaction {
        Transaction {
            id,
            date: d(day),
            kind,
            amount,
            description: format!("tx {id}"),
            receipt_link: String::new(),
        }
    }

    fn ids(report: &Report) -> Vec<RowId> {
        report.transactions().filter_map(|row| row.id).collect()
    }

    #[test]
    fn running_balance_orders_by_date_then_id() {
        let txs = vec![
            tx(3, 2, Expense, 50),
            tx(1, 3, Income, 10),
            tx(2, 2, Income, 100),
        ];
        let balanced = compute_running_balance(&txs);
        let order: Vec<_> = balanced.iter().map(|b| b.transaction.id).collect();
        let balances: Vec<_> = balanced.iter().map(|b| b.balance).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(balances, vec![100, 50, 60]);
        assert_eq!(compute_running_balance(&txs), balanced, "idempotent");
    }

    #[test]
    fn running_balance_ends_at_signed_sum() {
        let txs = vec![
            tx(1, 9, Income, 700),
            tx(2, 1, Expense, 250),
            tx(3, 4, Expense, 1000),
            tx(4, 4, Income, 30),
        ];
        let income: i64 = txs.iter().filter(|t| t.kind == Income).map(|t| t.amount).sum();
        let expense: i64 = txs.iter().filter(|t| t.kind == Expense).map(|t| t.amount).sum();
        let balanced = compute_running_balance(&txs);
        assert_eq!(balanced.last().map(|b| b.balance), Some(income - expense));
        assert!(balanced.windows(2).all(|w| {
            let (a, b) = (&w[0].transaction, &w[1].transaction);
            a.date < b.date || (a.date == b.date && a.id < b.id)
        }));
    }

    #[test]
    fn empty_input() {
        assert!(compute_running_balance(&[]).is_empty());

        let report = build_settlement_report(&[], None);
        assert!(report.rows.is_empty());
        assert_eq!(report.closing_balance, 0);

        let report = build_settlement_report(&[], Some(Window::new(d(1), d(31))));
        assert_eq!(report.rows, vec![ReportRow::opening(0)]);
        assert_eq!(report.closing_balance, 0);
    }

    #[test]
    fn settled_ledger_reports_income_only() {
        let txs = vec![tx(1, 1, Income, 100_000), tx(2, 2, Expense, 100_000)];
        let report = build_settlement_report(&txs, None);
        assert_eq!(ids(&report), vec![1]);
        assert_eq!(report.rows[0].amount, 100_000);
        assert_eq!(report.rows[0].balance, 100_000);
        assert_eq!(report.closing_balance, 0);
        assert_eq!(report.total_expense, 0);
    }

    #[test]
    fn never_settled_reports_everything() {
        let txs = vec![
            tx(1, 1, Income, 500_000),
            tx(2, 2, Expense, 200_000),
            tx(3, 3, Income, 100_000),
        ];
        let report = build_settlement_report(&txs, None);
        assert_eq!(ids(&report), vec![1, 2, 3]);
        let balances: Vec<_> = report.rows.iter().map(|r| r.balance).collect();
        assert_eq!(balances, vec![500_000, 300_000, 400_000]);
        assert_eq!(report.opening_balance, 0);
        assert_eq!(report.closing_balance, 400_000);
        verify(&report).unwrap();
    }

    #[test]
    fn reports_after_last_exact_zero() {
        let txs = vec![
            tx(1, 1, Income, 100),
            tx(2, 2, Expense, 100), // zero
            tx(3, 3, Income, 50),
            tx(4, 4, Expense, 50), // zero again, the last one
            tx(5, 5, Income, 80),
            tx(6, 6, Expense, 30),
        ];
        let report = build_settlement_report(&txs, None);
        assert_eq!(ids(&report), vec![5, 6]);
        let indexes: Vec<_> = report.rows.iter().map(|r| r.index).collect();
        assert_eq!(indexes, vec![Some(1), Some(2)]);
        assert_eq!(report.closing_balance, 50);
        verify(&report).unwrap();
    }

    #[test]
    fn crossing_zero_is_not_a_reset() {
        let txs = vec![
            tx(1, 1, Income, 100),
            tx(2, 2, Expense, 150), // -50, crosses without landing on zero
            tx(3, 3, Income, 80),
        ];
        let report = build_settlement_report(&txs, None);
        assert_eq!(ids(&report), vec![1, 2, 3]);
    }

    #[test]
    fn window_starts_from_opening_balance() {
        let txs = vec![
            tx(1, 1, Income, 500_000),
            tx(2, 2, Expense, 200_000),
            tx(3, 3, Income, 100_000),
        ];
        let report = build_settlement_report(&txs, Some(Window::new(d(2), d(2))));
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0], ReportRow::opening(500_000));
        assert_eq!(report.rows[1].id, Some(2));
        assert_eq!(report.rows[1].balance, 300_000);
        assert_eq!(report.opening_balance, 500_000);
        assert_eq!(report.closing_balance, 300_000);
        verify(&report).unwrap();
    }

    #[test]
    fn opening_balance_follows_last_row_of_the_day_before() {
        // stored out of order: the highest id on day 4 must close the day
        let txs = vec![
            tx(5, 4, Expense, 30),
            tx(1, 1, Income, 1_000),
            tx(2, 4, Income, 200),
            tx(4, 5, Expense, 100),
            tx(3, 4, Expense, 500),
        ];
        let report = build_settlement_report(&txs, Some(Window::new(d(5), d(5))));
        assert_eq!(report.opening_balance, 670);
        assert_eq!(report.rows[0], ReportRow::opening(670));
        assert_eq!(ids(&report), vec![4]);
        assert_eq!(report.closing_balance, 570);
        verify(&report).unwrap();

        let report = build_settlement_report(&txs, Some(Window::new(d(4), d(5))));
        assert_eq!(report.opening_balance, 1_000);
        assert_eq!(ids(&report), vec![2, 3, 5, 4]);
        let balances: Vec<_> = report.transactions().map(|r| r.balance).collect();
        assert_eq!(balances, vec![1_200, 700, 670, 570]);
    }

    #[test]
    fn empty_window_closes_at_opening() {
        let txs = vec![tx(1, 1, Income, 500), tx(2, 20, Expense, 200)];
        let report = build_settlement_report(&txs, Some(Window::new(d(5), d(10))));
        assert_eq!(report.rows, vec![ReportRow::opening(500)]);
        assert_eq!(report.closing_balance, 500);

        let inverted = build_settlement_report(&txs, Some(Window::new(d(10), d(5))));
        assert_eq!(inverted.rows, vec![ReportRow::opening(500)]);
    }

    #[test]
    fn rows_split_dates_by_kind() {
        let mut expense = tx(1, 3, Expense, 10);
        expense.description = "mua SẮT".to_string();
        let report = build_settlement_report(&[expense, tx(2, 4, Income, 20)], None);
        assert_eq!(report.rows[0].expense_date, "03/05/2024");
        assert_eq!(report.rows[0].income_date, "");
        assert_eq!(report.rows[0].description, "Mua sắt");
        assert_eq!(report.rows[1].expense_date, "");
        assert_eq!(report.rows[1].income_date, "04/05/2024");
    }

    #[test]
    fn window_parse() -> Result<()> {
        let window: Window = "2024-05-01..2024-05-31".parse()?;
        assert_eq!(window, Window::new(d(1), d(31)));
        assert!("2024-05-01".parse::<Window>().is_err());
        Ok(())
    }

    #[test]
    fn display_has_totals_footer() {
        let txs = vec![tx(1, 1, Income, 500_000), tx(2, 2, Expense, 200_000)];
        let text = build_settlement_report(&txs, None).to_string();
        let last = text.lines().last().unwrap_or_default();
        assert!(last.contains("Total"));
        assert!(last.contains("500.000 đ"));
        assert!(last.contains("300.000 đ"));
    }
}
