pub mod raw;

use crate::money::Money;
use crate::store::{Fields, RowId};
use anyhow::{Context, Error, Result, anyhow, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Date format of the stored date column.
pub const STORE_DATE_FORMAT: &str = "%Y-%m-%d";
/// Date format used in reports and exports.
pub const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y";
/// Largest amount a single row may carry, one trillion đồng.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Income,
    Expense,
}

impl Kind {
    /// Contribution of `amount` to the running balance.
    pub fn signed(&self, amount: i64) -> i64 {
        match self {
            Kind::Income => amount,
            Kind::Expense => -amount,
        }
    }

    pub fn is_income(&self) -> bool {
        matches!(self, Kind::Income)
    }
}

/// Stored as the literals `Thu` and `Chi`.
impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Income => write!(f, "Thu"),
            Kind::Expense => write!(f, "Chi"),
        }
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "thu" | "income" => Ok(Kind::Income),
            "chi" | "expense" => Ok(Kind::Expense),
            _ => Err(anyhow!("Not a transaction kind: '{}'", s)),
        }
    }
}

/// Upper-cases the first character and lower-cases the rest.
pub fn capitalize(s: &str) -> String {
    let s = s.trim();
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Parses the stored date, also accepting `DD/MM/YYYY` and a trailing time.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    let date_part = s.split([' ', 'T']).next().unwrap_or(s);
    NaiveDate::parse_from_str(date_part, STORE_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(date_part, DISPLAY_DATE_FORMAT))
        .with_context(|| format!("Invalid date: '{}'", s))
}

/// A ledger row that passed the load boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: RowId,
    pub date: NaiveDate,
    pub kind: Kind,
    pub amount: i64,
    pub description: String,
    pub receipt_link: String,
}

impl Transaction {
    /// Builds a transaction from stored cells.
    ///
    /// Unreadable, negative or out of range amounts become 0. A row without a
    /// readable date or kind is an error, and callers skip it.
    pub fn from_fields(id: RowId, fields: Fields) -> Result<Self> {
        let row = raw::Row::from(fields);
        let date = parse_date(&row.date).with_context(|| format!("Row {}", id))?;
        let kind = row.kind.parse().with_context(|| format!("Row {}", id))?;
        let amount = match row.amount.parse::<Money>() {
            Ok(money) => money.round_units(),
            Err(err) => {
                tracing::warn!("Row {}: {:#}, using 0", id, err);
                0
            }
        };
        let amount = if (0..=MAX_AMOUNT).contains(&amount) {
            amount
        } else {
            tracing::warn!("Row {}: amount {} out of range, using 0", id, row.amount);
            0
        };
        Ok(Transaction {
            id,
            date,
            kind,
            amount,
            description: row.description,
            receipt_link: row.receipt_link,
        })
    }

    pub fn signed_amount(&self) -> i64 {
        self.kind.signed(self.amount)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amount = Money::from(self.signed_amount()).to_string();
        let receipt = if self.receipt_link.is_empty() { "" } else { "📎" };
        write!(
            f,
            "{:>4} | {} | {} | {:>16} | {:32} | {}",
            self.id,
            self.date.format(DISPLAY_DATE_FORMAT),
            self.kind,
            amount,
            self.description,
            receipt
        )
    }
}

/// Input of the add and edit forms.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub kind: Kind,
    pub amount: i64,
    pub description: String,
    pub receipt_link: String,
}

impl NewTransaction {
    pub fn new(date: NaiveDate, kind: Kind, amount: i64, description: &str) -> Self {
        NewTransaction {
            date,
            kind,
            amount,
            description: description.to_owned(),
            receipt_link: String::new(),
        }
    }

    pub fn with_receipt(mut self, link: &str) -> Self {
        self.receipt_link = link.to_owned();
        self
    }

    /// Rejects non-positive amounts and capitalizes the description.
    pub fn validated(self) -> Result<Self> {
        if self.amount <= 0 {
            bail!("Amount must be greater than 0, got {}", self.amount);
        }
        if self.amount > MAX_AMOUNT {
            bail!("Amount must not exceed {}, got {}", MAX_AMOUNT, self.amount);
        }
        Ok(NewTransaction {
            description: capitalize(&self.description),
            ..self
        })
    }

    pub fn to_fields(&self) -> Fields {
        raw::Row {
            date: self.date.format(STORE_DATE_FORMAT).to_string(),
            kind: self.kind.to_string(),
            amount: self.amount.to_string(),
            description: self.description.clone(),
            receipt_link: self.receipt_link.clone(),
        }
        .into()
    }
}

/// Parses an import line: `date | kind | amount | description [| receipt]`.
impl FromStr for NewTransaction {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let row = raw::Row::from(line.split('|').map(|cell| cell.trim().to_owned()).collect::<Fields>());
        let date = parse_date(&row.date)?;
        let kind = row.kind.parse()?;
        let amount = row
            .amount
            .parse::<Money>()
            .with_context(|| format!("Invalid amount in '{}'", line))?
            .round_units();
        Ok(NewTransaction::new(date, kind, amount, &row.description).with_receipt(&row.receipt_link))
    }
}
