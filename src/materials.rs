//! Material usage per project, kept in its own worksheet.
//!
//! Lines reference projects and materials by code only. A material can be
//! bought in several units, each a fixed multiple of its base unit.
use crate::money::Money;
use crate::store::{Fields, RowId, RowStore};
use crate::transaction::{STORE_DATE_FORMAT, parse_date};
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use itertools::Itertools;
use num_traits::Zero;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

pub const HEADER: &[&str] = &[
    "MaDuAn", "MaVatTu", "Ngay", "SoLuong", "DonVi", "DonGia", "GhiChu",
];

pub const PROJECT_PREFIX: &str = "PRJ";

#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub name: String,
    /// How many base units one of this unit holds.
    pub per_base: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub code: String,
    pub name: String,
    pub base_unit: String,
    pub units: Vec<Unit>,
}

impl Material {
    pub fn factor(&self, unit: &str) -> Result<Decimal> {
        if unit.eq_ignore_ascii_case(&self.base_unit) {
            return Ok(Decimal::ONE);
        }
        self.units
            .iter()
            .find(|u| u.name.eq_ignore_ascii_case(unit))
            .map(|u| u.per_base)
            .with_context(|| format!("Unit '{}' is not defined for {}", unit, self.code))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog(pub Vec<Material>);

impl Catalog {
    pub fn get(&self, code: &str) -> Result<&Material> {
        self.0
            .iter()
            .find(|m| m.code == code)
            .with_context(|| format!("Unknown material code '{}'", code))
    }

    /// Converts `quantity` of `code` from one unit into another.
    pub fn convert(&self, code: &str, quantity: Decimal, from: &str, to: &str) -> Result<Decimal> {
        let material = self.get(code)?;
        let base = quantity * material.factor(from)?;
        Ok(base / material.factor(to)?)
    }

    /// Price of one `to` unit given the price of one `from` unit.
    pub fn convert_price(&self, code: &str, price: Money, from: &str, to: &str) -> Result<Money> {
        let material = self.get(code)?;
        Ok(Money(price.0 * material.factor(to)? / material.factor(from)?))
    }
}

/// Quantity as written by [`MaterialLine::to_fields`], also accepting a
/// decimal comma such as `2,5`.
fn parse_quantity(s: &str) -> Result<Decimal> {
    Decimal::from_str(s.trim()).or_else(|_| s.parse::<Money>().map(|m| m.0))
}

/// Plain decimal for the price cell. Exactly three decimals would read back
/// as a thousands group, so those are written with a fourth.
fn price_cell(price: Money) -> String {
    let price = price.0.normalize();
    if price.scale() == 3 {
        format!("{:.4}", price)
    } else {
        price.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialLine {
    pub id: RowId,
    pub project: String,
    pub material: String,
    pub date: NaiveDate,
    pub quantity: Decimal,
    pub unit: String,
    pub unit_price: Money,
    pub note: String,
}

impl MaterialLine {
    /// Unreadable quantities and prices become 0; a missing date is an error.
    pub fn from_fields(id: RowId, fields: Fields) -> Result<Self> {
        let mut cells = fields.into_iter();
        let mut next = || cells.next().unwrap_or_default();
        let (project, material, date, quantity, unit, unit_price, note) =
            (next(), next(), next(), next(), next(), next(), next());
        let date = parse_date(&date).with_context(|| format!("Material row {}", id))?;
        let quantity = parse_quantity(&quantity).unwrap_or_else(|err| {
            tracing::warn!("Material row {}: {:#}, using 0", id, err);
            Decimal::zero()
        });
        // prices are read like ledger amounts, so `85.000` is 85000
        let unit_price = unit_price.parse::<Money>().unwrap_or_else(|err| {
            tracing::warn!("Material row {}: {:#}, using 0", id, err);
            Money::zero()
        });
        Ok(MaterialLine {
            id,
            project,
            material,
            date,
            quantity,
            unit,
            unit_price,
            note,
        })
    }

    pub fn to_fields(&self) -> Fields {
        vec![
            self.project.clone(),
            self.material.clone(),
            self.date.format(STORE_DATE_FORMAT).to_string(),
            self.quantity.normalize().to_string(),
            self.unit.clone(),
            price_cell(self.unit_price),
            self.note.clone(),
        ]
    }

    pub fn total(&self) -> Money {
        self.unit_price * self.quantity
    }
}

impl fmt::Display for MaterialLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>4} | {} | {} | {:10} | {:>8} {:6} | {:>14} | {:>16} | {}",
            self.id,
            self.project,
            self.date.format("%d/%m/%Y"),
            self.material,
            self.quantity.normalize(),
            self.unit,
            self.unit_price.to_string(),
            self.total().to_string(),
            self.note
        )
    }
}

/// Totals of one material within a project, in its base unit.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryLine {
    pub material: String,
    pub name: String,
    pub base_unit: String,
    pub quantity: Decimal,
    pub cost: Money,
}

impl fmt::Display for SummaryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:10} | {:24} | {:>10} {:6} | {:>16}",
            self.material,
            self.name,
            self.quantity.normalize(),
            self.base_unit,
            self.cost.to_string()
        )
    }
}

/// Next free `PRJ-YYYYMMDD-NN` code for `date`.
pub fn generate_project_code<'a>(
    date: NaiveDate,
    existing: impl IntoIterator<Item = &'a str>,
) -> String {
    let prefix = format!("{}-{}-", PROJECT_PREFIX, date.format("%Y%m%d"));
    let next = existing
        .into_iter()
        .filter_map(|code| code.strip_prefix(&prefix))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .map_or(1, |n| n + 1);
    format!("{prefix}{next:02}")
}

/// Material lines on top of a row store.
pub struct Materials<S> {
    store: S,
    catalog: Catalog,
}

impl<S: RowStore> Materials<S> {
    pub fn new(store: S, catalog: Catalog) -> Self {
        Materials { store, catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// All readable lines, in storage order.
    pub async fn lines(&self) -> Result<Vec<MaterialLine>> {
        let rows = self.store.read_all().await?;
        Ok(rows
            .into_iter()
            .enumerate()
            .filter_map(|(i, fields)| match MaterialLine::from_fields(i + 1, fields) {
                Ok(line) => Some(line),
                Err(err) => {
                    tracing::warn!("Skipping material row: {:#}", err);
                    None
                }
            })
            .collect())
    }

    pub async fn project_lines(&self, project: &str) -> Result<Vec<MaterialLine>> {
        Ok(self
            .lines()
            .await?
            .into_iter()
            .filter(|line| line.project == project)
            .collect())
    }

    fn validate(&self, line: &MaterialLine) -> Result<()> {
        if line.project.trim().is_empty() {
            bail!("Project code is required");
        }
        if line.quantity <= Decimal::zero() {
            bail!("Quantity must be greater than 0");
        }
        if line.unit_price.0 < Decimal::zero() {
            bail!("Unit price cannot be negative");
        }
        self.catalog.get(&line.material)?.factor(&line.unit)?;
        Ok(())
    }

    pub async fn record(&mut self, line: MaterialLine) -> Result<RowId> {
        self.validate(&line)?;
        let id = self.store.append_row(line.to_fields()).await?;
        tracing::info!("Recorded material line {} for {}", id, line.project);
        Ok(id)
    }

    pub async fn update(&mut self, id: RowId, line: MaterialLine) -> Result<()> {
        self.validate(&line)?;
        self.store.update_row(id, line.to_fields()).await?;
        Ok(())
    }

    pub async fn delete(&mut self, id: RowId) -> Result<()> {
        self.store.delete_row(id).await?;
        tracing::info!("Deleted material line {}", id);
        Ok(())
    }

    pub async fn new_project_code(&self, date: NaiveDate) -> Result<String> {
        let lines = self.lines().await?;
        Ok(generate_project_code(
            date,
            lines.iter().map(|line| line.project.as_str()),
        ))
    }

    /// Per material totals for `project`, sorted by material code.
    pub async fn project_summary(&self, project: &str) -> Result<Vec<SummaryLine>> {
        let lines = self.project_lines(project).await?;
        lines
            .iter()
            .map(|line| (line.material.clone(), line))
            .into_group_map()
            .into_iter()
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .map(|(code, lines)| {
                let material = self.catalog.get(&code)?;
                let (quantity, cost) = lines.iter().try_fold(
                    (Decimal::zero(), Money::zero()),
                    |(quantity, cost), line| -> Result<_> {
                        let base = line.quantity * material.factor(&line.unit)?;
                        Ok((quantity + base, cost + line.total()))
                    },
                )?;
                Ok(SummaryLine {
                    material: code,
                    name: material.name.clone(),
                    base_unit: material.base_unit.clone(),
                    quantity,
                    cost,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod materials_tests {
    use super::*;
    use crate::store::MemoryStore;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn catalog() -> Catalog {
        Catalog(vec![
            Material {
                code: "XM".to_string(),
                name: "Xi măng".to_string(),
                base_unit: "bao".to_string(),
                units: vec![Unit {
                    name: "tan".to_string(),
                    per_base: dec("20"),
                }],
            },
            Material {
                code: "GACH".to_string(),
                name: "Gạch".to_string(),
                base_unit: "vien".to_string(),
                units: vec![Unit {
                    name: "thien".to_string(),
                    per_base: dec("1000"),
                }],
            },
        ])
    }

    fn line(project: &str, material: &str, quantity: &str, unit: &str, price: i64) -> MaterialLine {
        MaterialLine {
            id: 0,
            project: project.to_string(),
            material: material.to_string(),
            date: d(1),
            quantity: dec(quantity),
            unit: unit.to_string(),
            unit_price: Money::from(price),
            note: String::new(),
        }
    }

    #[test]
    fn unit_conversion() -> Result<()> {
        let catalog = catalog();
        assert_eq!(catalog.convert("XM", dec("2"), "tan", "bao")?, dec("40"));
        assert_eq!(catalog.convert("XM", dec("10"), "bao", "tan")?, dec("0.5"));
        assert_eq!(
            catalog.convert_price("GACH", Money::from(1_200_000), "thien", "vien")?,
            Money::from(1_200)
        );
        assert!(catalog.convert("XM", dec("1"), "thien", "bao").is_err());
        assert!(catalog.get("SAT").is_err());
        Ok(())
    }

    #[test]
    fn project_codes_count_up_per_day() {
        assert_eq!(generate_project_code(d(3), []), "PRJ-20240603-01");
        assert_eq!(
            generate_project_code(d(3), ["PRJ-20240603-01", "PRJ-20240603-07", "PRJ-20240602-09"]),
            "PRJ-20240603-08"
        );
    }

    #[test]
    fn fields_round_trip_and_coerce() -> Result<()> {
        let original = MaterialLine {
            id: 4,
            ..line("PRJ-20240601-01", "XM", "2.5", "tan", 1_800_000)
        };
        assert_eq!(MaterialLine::from_fields(4, original.to_fields())?, original);

        let fields = ["P", "XM", "2024-06-01", "lots", "bao", "?"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let coerced = MaterialLine::from_fields(1, fields)?;
        assert_eq!(coerced.quantity, Decimal::zero());
        assert_eq!(coerced.unit_price, Money::zero());
        assert_eq!(coerced.note, "");
        Ok(())
    }

    #[test]
    fn hand_typed_prices_use_thousands_dots() -> Result<()> {
        let fields = ["P", "XM", "2024-06-01", "2,5", "bao", "85.000", ""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let typed = MaterialLine::from_fields(1, fields)?;
        assert_eq!(typed.unit_price, Money::from(85_000));
        assert_eq!(typed.quantity, dec("2.5"));
        assert_eq!(typed.total(), Money::from(212_500));

        let fields = ["P", "XM", "2024-06-01", "0.125", "tan", "1.800.000 đ", ""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let typed = MaterialLine::from_fields(2, fields)?;
        assert_eq!(typed.quantity, dec("0.125"));
        assert_eq!(typed.unit_price, Money::from(1_800_000));

        let fractional = MaterialLine {
            unit_price: Money(dec("1200.125")),
            ..line("P", "GACH", "1", "vien", 0)
        };
        assert_eq!(fractional.to_fields()[5], "1200.1250");
        assert_eq!(
            MaterialLine::from_fields(0, fractional.to_fields())?.unit_price,
            Money(dec("1200.125"))
        );
        Ok(())
    }

    #[async_std::test]
    async fn summary_in_base_units() -> Result<()> {
        let mut materials = Materials::new(MemoryStore::new(), catalog());
        let project = materials.new_project_code(d(1)).await?;
        materials.record(line(&project, "XM", "1", "tan", 1_600_000)).await?;
        materials.record(line(&project, "XM", "5", "bao", 85_000)).await?;
        materials.record(line(&project, "GACH", "2", "thien", 1_200_000)).await?;
        materials.record(line("PRJ-OTHER", "XM", "9", "bao", 1)).await?;

        assert_eq!(materials.new_project_code(d(1)).await?, "PRJ-20240601-02");

        let summary = materials.project_summary(&project).await?;
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].material, "GACH");
        assert_eq!(summary[0].quantity, dec("2000"));
        assert_eq!(summary[0].cost, Money::from(2_400_000));
        assert_eq!(summary[1].material, "XM");
        assert_eq!(summary[1].quantity, dec("25"));
        assert_eq!(summary[1].cost, Money::from(2_025_000));
        Ok(())
    }

    #[async_std::test]
    async fn record_validates_against_catalog() -> Result<()> {
        let mut materials = Materials::new(MemoryStore::new(), catalog());
        assert!(materials.record(line("P", "SAT", "1", "cay", 1)).await.is_err());
        assert!(materials.record(line("P", "XM", "1", "cay", 1)).await.is_err());
        assert!(materials.record(line("P", "XM", "0", "bao", 1)).await.is_err());
        assert!(materials.record(line("", "XM", "1", "bao", 1)).await.is_err());
        assert!(materials.lines().await?.is_empty());
        Ok(())
    }

    #[async_std::test]
    async fn update_and_delete_lines() -> Result<()> {
        let mut materials = Materials::new(MemoryStore::new(), catalog());
        materials.record(line("P", "XM", "1", "bao", 90_000)).await?;
        let id = materials.record(line("P", "GACH", "1", "thien", 1_000_000)).await?;

        materials.update(id, line("P", "GACH", "500", "vien", 1_100)).await?;
        assert!(materials.update(id, line("P", "GACH", "-1", "vien", 1)).await.is_err());
        let lines = materials.lines().await?;
        assert_eq!(lines[1].total(), Money::from(550_000));

        materials.delete(1).await?;
        let lines = materials.lines().await?;
        assert_eq!(lines.len(), 1);
        assert_eq!((lines[0].id, lines[0].material.as_str()), (1, "GACH"));
        Ok(())
    }
}
