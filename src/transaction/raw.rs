use crate::store::Fields;

/// Column headers of the ledger worksheet, in storage order.
pub const HEADER: &[&str] = &["Ngay", "Loai", "SoTien", "MoTa", "HinhAnh"];

/// Raw row as stored, one string per cell. Missing trailing cells read as empty.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Row {
    pub date: String,
    pub kind: String,
    pub amount: String,
    pub description: String,
    pub receipt_link: String,
}

impl From<Fields> for Row {
    fn from(fields: Fields) -> Self {
        let mut cells = fields.into_iter();
        let mut next = || cells.next().unwrap_or_default();
        Row {
            date: next(),
            kind: next(),
            amount: next(),
            description: next(),
            receipt_link: next(),
        }
    }
}

impl From<Row> for Fields {
    fn from(row: Row) -> Self {
        vec![
            row.date,
            row.kind,
            row.amount,
            row.description,
            row.receipt_link,
        ]
    }
}
