//! Common types used throughout reportsync.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A single spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Blank cell.
    Empty,
    /// Boolean cell.
    Bool(bool),
    /// Numeric cell.
    Number(f64),
    /// Text cell.
    Text(String),
}

impl CellValue {
    /// Create a text cell.
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Check if the cell is blank.
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

// Blank cells go out as "" so a RAW write never leaves a hole the API would skip.
impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CellValue::Empty => serializer.serialize_str(""),
            CellValue::Bool(value) => serializer.serialize_bool(*value),
            CellValue::Number(value) => serializer.serialize_f64(*value),
            CellValue::Text(value) => serializer.serialize_str(value),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Bool(value) => write!(f, "{}", value),
            CellValue::Number(value) => write!(f, "{}", value),
            CellValue::Text(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<u32> for CellValue {
    fn from(value: u32) -> Self {
        CellValue::Number(f64::from(value))
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

/// A named block of rows destined for one sheet.
///
/// Immutable once built; a sync call takes ownership and consumes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetMatrix {
    sheet_name: String,
    rows: Vec<Vec<CellValue>>,
}

impl SheetMatrix {
    /// Create a new matrix for a sheet.
    ///
    /// # Errors
    /// - Returns error if the sheet name is blank
    pub fn new(sheet_name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> crate::Result<Self> {
        let sheet_name = sheet_name.into();
        if sheet_name.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "Sheet name cannot be empty".to_string(),
            ));
        }
        Ok(Self { sheet_name, rows })
    }

    /// Target sheet title.
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Rows in positional order.
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Consume the matrix and return its rows.
    pub fn into_rows(self) -> Vec<Vec<CellValue>> {
        self.rows
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Widest row length.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Render as CSV, quoting cells that contain separators or quotes.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let line: Vec<String> = row.iter().map(|cell| csv_field(&cell.to_string())).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Secret string wrapper that zeroizes on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct SensitiveString(String);

impl SensitiveString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret for use in a request.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveString([REDACTED; {} chars])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_matrix_rejects_blank_name() {
        assert!(SheetMatrix::new("  ", vec![]).is_err());
    }

    #[test]
    fn test_sheet_matrix_dimensions() {
        let matrix = SheetMatrix::new(
            "Sales",
            vec![
                vec!["Category".into(), "Sales".into()],
                vec!["SUV".into(), 12u32.into(), 1.5.into()],
            ],
        )
        .unwrap();

        assert_eq!(matrix.height(), 2);
        assert_eq!(matrix.width(), 3);
        assert_eq!(matrix.sheet_name(), "Sales");
    }

    #[test]
    fn test_empty_cell_serializes_as_blank_string() {
        let row = vec![CellValue::Empty, CellValue::Number(3.0), CellValue::text("x")];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"["",3.0,"x"]"#);
    }

    #[test]
    fn test_csv_rendering_quotes_fields() {
        let matrix = SheetMatrix::new(
            "Sales",
            vec![
                vec!["Sales Report Summary".into()],
                vec!["Total Sales".into(), 120u32.into()],
                vec!["Dealer \"North\", Jakarta".into(), CellValue::Empty],
            ],
        )
        .unwrap();

        assert_eq!(
            matrix.to_csv(),
            "Sales Report Summary\nTotal Sales,120\n\"Dealer \"\"North\"\", Jakarta\",\n"
        );
    }

    #[test]
    fn test_sensitive_string_debug_redacted() {
        let secret = SensitiveString::new("ya29.token");
        assert!(!format!("{:?}", secret).contains("ya29"));
        assert_eq!(secret.expose(), "ya29.token");
    }
}
