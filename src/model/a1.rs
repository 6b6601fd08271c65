//! Spreadsheet addressing: A1 column letters, A1 ranges and the 1-based rectangles that are used
//! to decide whether an edit touched a reference range.

use anyhow::{bail, Context};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 1-based column index that is written as A1 column letters, e.g. `1 -> A`, `26 -> Z`,
/// `27 -> AA`. Serializes to its letters.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ColumnLetter(u32);

impl ColumnLetter {
    pub const A: ColumnLetter = ColumnLetter(1);

    /// Creates a column from its 1-based index. `index` must not be zero.
    pub(crate) const fn new_unchecked(index: u32) -> Self {
        Self(index)
    }

    pub fn new(index: u32) -> crate::Result<Self> {
        if index == 0 {
            bail!("Column indexes are 1-based, 0 is not a column");
        }
        Ok(Self(index))
    }

    /// The 1-based index of the column.
    pub fn index(&self) -> u32 {
        self.0
    }

    /// The column `n` places to the right of this one.
    pub fn offset(&self, n: u32) -> Self {
        Self(self.0 + n)
    }

    /// Every column letter from `A` through `last`, in order.
    pub fn through(last: ColumnLetter) -> impl Iterator<Item = ColumnLetter> {
        (1..=last.0).map(ColumnLetter)
    }
}

impl fmt::Display for ColumnLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bijective base-26: there is no zero digit.
        let mut n = self.0;
        let mut letters = Vec::new();
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            n = (n - 1) / 26;
        }
        let s: String = letters.into_iter().rev().collect();
        f.write_str(&s)
    }
}

impl FromStr for ColumnLetter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            bail!("A column letter must not be empty");
        }
        let mut index: u32 = 0;
        for c in s.chars() {
            if !c.is_ascii_alphabetic() {
                bail!("Invalid column letter '{s}', only A-Z are allowed");
            }
            let digit = (c.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
            index = index
                .checked_mul(26)
                .and_then(|i| i.checked_add(digit))
                .with_context(|| format!("Column letter '{s}' is too large"))?;
        }
        Ok(Self(index))
    }
}

impl Serialize for ColumnLetter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ColumnLetter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ColumnLetter::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A range in A1 notation, e.g. `'Ledger 2024'!B5:I5` or the open-ended `Transactions!B1:B`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct A1Range {
    sheet: Option<String>,
    first_column: ColumnLetter,
    first_row: u32,
    last_column: ColumnLetter,
    /// `None` means the range runs to the bottom of the sheet.
    last_row: Option<u32>,
}

impl A1Range {
    /// A single-row span from `first_column` to `last_column` on `row`.
    pub fn row_span(
        sheet: impl Into<String>,
        first_column: ColumnLetter,
        last_column: ColumnLetter,
        row: u32,
    ) -> Self {
        Self {
            sheet: Some(sheet.into()),
            first_column,
            first_row: row,
            last_column,
            last_row: Some(row),
        }
    }

    /// The whole of `column`, from row 1 to the bottom of the sheet.
    pub fn whole_column(sheet: impl Into<String>, column: ColumnLetter) -> Self {
        Self {
            sheet: Some(sheet.into()),
            first_column: column,
            first_row: 1,
            last_column: column,
            last_row: None,
        }
    }

    pub fn sheet(&self) -> Option<&str> {
        self.sheet.as_deref()
    }

    pub fn first_column(&self) -> ColumnLetter {
        self.first_column
    }

    pub fn first_row(&self) -> u32 {
        self.first_row
    }

    pub fn last_column(&self) -> ColumnLetter {
        self.last_column
    }

    pub fn last_row(&self) -> Option<u32> {
        self.last_row
    }

    pub fn width(&self) -> usize {
        (self.last_column.index() - self.first_column.index() + 1) as usize
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            if needs_quotes(sheet) {
                write!(f, "'{}'!", sheet.replace('\'', "''"))?;
            } else {
                write!(f, "{sheet}!")?;
            }
        }
        write!(f, "{}{}", self.first_column, self.first_row)?;
        match self.last_row {
            Some(last_row)
                if last_row == self.first_row && self.last_column == self.first_column =>
            {
                Ok(())
            }
            Some(last_row) => write!(f, ":{}{last_row}", self.last_column),
            None => write!(f, ":{}", self.last_column),
        }
    }
}

impl FromStr for A1Range {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (sheet, cells) = split_sheet(s)?;

        let (first, last) = match cells.split_once(':') {
            Some((first, last)) => (first, Some(last)),
            None => (cells, None),
        };

        let (first_column, first_row) = split_cell(first)?;
        let first_row =
            first_row.with_context(|| format!("The range '{s}' must start with a row number"))?;

        let (last_column, last_row) = match last {
            Some(last) => split_cell(last)?,
            None => (first_column, Some(first_row)),
        };

        if last_column < first_column || last_row.is_some_and(|r| r < first_row) {
            bail!("The range '{s}' ends before it starts");
        }

        Ok(Self {
            sheet,
            first_column,
            first_row,
            last_column,
            last_row,
        })
    }
}

fn needs_quotes(sheet: &str) -> bool {
    !sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits `'My Sheet'!A1:B2` into `(Some("My Sheet"), "A1:B2")`.
fn split_sheet(s: &str) -> crate::Result<(Option<String>, &str)> {
    if let Some(rest) = s.strip_prefix('\'') {
        let mut title = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((ix, c)) = chars.next() {
            if c != '\'' {
                title.push(c);
                continue;
            }
            if let Some((_, '\'')) = chars.peek() {
                title.push('\'');
                chars.next();
                continue;
            }
            let after = &rest[ix + 1..];
            let cells = after
                .strip_prefix('!')
                .with_context(|| format!("Expected '!' after the sheet name in '{s}'"))?;
            return Ok((Some(title), cells));
        }
        bail!("Unterminated sheet name quote in '{s}'");
    }
    match s.rsplit_once('!') {
        Some((sheet, cells)) => Ok((Some(sheet.to_string()), cells)),
        None => Ok((None, s)),
    }
}

/// Splits `B12` into `(B, Some(12))` and `B` into `(B, None)`.
fn split_cell(cell: &str) -> crate::Result<(ColumnLetter, Option<u32>)> {
    let cell = cell.trim().replace('$', "");
    let digits_at = cell
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(digits_at);
    let column = ColumnLetter::from_str(letters)
        .with_context(|| format!("Invalid cell reference '{cell}'"))?;
    if digits.is_empty() {
        return Ok((column, None));
    }
    let row: u32 = digits
        .parse()
        .with_context(|| format!("Invalid row number in cell reference '{cell}'"))?;
    if row == 0 {
        bail!("Row numbers are 1-based, '{cell}' is not a cell");
    }
    Ok((column, Some(row)))
}

/// A rectangle of cells on one sheet with 1-based, inclusive bounds. This is the shape that edit
/// events carry and that named ranges resolve to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    sheet_id: i64,
    row: u32,
    column: u32,
    last_row: u32,
    last_column: u32,
}

impl CellRange {
    pub fn new(sheet_id: i64, row: u32, column: u32, last_row: u32, last_column: u32) -> Self {
        Self {
            sheet_id,
            row,
            column,
            last_row,
            last_column,
        }
    }

    /// Resolves `range` on the sheet `sheet_id`. An open-ended range runs to `row_count`.
    pub fn from_a1(sheet_id: i64, range: &A1Range, row_count: u32) -> Self {
        Self {
            sheet_id,
            row: range.first_row(),
            column: range.first_column().index(),
            last_row: range.last_row().unwrap_or(row_count.max(range.first_row())),
            last_column: range.last_column().index(),
        }
    }

    pub fn sheet_id(&self) -> i64 {
        self.sheet_id
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn last_row(&self) -> u32 {
        self.last_row
    }

    pub fn last_column(&self) -> u32 {
        self.last_column
    }

    pub fn width(&self) -> usize {
        (self.last_column.saturating_sub(self.column) + 1) as usize
    }

    pub fn height(&self) -> usize {
        (self.last_row.saturating_sub(self.row) + 1) as usize
    }

    /// True when both rectangles are on the same sheet and share at least one cell.
    pub fn intersects(&self, other: &CellRange) -> bool {
        if self.sheet_id != other.sheet_id {
            return false;
        }
        !(self.last_row < other.row
            || other.last_row < self.row
            || self.last_column < other.column
            || other.last_column < self.column)
    }

    /// Flattens `rows`, as read from this range, into a row-major list. The Sheets API trims
    /// trailing empty cells and rows, so rows are padded back out to the rectangle's size, which
    /// keeps each value's position aligned with its cell.
    pub fn flatten(&self, rows: Vec<Vec<String>>) -> Vec<String> {
        let width = self.width();
        let mut values = Vec::with_capacity(width * self.height());
        let mut rows = rows.into_iter();
        for _ in 0..self.height() {
            let mut row = rows.next().unwrap_or_default();
            row.resize(width, String::new());
            values.extend(row);
        }
        values
    }
}
