//! Spreadsheet operations in terms of the ledger: reading reference ranges and appending postings.

use crate::api::{Sheet, SheetRange};
use crate::model::{A1Range, CellRange, ColumnLetter, Direction, LedgerLayout, Posting};
use crate::Result;
use anyhow::{bail, Context};
use serde::Serialize;
use tracing::debug;

/// A row that was written to the ledger.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct AppendedRow {
    pub direction: Direction,
    pub range: String,
    pub values: Vec<String>,
}

/// Wraps a dynamically-dispatched `Sheet` with the operations that the handlers need.
pub(crate) struct Workbook {
    sheet: Box<dyn Sheet + Send>,
}

impl Workbook {
    pub(crate) fn new(sheet: Box<dyn Sheet + Send>) -> Self {
        Self { sheet }
    }

    pub(crate) async fn named_range(&mut self, name: &str) -> Result<Option<CellRange>> {
        self.sheet.named_range(name).await
    }

    /// Resolves `range` on the tab `sheet_id`. An open-ended range runs to the last row of the tab.
    pub(crate) async fn resolve(&mut self, sheet_id: i64, range: &A1Range) -> Result<CellRange> {
        let props = self.sheet.sheet(sheet_id).await?;
        Ok(CellRange::from_a1(sheet_id, range, props.row_count))
    }

    /// Reads the named range `name` (resolved to `range`) as a flat list that is aligned with its
    /// cells: the value of the n-th cell, row by row, is at index n.
    pub(crate) async fn range_values(
        &mut self,
        name: &str,
        range: &CellRange,
    ) -> Result<Vec<String>> {
        let rows = self
            .sheet
            .get(name)
            .await
            .with_context(|| format!("Unable to read the range '{name}'"))?;
        Ok(range.flatten(rows))
    }

    /// The row after the last non-empty cell of `column`. Blank cells above it are not reused. An
    /// empty column gives row 1.
    pub(crate) async fn first_empty_row(
        &mut self,
        title: &str,
        column: ColumnLetter,
    ) -> Result<u32> {
        let range = A1Range::whole_column(title, column);
        let rows = self.sheet.get(&range.to_string()).await?;
        let last_filled = rows
            .iter()
            .rposition(|row| row.first().is_some_and(|v| !v.is_empty()));
        Ok(match last_filled {
            Some(ix) => ix as u32 + 2,
            None => 1,
        })
    }

    /// Writes `posting` into the first empty row below the anchor column of its direction, growing
    /// the sheet when that row does not exist yet.
    pub(crate) async fn append_posting(
        &mut self,
        ledger_sheet_id: i64,
        layout: LedgerLayout,
        posting: &Posting,
    ) -> Result<AppendedRow> {
        let props = self.sheet.sheet(ledger_sheet_id).await?;
        let last_column = ColumnLetter::new(props.column_count)
            .with_context(|| format!("The ledger sheet '{}' has no columns", props.title))?;

        let values = layout.build_row(posting, last_column);
        if values.is_empty() {
            bail!(
                "The ledger sheet '{}' has none of the columns of the {} layout",
                props.title,
                layout
            );
        }

        let anchor = layout.anchor(posting.direction());
        let row = self.first_empty_row(&props.title, anchor).await?;
        if props.row_count < row {
            debug!("Adding {} row(s) to '{}'", row - props.row_count, props.title);
            self.sheet
                .insert_rows(ledger_sheet_id, row - props.row_count)
                .await?;
        }

        let last = anchor.offset(values.len() as u32 - 1);
        let range = A1Range::row_span(&props.title, anchor, last, row).to_string();
        self.sheet
            .write_ranges(&[SheetRange::new(&range, vec![values.clone()])])
            .await
            .with_context(|| format!("Unable to append a row at {range}"))?;
        debug!("Appended {} row at {range}", posting.direction());

        Ok(AppendedRow {
            direction: posting.direction(),
            range,
            values,
        })
    }
}
