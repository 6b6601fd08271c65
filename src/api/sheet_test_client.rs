//! Implements the `Sheet` trait with in-memory data.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without using Google Sheets. Spreadsheets live in a process-wide registry
//! keyed by spreadsheet id, and a spreadsheet that is opened for the first time is seeded with a
//! small ledger, a balances tab and an overview tab of categories.

use crate::api::{Sheet, SheetProps, SheetRange};
use crate::model::{A1Range, CellRange};
use crate::Result;
use anyhow::{bail, Context};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::{LazyLock, Mutex, MutexGuard};

pub(crate) const TRANSACTIONS_SHEET_ID: i64 = 1732160294;
pub(crate) const BALANCES_SHEET_ID: i64 = 765911459;
pub(crate) const OVERVIEW_SHEET_ID: i64 = 0;

static SPREADSHEETS: LazyLock<Mutex<HashMap<String, TestSheetState>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn registry() -> MutexGuard<'static, HashMap<String, TestSheetState>> {
    SPREADSHEETS.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct Tab {
    id: i64,
    title: String,
    rows: Vec<Vec<String>>,
    row_count: u32,
    column_count: u32,
}

impl Tab {
    fn props(&self) -> SheetProps {
        SheetProps {
            title: self.title.clone(),
            row_count: self.row_count,
            column_count: self.column_count,
        }
    }

    fn cell(&self, row: u32, column: u32) -> &str {
        self.rows
            .get(row as usize - 1)
            .and_then(|r| r.get(column as usize - 1))
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn set_cell(&mut self, row: u32, column: u32, value: String) {
        let (r, c) = (row as usize - 1, column as usize - 1);
        if self.rows.len() <= r {
            self.rows.resize(r + 1, Vec::new());
        }
        let cells = &mut self.rows[r];
        if cells.len() <= c {
            cells.resize(c + 1, String::new());
        }
        cells[c] = value;
    }

    /// Reads `range` the way the Sheets API does: trailing empty cells and rows are dropped.
    fn read(&self, range: &CellRange) -> Vec<Vec<String>> {
        let mut rows: Vec<Vec<String>> = (range.row()..=range.last_row())
            .map(|row| {
                let mut cells: Vec<String> = (range.column()..=range.last_column())
                    .map(|column| self.cell(row, column).to_string())
                    .collect();
                while cells.last().is_some_and(|c| c.is_empty()) {
                    cells.pop();
                }
                cells
            })
            .collect();
        while rows.last().is_some_and(|r| r.is_empty()) {
            rows.pop();
        }
        rows
    }
}

/// The contents of one in-memory spreadsheet.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub(crate) struct TestSheetState {
    tabs: Vec<Tab>,
    named_ranges: BTreeMap<String, CellRange>,
    /// When set, this many more calls of `write_ranges` succeed and the next one fails.
    writes_before_failure: Option<usize>,
}

impl TestSheetState {
    /// A spreadsheet with a ledger, balances and category lists.
    pub(crate) fn seeded() -> Self {
        let mut state = Self::default();
        state.add_tab(TRANSACTIONS_SHEET_ID, "Transactions", load_csv(TRANSACTION_DATA), 14);
        state.add_tab(BALANCES_SHEET_ID, "Balances", load_csv(BALANCE_DATA), 2);
        state.add_tab(OVERVIEW_SHEET_ID, "Overview", load_csv(OVERVIEW_DATA), 4);
        state.set_row_count(BALANCES_SHEET_ID, 20);
        state.set_row_count(OVERVIEW_SHEET_ID, 30);
        state.set_named_range("BalancesAccounts", CellRange::new(BALANCES_SHEET_ID, 2, 1, 7, 1));
        state.set_named_range(
            "BalancesAccountsAmount",
            CellRange::new(BALANCES_SHEET_ID, 2, 2, 7, 2),
        );
        state.set_named_range(
            "OverviewExpenseCategories",
            CellRange::new(OVERVIEW_SHEET_ID, 2, 1, 9, 1),
        );
        state.set_named_range(
            "OverviewIncomeCategories",
            CellRange::new(OVERVIEW_SHEET_ID, 2, 2, 9, 2),
        );
        state
    }

    /// Adds a tab holding `rows`. The grid is exactly as tall as `rows`.
    pub(crate) fn add_tab(
        &mut self,
        id: i64,
        title: impl Into<String>,
        rows: Vec<Vec<String>>,
        column_count: u32,
    ) {
        self.tabs.retain(|t| t.id != id);
        self.tabs.push(Tab {
            id,
            title: title.into(),
            row_count: rows.len() as u32,
            rows,
            column_count,
        });
    }

    pub(crate) fn set_named_range(&mut self, name: impl Into<String>, range: CellRange) {
        self.named_ranges.insert(name.into(), range);
    }

    pub(crate) fn remove_named_range(&mut self, name: &str) {
        self.named_ranges.remove(name);
    }

    pub(crate) fn set_row_count(&mut self, sheet_id: i64, row_count: u32) {
        if let Some(tab) = self.tabs.iter_mut().find(|t| t.id == sheet_id) {
            tab.row_count = row_count;
        }
    }

    /// Lets `count` more writes through, then fails every write.
    pub(crate) fn fail_writes_after(&mut self, count: usize) {
        self.writes_before_failure = Some(count);
    }

    fn take_write(&mut self) -> Result<()> {
        match self.writes_before_failure {
            Some(0) => bail!("The spreadsheet refused the write"),
            Some(n) => self.writes_before_failure = Some(n - 1),
            None => {}
        }
        Ok(())
    }

    pub(crate) fn props(&self, sheet_id: i64) -> Option<SheetProps> {
        self.tab(sheet_id).map(Tab::props)
    }

    /// The stored rows of a tab, untrimmed.
    pub(crate) fn rows(&self, sheet_id: i64) -> Vec<Vec<String>> {
        self.tab(sheet_id).map(|t| t.rows.clone()).unwrap_or_default()
    }

    pub(crate) fn set_cell(&mut self, sheet_id: i64, row: u32, column: u32, value: &str) {
        if let Some(tab) = self.tabs.iter_mut().find(|t| t.id == sheet_id) {
            tab.set_cell(row, column, value.to_string());
        }
    }

    fn tab(&self, sheet_id: i64) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == sheet_id)
    }

    /// Resolves an A1 range. Without a sheet title the first tab is used.
    fn resolve(&self, range: &A1Range) -> Result<CellRange> {
        let tab = match range.sheet() {
            Some(title) => self.tabs.iter().find(|t| t.title == title),
            None => self.tabs.first(),
        }
        .with_context(|| format!("No sheet for the range '{range}'"))?;
        Ok(CellRange::from_a1(tab.id, range, tab.row_count))
    }

    fn get(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let cells = match self.named_ranges.get(range) {
            Some(named) => *named,
            None => {
                let a1: A1Range = range.parse()?;
                self.resolve(&a1)?
            }
        };
        let tab = self
            .tab(cells.sheet_id())
            .with_context(|| format!("No sheet with id {}", cells.sheet_id()))?;
        Ok(tab.read(&cells))
    }

    fn write(&mut self, data: &SheetRange) -> Result<()> {
        let a1: A1Range = data.range.parse()?;
        let cells = self.resolve(&a1)?;
        let tab = self
            .tabs
            .iter_mut()
            .find(|t| t.id == cells.sheet_id())
            .with_context(|| format!("No sheet for the range '{}'", data.range))?;
        for (r, values) in data.values.iter().enumerate() {
            for (c, value) in values.iter().enumerate() {
                let row = cells.row() + r as u32;
                let column = cells.column() + c as u32;
                if row > tab.row_count || column > tab.column_count {
                    bail!(
                        "Range ({}) exceeds grid limits. Max rows: {}, max columns: {}",
                        data.range,
                        tab.row_count,
                        tab.column_count
                    );
                }
                tab.set_cell(row, column, value.clone());
            }
        }
        Ok(())
    }
}

/// A handle to an in-memory spreadsheet in the registry.
pub(crate) struct TestSheet {
    spreadsheet_id: String,
}

impl TestSheet {
    /// Opens `spreadsheet_id`, seeding it if it has never been opened.
    pub(crate) fn new(spreadsheet_id: impl Into<String>) -> Self {
        let spreadsheet_id = spreadsheet_id.into();
        registry()
            .entry(spreadsheet_id.clone())
            .or_insert_with(TestSheetState::seeded);
        Self { spreadsheet_id }
    }

    /// Runs `f` on the state of `spreadsheet_id`, seeding it first if needed.
    pub(crate) fn with_state<R>(
        spreadsheet_id: &str,
        f: impl FnOnce(&mut TestSheetState) -> R,
    ) -> R {
        let mut registry = registry();
        let state = registry
            .entry(spreadsheet_id.to_string())
            .or_insert_with(TestSheetState::seeded);
        f(state)
    }

    /// A copy of the current state of `spreadsheet_id`.
    pub(crate) fn state(spreadsheet_id: &str) -> TestSheetState {
        Self::with_state(spreadsheet_id, |state| state.clone())
    }

    fn lock<R>(&self, f: impl FnOnce(&mut TestSheetState) -> Result<R>) -> Result<R> {
        Self::with_state(&self.spreadsheet_id, f)
    }
}

#[async_trait::async_trait]
impl Sheet for TestSheet {
    async fn sheet(&mut self, sheet_id: i64) -> Result<SheetProps> {
        self.lock(|state| {
            state
                .props(sheet_id)
                .with_context(|| format!("No sheet with id {sheet_id} in the spreadsheet"))
        })
    }

    async fn named_range(&mut self, name: &str) -> Result<Option<CellRange>> {
        self.lock(|state| Ok(state.named_ranges.get(name).copied()))
    }

    async fn get(&mut self, range: &str) -> Result<Vec<Vec<String>>> {
        self.lock(|state| state.get(range))
    }

    async fn write_ranges(&mut self, data: &[SheetRange]) -> Result<()> {
        self.lock(|state| {
            state.take_write()?;
            for range in data {
                state.write(range)?;
            }
            Ok(())
        })
    }

    async fn insert_rows(&mut self, sheet_id: i64, count: u32) -> Result<()> {
        self.lock(|state| {
            let tab = state
                .tabs
                .iter_mut()
                .find(|t| t.id == sheet_id)
                .with_context(|| format!("No sheet with id {sheet_id} in the spreadsheet"))?;
            tab.row_count += count;
            Ok(())
        })
    }
}

/// Loads rows from CSV text. The seed data is static, so a malformed record is skipped.
fn load_csv(csv_data: &str) -> Vec<Vec<String>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(csv_data.as_bytes()))
        .records()
        .filter_map(|record| record.ok())
        .map(|record| record.iter().map(str::to_string).collect())
        .collect()
}

/// Seed ledger rows in the unified layout.
const TRANSACTION_DATA: &str = r##",Date,Amount,Account,Beneficiary,Tag,Description,Income category,Expense category
,2024-03-01 09:00:00,-4.50,Cash,Cafe,,Coffee,,Food
,2024-03-02 18:30:00,2500,Bank,Employer,,March salary,Salary,
,2024-03-03 12:00:00,-60,Card,Grocer,#12,Weekly shop,,Food
"##;

/// Seed balances. `Card` has no stored amount and the last listed row is blank.
const BALANCE_DATA: &str = r##"Account,Amount
Cash,$100.00
Bank,"$1,250.50"
Card,
Savings,0
A Wallet,$20.00
"##;

/// Seed category lists with a repeat and blanks.
const OVERVIEW_DATA: &str = r##"Expense categories,Income categories
Food,Salary
Transport,Gifts
Food,
Rent,Salary
,Interest
"##;

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> (String, TestSheet) {
        let id = uuid::Uuid::new_v4().to_string();
        let sheet = TestSheet::new(&id);
        (id, sheet)
    }

    #[tokio::test]
    async fn test_get_named_range_is_trimmed() {
        let (_, mut sheet) = sheet();
        let accounts = sheet.get("BalancesAccounts").await.unwrap();
        assert_eq!(accounts.len(), 5);
        assert_eq!(accounts[1], vec!["Bank"]);

        let amounts = sheet.get("BalancesAccountsAmount").await.unwrap();
        assert_eq!(amounts[2], Vec::<String>::new());
        assert_eq!(amounts[4], vec!["$20.00"]);
    }

    #[tokio::test]
    async fn test_get_a1_column() {
        let (_, mut sheet) = sheet();
        let column = sheet.get("Transactions!B1:B").await.unwrap();
        assert_eq!(column.len(), 4);
        assert_eq!(column[0], vec!["Date"]);
        assert!(sheet.get("Nope!A1:B2").await.is_err());
    }

    #[tokio::test]
    async fn test_write_respects_grid_limits() {
        let (id, mut sheet) = sheet();
        let props = sheet.sheet(TRANSACTIONS_SHEET_ID).await.unwrap();
        assert_eq!(props.row_count, 4);
        assert_eq!(props.column_count, 14);

        let row = SheetRange::new("Transactions!B5:C5", vec![vec!["x".into(), "1".into()]]);
        assert!(sheet.write_ranges(&[row.clone()]).await.is_err());

        sheet.insert_rows(TRANSACTIONS_SHEET_ID, 1).await.unwrap();
        sheet.write_ranges(&[row]).await.unwrap();
        let rows = TestSheet::state(&id).rows(TRANSACTIONS_SHEET_ID);
        assert_eq!(rows[4], vec!["", "x", "1"]);
    }

    #[tokio::test]
    async fn test_named_range_lookup() {
        let (id, mut sheet) = sheet();
        let range = sheet.named_range("OverviewIncomeCategories").await.unwrap();
        assert_eq!(range, Some(CellRange::new(OVERVIEW_SHEET_ID, 2, 2, 9, 2)));
        TestSheet::with_state(&id, |s| s.remove_named_range("OverviewIncomeCategories"));
        assert_eq!(sheet.named_range("OverviewIncomeCategories").await.unwrap(), None);
    }
}
