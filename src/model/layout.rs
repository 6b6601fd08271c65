//! The column layouts of the ledger sheet.
//!
//! The ledger has gone through two layouts. `Unified` is the one in use: a single block of columns
//! anchored at `B`, with debits written as negative amounts. `Split` is the older layout with one
//! block for expenses and another for income. It never negates what was entered.

use crate::model::{ColumnLetter, Direction, Posting};
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The logical fields that a ledger column can hold.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LedgerField {
    Date,
    Amount,
    Account,
    Beneficiary,
    Tag,
    Description,
    /// The category matching the row's direction.
    Category,
    IncomeCategory,
    ExpenseCategory,
}

serde_plain::derive_display_from_serialize!(LedgerField);

const fn col(index: u32) -> ColumnLetter {
    ColumnLetter::new_unchecked(index)
}

const UNIFIED: &[(ColumnLetter, LedgerField)] = &[
    (col(2), LedgerField::Date),
    (col(3), LedgerField::Amount),
    (col(4), LedgerField::Account),
    (col(5), LedgerField::Beneficiary),
    (col(6), LedgerField::Tag),
    (col(7), LedgerField::Description),
    (col(8), LedgerField::IncomeCategory),
    (col(9), LedgerField::ExpenseCategory),
];

const SPLIT_EXPENSE: &[(ColumnLetter, LedgerField)] = &[
    (col(2), LedgerField::Date),
    (col(3), LedgerField::Amount),
    (col(4), LedgerField::Account),
    (col(5), LedgerField::Beneficiary),
    (col(6), LedgerField::Description),
    (col(7), LedgerField::Category),
];

const SPLIT_INCOME: &[(ColumnLetter, LedgerField)] = &[
    (col(9), LedgerField::Date),
    (col(10), LedgerField::Amount),
    (col(11), LedgerField::Account),
    (col(12), LedgerField::Beneficiary),
    (col(13), LedgerField::Description),
    (col(14), LedgerField::Category),
];

/// Selects the anchor column(s) and the column to field table of the ledger sheet.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerLayout {
    #[default]
    Unified,
    Split,
}

serde_plain::derive_display_from_serialize!(LedgerLayout);
serde_plain::derive_fromstr_from_deserialize!(LedgerLayout);

impl LedgerLayout {
    fn columns(&self, direction: Direction) -> &'static [(ColumnLetter, LedgerField)] {
        match (self, direction) {
            (LedgerLayout::Unified, _) => UNIFIED,
            (LedgerLayout::Split, Direction::Expense) => SPLIT_EXPENSE,
            (LedgerLayout::Split, Direction::Income) => SPLIT_INCOME,
        }
    }

    /// The leftmost column of the rows written for `direction`.
    pub fn anchor(&self, direction: Direction) -> ColumnLetter {
        match (self, direction) {
            (LedgerLayout::Split, Direction::Income) => col(9),
            _ => col(2),
        }
    }

    /// The field held by `column` in rows written for `direction`.
    pub fn field_at(&self, direction: Direction, column: ColumnLetter) -> Option<LedgerField> {
        self.columns(direction)
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, field)| *field)
    }

    /// Builds the values of the ledger row for `posting`.
    ///
    /// Every column from `A` through `last_column` is visited in order. Columns that are not mapped
    /// for the posting's direction, and mapped fields that the transaction does not have, are
    /// skipped rather than left blank, so the row is meant to be written starting at `anchor`.
    pub fn build_row(&self, posting: &Posting, last_column: ColumnLetter) -> Vec<String> {
        ColumnLetter::through(last_column)
            .filter_map(|column| self.field_at(posting.direction(), column))
            .filter_map(|field| self.value(posting, field))
            .collect()
    }

    fn value(&self, posting: &Posting, field: LedgerField) -> Option<String> {
        let tx = posting.transaction();
        let direction = posting.direction();
        let text = |value: Option<&str>| value.map(str::to_string);
        match field {
            LedgerField::Date => Some(tx.date().format(DATE_FORMAT).to_string()),
            LedgerField::Amount => {
                let amount = tx.amount().plain();
                let written = match (self, posting.is_derived(), direction) {
                    (LedgerLayout::Unified, false, Direction::Expense) => -amount,
                    (LedgerLayout::Split, true, _) => amount.abs(),
                    _ => amount,
                };
                Some(written.to_string())
            }
            LedgerField::Account => Some(tx.account().to_string()),
            LedgerField::Beneficiary => text(tx.beneficiary()),
            LedgerField::Tag => text(tx.tag()),
            LedgerField::Description => text(tx.description()),
            LedgerField::Category => text(tx.category_for(direction)),
            LedgerField::IncomeCategory => match direction {
                Direction::Income => text(tx.category_for(direction)),
                Direction::Expense => text(tx.income_category()),
            },
            LedgerField::ExpenseCategory => match direction {
                Direction::Expense => text(tx.category_for(direction)),
                Direction::Income => text(tx.expense_category()),
            },
        }
    }
}
