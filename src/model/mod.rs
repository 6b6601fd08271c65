//! Types that represent the core data model: transactions, ledger layouts, form fields, amounts and
//! spreadsheet addressing.
mod a1;
mod amount;
mod event;
mod layout;
mod mapping;
mod transaction;

pub use a1::{A1Range, CellRange, ColumnLetter};
pub use amount::{Amount, AmountError, AmountFormat};
pub use event::{CellEdit, FormSubmission, ItemResponse};
pub use layout::{LedgerField, LedgerLayout};
pub use mapping::{to_camel_case, FormField, MappingError, TitleMapping};
pub use transaction::{Answers, Direction, Posting, Transaction, TransactionKind};

/// Removes empty strings and repeated values from `values`, keeping the first occurrence of each
/// value in its original position. `"0"` is a value like any other.
pub fn unique_choices<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .map(Into::into)
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.clone()))
        .collect()
}
