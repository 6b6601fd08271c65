use crate::model::{Amount, FormField};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// The answers of one form submission, keyed by the field each item maps to.
pub type Answers = BTreeMap<FormField, String>;

/// The kinds of submission that the action item can select.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Spent,
    Received,
    #[serde(alias = "reinitialised")]
    Reinitialize,
    Transferred,
}

serde_plain::derive_display_from_serialize!(TransactionKind);
serde_plain::derive_fromstr_from_deserialize!(TransactionKind);

impl TransactionKind {
    /// Reads the answer of the action item. Unknown tokens are `None`.
    pub fn from_answer(answer: &str) -> Option<Self> {
        TransactionKind::from_str(&answer.trim().to_lowercase()).ok()
    }
}

/// Which side of the ledger a row belongs to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Expense,
    Income,
}

serde_plain::derive_display_from_serialize!(Direction);
serde_plain::derive_fromstr_from_deserialize!(Direction);

impl Direction {
    /// Positive amounts are income, everything else is an expense.
    pub fn of(amount: Amount) -> Self {
        if amount.is_positive() {
            Direction::Income
        } else {
            Direction::Expense
        }
    }
}

/// A transaction as it is built from a form submission, or derived from one for a reinit or a
/// transfer. The amount is signed for derived transactions and as-entered for plain ones.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Transaction {
    date: DateTime<FixedOffset>,
    amount: Amount,
    account: String,
    beneficiary: Option<String>,
    tag: Option<String>,
    description: Option<String>,
    category: Option<String>,
    expense_category: Option<String>,
    income_category: Option<String>,
    destination_account: Option<String>,
    commission: Option<Amount>,
    destination_currency_amount: Option<Amount>,
}

impl Transaction {
    pub fn new(date: DateTime<FixedOffset>, amount: Amount, account: impl Into<String>) -> Self {
        Self {
            date,
            amount,
            account: account.into(),
            beneficiary: None,
            tag: None,
            description: None,
            category: None,
            expense_category: None,
            income_category: None,
            destination_account: None,
            commission: None,
            destination_currency_amount: None,
        }
    }

    /// Builds the transaction described by `answers`, dated `timestamp`. Any user-entered date is
    /// ignored.
    ///
    /// `amount` and `account` are required. Numeric fields must parse as amounts.
    pub fn from_answers(answers: &Answers, timestamp: DateTime<FixedOffset>) -> Result<Self> {
        let amount = required(answers, FormField::Amount)?;
        let amount = parse_amount(FormField::Amount, amount)?;
        let account = required(answers, FormField::Account)?;

        let text = |field: FormField| answers.get(&field).cloned();
        let number = |field: FormField| -> Result<Option<Amount>> {
            answers
                .get(&field)
                .map(|value| parse_amount(field, value))
                .transpose()
        };

        Ok(Self {
            beneficiary: text(FormField::Beneficiary),
            tag: text(FormField::Tag),
            description: text(FormField::Description),
            category: text(FormField::Category),
            expense_category: text(FormField::ExpenseCategory),
            income_category: text(FormField::IncomeCategory),
            destination_account: text(FormField::DestinationAccount),
            commission: number(FormField::Commission)?,
            destination_currency_amount: number(FormField::DestinationCurrencyAmount)?,
            ..Self::new(timestamp, amount, account)
        })
    }

    pub fn date(&self) -> DateTime<FixedOffset> {
        self.date
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn beneficiary(&self) -> Option<&str> {
        self.beneficiary.as_deref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn expense_category(&self) -> Option<&str> {
        self.expense_category.as_deref()
    }

    pub fn income_category(&self) -> Option<&str> {
        self.income_category.as_deref()
    }

    pub fn destination_account(&self) -> Option<&str> {
        self.destination_account.as_deref()
    }

    /// The commission of a transfer. A zero commission is reported as `None`.
    pub fn commission(&self) -> Option<Amount> {
        self.commission.filter(|c| !c.is_zero())
    }

    /// The amount credited to the destination of a transfer, when it differs in currency. Zero is
    /// reported as `None`.
    pub fn destination_currency_amount(&self) -> Option<Amount> {
        self.destination_currency_amount.filter(|a| !a.is_zero())
    }

    /// The category that applies to a row on the `direction` side: the matching split category,
    /// falling back to the single category answer.
    pub fn category_for(&self, direction: Direction) -> Option<&str> {
        let matched = match direction {
            Direction::Expense => self.expense_category(),
            Direction::Income => self.income_category(),
        };
        matched
            .filter(|c| !c.is_empty())
            .or(self.category())
            .or(matched)
    }

    pub fn with_amount(self, amount: Amount) -> Self {
        Self { amount, ..self }
    }

    pub fn with_account(self, account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            ..self
        }
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self
        }
    }

    pub fn with_beneficiary(self, beneficiary: impl Into<String>) -> Self {
        Self {
            beneficiary: Some(beneficiary.into()),
            ..self
        }
    }

    /// Replaces both split categories: `category` goes on the `direction` side and the other side
    /// is cleared.
    pub fn with_category(self, direction: Direction, category: impl Into<String>) -> Self {
        let category = Some(category.into());
        match direction {
            Direction::Expense => Self {
                expense_category: category,
                income_category: None,
                ..self
            },
            Direction::Income => Self {
                expense_category: None,
                income_category: category,
                ..self
            },
        }
    }

    /// Makes every text field that a ledger row can show present, using an empty string for the
    /// ones that are absent. Rows written from such a transaction always span every mapped column.
    pub fn with_blank_fields(self) -> Self {
        let blank = |value: Option<String>| Some(value.unwrap_or_default());
        Self {
            beneficiary: blank(self.beneficiary),
            tag: blank(self.tag),
            description: blank(self.description),
            expense_category: blank(self.expense_category),
            income_category: blank(self.income_category),
            ..self
        }
    }
}

fn required(answers: &Answers, field: FormField) -> Result<&str> {
    answers
        .get(&field)
        .map(String::as_str)
        .with_context(|| format!("The submission has no answer for '{field}'"))
}

fn parse_amount(field: FormField, value: &str) -> Result<Amount> {
    Amount::from_str(value)
        .with_context(|| format!("The answer '{value}' for '{field}' is not an amount"))
}

/// A transaction together with the side of the ledger it is written to.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    direction: Direction,
    transaction: Transaction,
    /// Derived postings carry their sign in the amount. Plain ones carry the amount as entered.
    derived: bool,
}

impl Posting {
    /// A plain posting, routed by the kind of the submission.
    pub fn new(direction: Direction, transaction: Transaction) -> Self {
        Self {
            direction,
            transaction,
            derived: false,
        }
    }

    /// Routes a derived transaction by the sign of its amount.
    pub fn by_sign(transaction: Transaction) -> Self {
        Self {
            direction: Direction::of(transaction.amount()),
            transaction,
            derived: true,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_derived(&self) -> bool {
        self.derived
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn timestamp() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-05T14:30:00+02:00").unwrap()
    }

    fn answers(pairs: &[(FormField, &str)]) -> Answers {
        pairs
            .iter()
            .map(|(field, value)| (*field, value.to_string()))
            .collect()
    }

    #[test]
    fn test_kind_from_answer() {
        assert_eq!(
            TransactionKind::from_answer("Spent"),
            Some(TransactionKind::Spent)
        );
        assert_eq!(
            TransactionKind::from_answer(" RECEIVED "),
            Some(TransactionKind::Received)
        );
        assert_eq!(
            TransactionKind::from_answer("Reinitialised"),
            Some(TransactionKind::Reinitialize)
        );
        assert_eq!(
            TransactionKind::from_answer("reinitialize"),
            Some(TransactionKind::Reinitialize)
        );
        assert_eq!(
            TransactionKind::from_answer("Transferred"),
            Some(TransactionKind::Transferred)
        );
        assert_eq!(TransactionKind::from_answer("borrowed"), None);
        assert_eq!(TransactionKind::Reinitialize.to_string(), "reinitialize");
    }

    #[test]
    fn test_direction_of_amount() {
        assert_eq!(
            Direction::of(Amount::from_str("5").unwrap()),
            Direction::Income
        );
        assert_eq!(
            Direction::of(Amount::from_str("-5").unwrap()),
            Direction::Expense
        );
        assert_eq!(Direction::of(Amount::default()), Direction::Expense);
    }

    #[test]
    fn test_from_answers() {
        let answers = answers(&[
            (FormField::Amount, "12.50"),
            (FormField::Account, "Cash"),
            (FormField::Beneficiary, "Bakery"),
            (FormField::ExpenseCategory, "Food"),
            (FormField::Commission, "0"),
        ]);
        let tx = Transaction::from_answers(&answers, timestamp()).unwrap();
        assert_eq!(tx.amount().value(), Decimal::new(1250, 2));
        assert_eq!(tx.account(), "Cash");
        assert_eq!(tx.beneficiary(), Some("Bakery"));
        assert_eq!(tx.tag(), None);
        assert_eq!(tx.date(), timestamp());
        assert_eq!(tx.commission(), None);
        assert_eq!(tx.category_for(Direction::Expense), Some("Food"));
        assert_eq!(tx.category_for(Direction::Income), None);
    }

    #[test]
    fn test_from_answers_requires_amount_and_account() {
        let no_account = answers(&[(FormField::Amount, "1")]);
        let err = Transaction::from_answers(&no_account, timestamp()).unwrap_err();
        assert!(err.to_string().contains("account"));

        let no_amount = answers(&[(FormField::Account, "Cash")]);
        assert!(Transaction::from_answers(&no_amount, timestamp()).is_err());

        let bad_amount = answers(&[(FormField::Amount, "lots"), (FormField::Account, "Cash")]);
        assert!(Transaction::from_answers(&bad_amount, timestamp()).is_err());
    }

    #[test]
    fn test_category_fallback() {
        let answers = answers(&[
            (FormField::Amount, "1"),
            (FormField::Account, "Cash"),
            (FormField::Category, "Gifts"),
        ]);
        let tx = Transaction::from_answers(&answers, timestamp()).unwrap();
        assert_eq!(tx.category_for(Direction::Income), Some("Gifts"));

        let tx = tx.with_blank_fields();
        assert_eq!(tx.category_for(Direction::Expense), Some("Gifts"));

        let tx = tx.with_category(Direction::Income, "❖ Missing");
        assert_eq!(tx.category_for(Direction::Income), Some("❖ Missing"));
        assert_eq!(tx.expense_category(), None);
    }

    #[test]
    fn test_with_blank_fields() {
        let tx = Transaction::new(timestamp(), Amount::from_str("3").unwrap(), "Cash")
            .with_description("Transfer to Bank")
            .with_blank_fields();
        assert_eq!(tx.beneficiary(), Some(""));
        assert_eq!(tx.tag(), Some(""));
        assert_eq!(tx.description(), Some("Transfer to Bank"));
        assert_eq!(tx.expense_category(), Some(""));
        assert_eq!(tx.income_category(), Some(""));
        assert_eq!(tx.category_for(Direction::Expense), Some(""));
    }

    #[test]
    fn test_posting_by_sign() {
        let tx = Transaction::new(timestamp(), Amount::from_str("-3").unwrap(), "Cash");
        assert_eq!(Posting::by_sign(tx.clone()).direction(), Direction::Expense);
        assert!(Posting::by_sign(tx.clone()).is_derived());
        assert!(!Posting::new(Direction::Income, tx.clone()).is_derived());
        let tx = tx.with_amount(Amount::from_str("3").unwrap());
        assert_eq!(Posting::by_sign(tx).direction(), Direction::Income);
    }
}
