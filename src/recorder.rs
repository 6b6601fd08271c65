//! Turns a form submission into rows of the ledger.
//!
//! A `spent` or `received` submission is one row. A `reinitialize` submission is compared against
//! the stored balance of its account and becomes one adjusting row, or nothing when the balance
//! already matches. A `transferred` submission becomes two or three rows that are written one after
//! the other. Nothing is rolled back when a later row fails.

use crate::api::{AppendedRow, Workbook};
use crate::model::{Amount, Direction, FormSubmission, Posting, Transaction, TransactionKind};
use crate::{Config, Result};
use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub(crate) const REINIT_CATEGORY: &str = "❖ Missing";
pub(crate) const COMMISSION_CATEGORY: &str = "❖ Commission";
const REINIT_DESCRIPTION: &str = "Account's balance reinitialized";

/// Held from the first read of the ledger until the last row of a submission is written, so that
/// two submissions handled by this process never pick the same empty row.
static LEDGER_LOCK: Mutex<()> = Mutex::const_new(());

/// What happened to a submission.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// One or more rows were written.
    Recorded,
    /// The action was missing or not recognized.
    Ignored,
    /// A reinitialization matched the stored balance.
    Unchanged,
    /// A reference range or the account was missing.
    Aborted,
}

serde_plain::derive_display_from_serialize!(Outcome);

#[derive(Debug, Clone, Serialize)]
pub struct RecordReport {
    kind: Option<TransactionKind>,
    outcome: Outcome,
    rows: Vec<AppendedRow>,
}

impl RecordReport {
    fn new(kind: Option<TransactionKind>, outcome: Outcome, rows: Vec<AppendedRow>) -> Self {
        Self {
            kind,
            outcome,
            rows,
        }
    }

    pub fn kind(&self) -> Option<TransactionKind> {
        self.kind
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn rows(&self) -> &[AppendedRow] {
        &self.rows
    }

    pub fn message(&self) -> String {
        let kind = self
            .kind
            .map(|k| k.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        match self.outcome {
            Outcome::Recorded => format!(
                "Recorded the {kind} submission in {} row(s)",
                self.rows.len()
            ),
            Outcome::Ignored => "Ignored a submission without a recognized action".to_string(),
            Outcome::Unchanged => "The balance already matches, nothing was recorded".to_string(),
            Outcome::Aborted => format!("The {kind} submission was not recorded"),
        }
    }
}

/// Records `submission` in the ledger.
///
/// # Errors
/// - An answered item has a title that the configured mapping does not know.
/// - The amount or account is missing, or a numeric answer does not parse.
/// - A transfer has no destination or a non-positive amount.
/// - The spreadsheet cannot be read or written.
pub(crate) async fn record(
    config: &Config,
    workbook: &mut Workbook,
    submission: &FormSubmission,
) -> Result<RecordReport> {
    let action_item = config.items().action;
    let action = submission.response_for(action_item);
    let Some(kind) = action.and_then(TransactionKind::from_answer) else {
        warn!(
            "Ignoring the submission of {}, its action {:?} is not recognized",
            submission.timestamp, action
        );
        return Ok(RecordReport::new(None, Outcome::Ignored, Vec::new()));
    };

    let answers = submission
        .answers(config.title_mapping(), action_item)
        .context("Unable to map the answers of the submission")?;
    let transaction = Transaction::from_answers(&answers, submission.timestamp)?;
    debug!(
        "Recording a {kind} submission of {} on '{}'",
        transaction.amount(),
        transaction.account()
    );

    let _guard = LEDGER_LOCK.lock().await;
    let (outcome, rows) = match kind {
        TransactionKind::Spent => {
            let posting = Posting::new(Direction::Expense, transaction);
            (Outcome::Recorded, vec![append(config, workbook, &posting).await?])
        }
        TransactionKind::Received => {
            let posting = Posting::new(Direction::Income, transaction);
            (Outcome::Recorded, vec![append(config, workbook, &posting).await?])
        }
        TransactionKind::Reinitialize => reinitialize(config, workbook, transaction).await?,
        TransactionKind::Transferred => {
            (Outcome::Recorded, transfer(config, workbook, transaction).await?)
        }
    };

    Ok(RecordReport::new(Some(kind), outcome, rows))
}

async fn append(
    config: &Config,
    workbook: &mut Workbook,
    posting: &Posting,
) -> Result<AppendedRow> {
    workbook
        .append_posting(config.ledger_sheet_id(), config.layout(), posting)
        .await
}

/// Writes the difference between the submitted balance and the stored one as an adjusting row.
async fn reinitialize(
    config: &Config,
    workbook: &mut Workbook,
    transaction: Transaction,
) -> Result<(Outcome, Vec<AppendedRow>)> {
    let names = config.ranges();
    let Some(accounts_range) = workbook.named_range(&names.accounts).await? else {
        warn!("The named range '{}' is missing, nothing was reinitialized", names.accounts);
        return Ok((Outcome::Aborted, Vec::new()));
    };
    let Some(amounts_range) = workbook.named_range(&names.accounts_amount).await? else {
        warn!(
            "The named range '{}' is missing, nothing was reinitialized",
            names.accounts_amount
        );
        return Ok((Outcome::Aborted, Vec::new()));
    };

    let accounts = workbook.range_values(&names.accounts, &accounts_range).await?;
    let amounts = workbook
        .range_values(&names.accounts_amount, &amounts_range)
        .await?;

    let account = transaction.account();
    let Some(position) = accounts.iter().position(|a| a.trim() == account) else {
        warn!("The account '{account}' is not listed in '{}'", names.accounts);
        return Ok((Outcome::Aborted, Vec::new()));
    };
    let stored = amounts.get(position).map(String::as_str).unwrap_or_default();
    let stored = Amount::from_str(stored)
        .with_context(|| format!("The stored balance '{stored}' of '{account}' is not an amount"))?;

    let submitted = transaction.amount();
    if submitted.value() == stored.value() {
        info!("The balance of '{account}' is already {submitted}");
        return Ok((Outcome::Unchanged, Vec::new()));
    }

    let difference = submitted - stored;
    let direction = Direction::of(difference);
    debug!("Reinitializing '{account}' from {stored} to {submitted}");

    let beneficiary = config.reinit_beneficiary(account).map(str::to_string);
    let mut adjusting = transaction
        .with_amount(difference)
        .with_description(REINIT_DESCRIPTION)
        .with_category(direction, REINIT_CATEGORY);
    if let Some(beneficiary) = beneficiary {
        adjusting = adjusting.with_beneficiary(beneficiary);
    }

    let posting = Posting::by_sign(adjusting.with_blank_fields());
    let row = append(config, workbook, &posting).await?;
    Ok((Outcome::Recorded, vec![row]))
}

/// Writes the legs of a transfer in order: origin, destination, then the commission if any.
async fn transfer(
    config: &Config,
    workbook: &mut Workbook,
    transaction: Transaction,
) -> Result<Vec<AppendedRow>> {
    let origin = transaction.account().to_string();
    let destination = transaction
        .destination_account()
        .map(str::to_string)
        .context("A transfer needs a destination account")?;
    let amount = transaction.amount();
    ensure!(
        amount.is_positive(),
        "A transfer needs a positive amount, got {amount}"
    );

    let credited = transaction.destination_currency_amount().unwrap_or(amount);
    let mut legs = vec![
        transaction
            .clone()
            .with_amount(-amount)
            .with_description(format!("Transfer to {destination}")),
        transaction
            .clone()
            .with_account(&destination)
            .with_amount(credited.abs())
            .with_description(format!("Transfer from {origin}")),
    ];
    if let Some(commission) = transaction.commission() {
        legs.push(
            transaction
                .with_amount(-commission.abs())
                .with_description(format!(
                    "Commission for transfer from {origin} to {destination}"
                ))
                .with_category(Direction::Expense, COMMISSION_CATEGORY),
        );
    }

    let total = legs.len();
    let mut rows = Vec::with_capacity(total);
    for (written, leg) in legs.into_iter().enumerate() {
        let posting = Posting::by_sign(leg.with_blank_fields());
        let row = append(config, workbook, &posting).await.with_context(|| {
            format!(
                "Unable to write row {} of {total} of the transfer from '{origin}' to \
                '{destination}', {written} row(s) were already written",
                written + 1
            )
        })?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::sheet_test_client::{BALANCES_SHEET_ID, TRANSACTIONS_SHEET_ID};
    use crate::config::BeneficiaryRule;
    use crate::model::{FormSubmission, ItemResponse, LedgerLayout};
    use crate::test::{submission, TestEnv};

    async fn run(env: &TestEnv, submission: &FormSubmission) -> Result<RecordReport> {
        let mut workbook = Workbook::new(env.sheet().await);
        record(&env.config(), &mut workbook, submission).await
    }

    fn ledger_row(env: &TestEnv, row: u32) -> Vec<String> {
        env.sheet_state()
            .rows(TRANSACTIONS_SHEET_ID)
            .get(row as usize - 1)
            .cloned()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_spent_is_one_negative_row() {
        let env = TestEnv::new().await;
        let report = run(
            &env,
            &submission(
                "Spent",
                &[
                    ("Amount", "12.50"),
                    ("Account", "Cash"),
                    ("Description", "Lunch"),
                    ("Expense category", "Food"),
                ],
            ),
        )
        .await
        .unwrap();

        assert_eq!(report.outcome(), Outcome::Recorded);
        assert_eq!(report.kind(), Some(TransactionKind::Spent));
        assert_eq!(report.rows().len(), 1);
        let row = &report.rows()[0];
        assert_eq!(row.direction, Direction::Expense);
        assert_eq!(row.range, "Transactions!B5:F5");
        assert_eq!(
            row.values,
            vec!["2024-03-05 14:30:00", "-12.50", "Cash", "Lunch", "Food"]
        );
        assert_eq!(ledger_row(&env, 5)[2], "-12.50");
    }

    #[tokio::test]
    async fn test_received_is_one_positive_row() {
        let env = TestEnv::new().await;
        let report = run(
            &env,
            &submission("received", &[("Amount", "2000"), ("Account", "Bank")]),
        )
        .await
        .unwrap();
        assert_eq!(report.rows().len(), 1);
        assert_eq!(report.rows()[0].direction, Direction::Income);
        assert_eq!(report.rows()[0].values[1], "2000");
    }

    #[tokio::test]
    async fn test_negative_answers_keep_their_meaning() {
        let env = TestEnv::new().await;
        let spent = submission("Spent", &[("Amount", "-5"), ("Account", "Cash")]);
        let received = submission("Received", &[("Amount", "-5"), ("Account", "Cash")]);
        assert_eq!(run(&env, &spent).await.unwrap().rows()[0].values[1], "5");
        assert_eq!(run(&env, &received).await.unwrap().rows()[0].values[1], "-5");

        let env = TestEnv::with_layout(LedgerLayout::Split).await;
        let report = run(&env, &spent).await.unwrap();
        assert_eq!(report.rows()[0].range, "Transactions!B5:D5");
        assert_eq!(report.rows()[0].values[1], "-5");
        let report = run(&env, &received).await.unwrap();
        assert_eq!(report.rows()[0].range, "Transactions!I5:K5");
        assert_eq!(report.rows()[0].values[1], "-5");
    }

    #[tokio::test]
    async fn test_user_date_is_overridden() {
        let env = TestEnv::new().await;
        let report = run(
            &env,
            &submission(
                "Spent",
                &[("Date", "1999-01-01"), ("Amount", "1"), ("Account", "Cash")],
            ),
        )
        .await
        .unwrap();
        assert_eq!(report.rows()[0].values[0], "2024-03-05 14:30:00");
    }

    #[tokio::test]
    async fn test_unknown_action_is_ignored() {
        let env = TestEnv::new().await;
        let before = env.sheet_state();
        let report = run(
            &env,
            &submission("Borrowed", &[("Amount", "1"), ("Account", "Cash")]),
        )
        .await
        .unwrap();
        assert_eq!(report.outcome(), Outcome::Ignored);
        assert_eq!(report.kind(), None);
        assert!(report.rows().is_empty());
        assert_eq!(env.sheet_state(), before);
    }

    #[tokio::test]
    async fn test_missing_action_is_ignored() {
        let env = TestEnv::new().await;
        let submission = FormSubmission {
            timestamp: chrono::DateTime::parse_from_rfc3339(crate::test::TIMESTAMP).unwrap(),
            items: vec![ItemResponse {
                item_id: 1,
                title: "Amount".to_string(),
                response: "3".to_string(),
            }],
        };
        let report = run(&env, &submission).await.unwrap();
        assert_eq!(report.outcome(), Outcome::Ignored);
    }

    #[tokio::test]
    async fn test_unknown_title_is_an_error() {
        let env = TestEnv::new().await;
        let err = run(
            &env,
            &submission(
                "Spent",
                &[("Amount", "1"), ("Account", "Cash"), ("Mood", "Happy")],
            ),
        )
        .await
        .unwrap_err();
        assert!(format!("{err:#}").contains("Mood"));
        assert_eq!(ledger_row(&env, 5), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_missing_amount_is_an_error() {
        let env = TestEnv::new().await;
        assert!(run(&env, &submission("Spent", &[("Account", "Cash")]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_reinit_up_is_income() {
        let env = TestEnv::new().await;
        let report = run(
            &env,
            &submission("Reinitialize", &[("Amount", "150"), ("Account", "Cash")]),
        )
        .await
        .unwrap();
        assert_eq!(report.outcome(), Outcome::Recorded);
        assert_eq!(report.rows().len(), 1);
        let row = &report.rows()[0];
        assert_eq!(row.direction, Direction::Income);
        assert_eq!(row.range, "Transactions!B5:I5");
        assert_eq!(
            row.values,
            vec![
                "2024-03-05 14:30:00",
                "50.00",
                "Cash",
                "",
                "",
                REINIT_DESCRIPTION,
                REINIT_CATEGORY,
                ""
            ]
        );
    }

    #[tokio::test]
    async fn test_reinit_down_reads_formatted_balance() {
        let env = TestEnv::new().await;
        let report = run(
            &env,
            &submission("reinitialised", &[("Amount", "1000"), ("Account", "Bank")]),
        )
        .await
        .unwrap();
        let row = &report.rows()[0];
        assert_eq!(row.direction, Direction::Expense);
        assert_eq!(row.values[1], "-250.50");
        assert_eq!(row.values[6], "");
        assert_eq!(row.values[7], REINIT_CATEGORY);
    }

    #[tokio::test]
    async fn test_reinit_empty_balance_reads_as_zero() {
        let env = TestEnv::new().await;
        let report = run(
            &env,
            &submission("Reinitialize", &[("Amount", "30"), ("Account", "Card")]),
        )
        .await
        .unwrap();
        assert_eq!(report.rows()[0].direction, Direction::Income);
        assert_eq!(report.rows()[0].values[1], "30");
    }

    #[tokio::test]
    async fn test_reinit_unchanged() {
        let env = TestEnv::new().await;
        let before = env.sheet_state();
        let report = run(
            &env,
            &submission("Reinitialize", &[("Amount", "100"), ("Account", "Cash")]),
        )
        .await
        .unwrap();
        assert_eq!(report.outcome(), Outcome::Unchanged);
        assert!(report.rows().is_empty());
        assert_eq!(env.sheet_state(), before);
    }

    #[tokio::test]
    async fn test_reinit_unknown_account_aborts() {
        let env = TestEnv::new().await;
        let report = run(
            &env,
            &submission("Reinitialize", &[("Amount", "5"), ("Account", "Piggy bank")]),
        )
        .await
        .unwrap();
        assert_eq!(report.outcome(), Outcome::Aborted);
        assert!(report.rows().is_empty());
    }

    #[tokio::test]
    async fn test_reinit_missing_range_aborts() {
        let env = TestEnv::new().await;
        env.with_sheet_state(|s| s.remove_named_range("BalancesAccountsAmount"));
        let before = env.sheet_state();
        let report = run(
            &env,
            &submission("Reinitialize", &[("Amount", "5"), ("Account", "Cash")]),
        )
        .await
        .unwrap();
        assert_eq!(report.outcome(), Outcome::Aborted);
        assert_eq!(env.sheet_state(), before);
    }

    #[tokio::test]
    async fn test_reinit_beneficiary_rule() {
        let mut env = TestEnv::new().await;
        env.config_mut()
            .config_file_mut()
            .set_reinit_beneficiaries(vec![BeneficiaryRule {
                account_prefix: "A ".to_string(),
                beneficiary: "Andrei".to_string(),
            }]);
        let report = run(
            &env,
            &submission("Reinitialize", &[("Amount", "25"), ("Account", "A Wallet")]),
        )
        .await
        .unwrap();
        assert_eq!(report.rows()[0].values[3], "Andrei");
        assert_eq!(env.sheet_state().rows(BALANCES_SHEET_ID)[5][1], "$20.00");
    }

    #[tokio::test]
    async fn test_transfer_without_commission() {
        let env = TestEnv::new().await;
        let report = run(
            &env,
            &submission(
                "Transferred",
                &[
                    ("Amount", "100"),
                    ("Account", "Cash"),
                    ("Destination account", "Bank"),
                ],
            ),
        )
        .await
        .unwrap();
        let rows = report.rows();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].direction, Direction::Expense);
        assert_eq!(rows[0].range, "Transactions!B5:I5");
        assert_eq!(rows[0].values[1], "-100");
        assert_eq!(rows[0].values[2], "Cash");
        assert_eq!(rows[0].values[5], "Transfer to Bank");

        assert_eq!(rows[1].direction, Direction::Income);
        assert_eq!(rows[1].range, "Transactions!B6:I6");
        assert_eq!(rows[1].values[1], "100");
        assert_eq!(rows[1].values[2], "Bank");
        assert_eq!(rows[1].values[5], "Transfer from Cash");
    }

    #[tokio::test]
    async fn test_transfer_with_commission_and_currency() {
        let env = TestEnv::new().await;
        let report = run(
            &env,
            &submission(
                "Transferred",
                &[
                    ("Amount", "100"),
                    ("Account", "Cash"),
                    ("Destination account", "Bank"),
                    ("Destination currency amount", "90"),
                    ("Commission", "2"),
                ],
            ),
        )
        .await
        .unwrap();
        let rows = report.rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].values[1], "90");

        let commission = &rows[2];
        assert_eq!(commission.direction, Direction::Expense);
        assert_eq!(commission.range, "Transactions!B7:I7");
        assert_eq!(commission.values[1], "-2");
        assert_eq!(commission.values[2], "Cash");
        assert_eq!(
            commission.values[5],
            "Commission for transfer from Cash to Bank"
        );
        assert_eq!(commission.values[7], COMMISSION_CATEGORY);
        assert_eq!(ledger_row(&env, 7)[8], COMMISSION_CATEGORY);
    }

    #[tokio::test]
    async fn test_transfer_zero_commission_is_absent() {
        let env = TestEnv::new().await;
        let report = run(
            &env,
            &submission(
                "Transferred",
                &[
                    ("Amount", "10"),
                    ("Account", "Cash"),
                    ("Destination account", "Bank"),
                    ("Comission", "0"),
                ],
            ),
        )
        .await
        .unwrap();
        assert_eq!(report.rows().len(), 2);
    }

    #[tokio::test]
    async fn test_transfer_requirements() {
        let env = TestEnv::new().await;
        let no_destination = submission("Transferred", &[("Amount", "10"), ("Account", "Cash")]);
        assert!(run(&env, &no_destination).await.is_err());

        let negative = submission(
            "Transferred",
            &[
                ("Amount", "-10"),
                ("Account", "Cash"),
                ("Destination account", "Bank"),
            ],
        );
        assert!(run(&env, &negative).await.is_err());
        assert_eq!(ledger_row(&env, 5), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_failed_transfer_leg_keeps_earlier_rows() {
        let env = TestEnv::new().await;
        env.with_sheet_state(|state| state.fail_writes_after(1));
        let err = run(
            &env,
            &submission(
                "Transferred",
                &[
                    ("Amount", "100"),
                    ("Account", "Cash"),
                    ("Destination account", "Bank"),
                    ("Commission", "2"),
                ],
            ),
        )
        .await
        .unwrap_err();

        let message = format!("{err:#}");
        assert!(message.contains("row 2 of 3"), "{message}");
        assert!(message.contains("1 row(s) were already written"), "{message}");
        assert_eq!(ledger_row(&env, 5)[2], "-100");
        assert_eq!(ledger_row(&env, 5)[6], "Transfer to Bank");
        assert_eq!(ledger_row(&env, 6), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_split_layout_transfer() {
        let env = TestEnv::with_layout(LedgerLayout::Split).await;
        let report = run(
            &env,
            &submission(
                "Transferred",
                &[
                    ("Amount", "40"),
                    ("Account", "Cash"),
                    ("Destination account", "Bank"),
                ],
            ),
        )
        .await
        .unwrap();
        let rows = report.rows();
        assert_eq!(rows[0].range, "Transactions!B5:G5");
        assert_eq!(rows[0].values[1], "40");
        assert_eq!(rows[1].range, "Transactions!I5:N5");
        assert_eq!(rows[1].values[2], "Bank");
    }

    #[tokio::test]
    async fn test_concurrent_submissions_use_distinct_rows() {
        let env = TestEnv::new().await;
        let first = submission("Spent", &[("Amount", "1"), ("Account", "Cash")]);
        let second = submission("Spent", &[("Amount", "2"), ("Account", "Bank")]);
        let (a, b) = tokio::join!(run(&env, &first), run(&env, &second));
        let mut ranges = vec![
            a.unwrap().rows()[0].range.clone(),
            b.unwrap().rows()[0].range.clone(),
        ];
        ranges.sort();
        assert_eq!(ranges, vec!["Transactions!B5:D5", "Transactions!B6:D6"]);
    }
}
