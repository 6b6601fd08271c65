//! Keeps the choice lists of the form in step with the reference ranges of the spreadsheet.
//!
//! The accounts range feeds both the origin and the destination account items, each category range
//! feeds its own item. A refresh replaces the whole choice list of an item with the distinct,
//! non-empty values of its range.

use crate::api::{ChoiceWidget, Form, Workbook};
use crate::model::{unique_choices, CellRange};
use crate::{Config, Result};
use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info, warn};

/// The choices written to one form item.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct RefreshedItem {
    pub item_id: u64,
    pub range: String,
    pub widget: ChoiceWidget,
    pub choices: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    aborted: bool,
    refreshed: Vec<RefreshedItem>,
}

impl SyncReport {
    fn aborted() -> Self {
        Self {
            aborted: true,
            refreshed: Vec::new(),
        }
    }

    /// True when a reference range was missing and no item was looked at.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn refreshed(&self) -> &[RefreshedItem] {
        &self.refreshed
    }

    pub fn message(&self) -> String {
        if self.aborted {
            return "A reference range is missing, the form was not changed".to_string();
        }
        match self.refreshed.len() {
            0 => "No form item needed a refresh".to_string(),
            n => format!("Refreshed the choices of {n} form item(s)"),
        }
    }
}

/// A reference range and the form items that show its values.
struct Target {
    name: String,
    range: CellRange,
    item_ids: Vec<u64>,
    widget: ChoiceWidget,
}

/// Resolves the three reference ranges. `None` when any of them is missing.
async fn targets(config: &Config, workbook: &mut Workbook) -> Result<Option<Vec<Target>>> {
    let names = config.ranges();
    let items = config.items();
    let wanted = [
        (
            &names.accounts,
            vec![items.origin_account, items.destination_account],
            ChoiceWidget::DropDown,
        ),
        (
            &names.expense_categories,
            vec![items.expense_category],
            ChoiceWidget::Radio,
        ),
        (
            &names.income_categories,
            vec![items.income_category],
            ChoiceWidget::Radio,
        ),
    ];

    let mut targets = Vec::with_capacity(wanted.len());
    for (name, item_ids, widget) in wanted {
        let Some(range) = workbook.named_range(name).await? else {
            warn!("The named range '{name}' is missing, no form choices were refreshed");
            return Ok(None);
        };
        targets.push(Target {
            name: name.clone(),
            range,
            item_ids,
            widget,
        });
    }
    Ok(Some(targets))
}

/// Refreshes the items whose reference range shares at least one cell with `edited`.
pub(crate) async fn sync_edit(
    config: &Config,
    workbook: &mut Workbook,
    form: &mut (dyn Form + Send),
    edited: &CellRange,
) -> Result<SyncReport> {
    let Some(targets) = targets(config, workbook).await? else {
        return Ok(SyncReport::aborted());
    };
    let touched: Vec<Target> = targets
        .into_iter()
        .filter(|t| t.range.intersects(edited))
        .collect();
    if touched.is_empty() {
        debug!("The edit of {edited:?} is outside of every reference range");
    }
    refresh(workbook, form, touched).await
}

/// Refreshes every item, whatever was edited.
pub(crate) async fn sync_all(
    config: &Config,
    workbook: &mut Workbook,
    form: &mut (dyn Form + Send),
) -> Result<SyncReport> {
    let Some(targets) = targets(config, workbook).await? else {
        return Ok(SyncReport::aborted());
    };
    refresh(workbook, form, targets).await
}

async fn refresh(
    workbook: &mut Workbook,
    form: &mut (dyn Form + Send),
    targets: Vec<Target>,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    for target in targets {
        let values = workbook.range_values(&target.name, &target.range).await?;
        let choices = unique_choices(values.iter().map(|v| v.trim()));
        // A choice question cannot be left without options.
        if choices.is_empty() {
            warn!(
                "The named range '{}' has no values, the choices of item(s) {:?} were kept",
                target.name, target.item_ids
            );
            continue;
        }

        for item_id in target.item_ids {
            form.set_choices(item_id, target.widget, &choices)
                .await
                .with_context(|| {
                    format!(
                        "Unable to refresh the choices of item {item_id} from '{}'",
                        target.name
                    )
                })?;
            info!(
                "Refreshed item {item_id} with {} choice(s) from '{}'",
                choices.len(),
                target.name
            );
            report.refreshed.push(RefreshedItem {
                item_id,
                range: target.name.clone(),
                widget: target.widget,
                choices: choices.clone(),
            });
        }
    }
    Ok(report)
}
