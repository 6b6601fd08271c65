//! Implements the `Form` trait with in-memory data, for the same reasons as `TestSheet`.

use crate::api::{ChoiceWidget, Form};
use crate::config::ItemIds;
use crate::Result;
use anyhow::Context;
use std::collections::{BTreeMap, HashMap};
use std::sync::{LazyLock, Mutex, MutexGuard};

static FORMS: LazyLock<Mutex<HashMap<String, TestFormState>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn registry() -> MutexGuard<'static, HashMap<String, TestFormState>> {
    FORMS.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct TestItem {
    pub(crate) title: String,
    pub(crate) widget: ChoiceWidget,
    pub(crate) choices: Vec<String>,
}

/// The choice items of one in-memory form, by item id.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub(crate) struct TestFormState {
    items: BTreeMap<u64, TestItem>,
    updates: usize,
}

impl TestFormState {
    /// A form with the action item and the four items that the synchronizer fills, at their
    /// default ids.
    pub(crate) fn seeded() -> Self {
        let ids = ItemIds::default();
        let mut state = Self::default();
        state.add_item(
            ids.action,
            "Action",
            ChoiceWidget::Radio,
            &["Spent", "Received", "Reinitialize", "Transferred"],
        );
        state.add_item(ids.origin_account, "Account", ChoiceWidget::DropDown, &[]);
        state.add_item(
            ids.destination_account,
            "Destination account",
            ChoiceWidget::DropDown,
            &[],
        );
        state.add_item(ids.expense_category, "Expense category", ChoiceWidget::Radio, &[]);
        state.add_item(ids.income_category, "Income category", ChoiceWidget::Radio, &[]);
        state
    }

    pub(crate) fn add_item(
        &mut self,
        item_id: u64,
        title: &str,
        widget: ChoiceWidget,
        choices: &[&str],
    ) {
        self.items.insert(
            item_id,
            TestItem {
                title: title.to_string(),
                widget,
                choices: choices.iter().map(|c| c.to_string()).collect(),
            },
        );
    }

    pub(crate) fn item(&self, item_id: u64) -> Option<&TestItem> {
        self.items.get(&item_id)
    }

    /// The number of successful `set_choices` calls.
    pub(crate) fn updates(&self) -> usize {
        self.updates
    }
}

pub(crate) struct TestForm {
    form_id: String,
}

impl TestForm {
    pub(crate) fn new(form_id: impl Into<String>) -> Self {
        let form_id = form_id.into();
        registry()
            .entry(form_id.clone())
            .or_insert_with(TestFormState::seeded);
        Self { form_id }
    }

    pub(crate) fn with_state<R>(form_id: &str, f: impl FnOnce(&mut TestFormState) -> R) -> R {
        let mut registry = registry();
        let state = registry
            .entry(form_id.to_string())
            .or_insert_with(TestFormState::seeded);
        f(state)
    }

    pub(crate) fn state(form_id: &str) -> TestFormState {
        Self::with_state(form_id, |state| state.clone())
    }
}

#[async_trait::async_trait]
impl Form for TestForm {
    async fn set_choices(
        &mut self,
        item_id: u64,
        widget: ChoiceWidget,
        choices: &[String],
    ) -> Result<()> {
        Self::with_state(&self.form_id, |state| {
            let item = state
                .items
                .get_mut(&item_id)
                .with_context(|| format!("The form has no item with id {item_id}"))?;
            item.widget = widget;
            item.choices = choices.to_vec();
            state.updates += 1;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_choices() {
        let id = uuid::Uuid::new_v4().to_string();
        let mut form = TestForm::new(&id);
        let ids = ItemIds::default();
        let choices = vec!["Cash".to_string(), "Bank".to_string()];
        form.set_choices(ids.origin_account, ChoiceWidget::DropDown, &choices)
            .await
            .unwrap();
        assert!(form.set_choices(42, ChoiceWidget::Radio, &choices).await.is_err());

        let state = TestForm::state(&id);
        assert_eq!(state.item(ids.origin_account).unwrap().choices, choices);
        assert_eq!(state.updates(), 1);
        assert!(state.item(ids.destination_account).unwrap().choices.is_empty());
    }
}
