//! The events that drive the two handlers, as they arrive on stdin or at the webhook.

use crate::model::{Answers, CellRange, FormField, MappingError, TitleMapping};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// One answered item of a form response.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ItemResponse {
    pub item_id: u64,
    pub title: String,
    pub response: String,
}

/// A submitted form response.
///
/// ```json
/// {
///   "timestamp": "2024-03-05T14:30:00+02:00",
///   "items": [{ "item_id": 174839173, "title": "Action", "response": "Spent" }]
/// }
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct FormSubmission {
    pub timestamp: DateTime<FixedOffset>,
    pub items: Vec<ItemResponse>,
}

impl FormSubmission {
    /// The answer given to the item `item_id`, if it was answered.
    pub fn response_for(&self, item_id: u64) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.item_id == item_id)
            .map(|item| item.response.as_str())
    }

    /// Maps every answered item except `action_item_id` to its field.
    ///
    /// Blank answers are left out. Tag answers lose their ASCII letters, so `"#12b"` is stored as
    /// `"#12"`. A title that `mapping` does not know is an error, and so are two answered items
    /// that map to the same field.
    pub fn answers(
        &self,
        mapping: &TitleMapping,
        action_item_id: u64,
    ) -> Result<Answers, MappingError> {
        let mut answers = Answers::new();
        for item in self.items.iter().filter(|i| i.item_id != action_item_id) {
            let field = mapping.field(&item.title)?;
            let response = match field {
                FormField::Tag => item
                    .response
                    .chars()
                    .filter(|c| !c.is_ascii_alphabetic())
                    .collect(),
                _ => item.response.trim().to_string(),
            };
            if response.trim().is_empty() {
                continue;
            }
            if answers.contains_key(&field) {
                return Err(MappingError::new(format!(
                    "The item '{}' answers the field '{field}' a second time",
                    item.title
                )));
            }
            answers.insert(field, response);
        }
        Ok(answers)
    }
}

/// A cell edit on the spreadsheet.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct CellEdit {
    pub range: CellRange,
}
