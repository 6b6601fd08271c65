//! Implements the `Form` trait against the Google Forms v1 API.
//!
//! The REST API identifies items by the hexadecimal form of the numeric ids that the form editor
//! and the submission events use, so `1832671484` is addressed as `6d3c58fc`.

use crate::api::sheet::check_status;
use crate::api::{http_client, ChoiceWidget, Form, TokenProvider};
use crate::Result;
use anyhow::Context;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, trace};

const FORMS_API: &str = "https://forms.googleapis.com/v1/forms";

pub(super) struct GoogleForm {
    form_id: String,
    token_provider: TokenProvider,
}

impl GoogleForm {
    pub(super) fn new(form_id: impl Into<String>, token_provider: TokenProvider) -> Self {
        Self {
            form_id: form_id.into(),
            token_provider,
        }
    }
}

#[async_trait::async_trait]
impl Form for GoogleForm {
    async fn set_choices(
        &mut self,
        item_id: u64,
        widget: ChoiceWidget,
        choices: &[String],
    ) -> Result<()> {
        trace!("set_choices {item_id} {widget}");
        let http = http_client()?;
        let token = self.token_provider.token_with_refresh().await?.to_string();

        let response = http
            .get(format!("{FORMS_API}/{}", self.form_id))
            .bearer_auth(&token)
            .send()
            .await
            .context("Failed to request the form")?;
        let form: FormBody = check_status(response, "read the form")
            .await?
            .json()
            .await
            .context("Failed to parse the form")?;

        let (index, item) = form
            .find(item_id)
            .with_context(|| format!("The form has no item with id {item_id}"))?;
        let question_id = item
            .question_item
            .as_ref()
            .map(|q| q.question.question_id.clone())
            .with_context(|| format!("The form item {item_id} is not a question"))?;
        debug!(
            "Replacing the {} choices of '{}' (item {item_id})",
            choices.len(),
            item.title
        );

        let body = update_choices_request(&item.item_id, &question_id, index, widget, choices);
        let response = http
            .post(format!("{FORMS_API}/{}:batchUpdate", self.form_id))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .context("Failed to request the choice update")?;
        check_status(response, "update the form choices").await?;
        Ok(())
    }
}

fn choice_type(widget: ChoiceWidget) -> &'static str {
    match widget {
        ChoiceWidget::DropDown => "DROP_DOWN",
        ChoiceWidget::Radio => "RADIO",
    }
}

/// A `batchUpdate` body that replaces the options of one choice question and nothing else.
fn update_choices_request(
    rest_item_id: &str,
    question_id: &str,
    index: usize,
    widget: ChoiceWidget,
    choices: &[String],
) -> serde_json::Value {
    let options: Vec<serde_json::Value> = choices.iter().map(|c| json!({ "value": c })).collect();
    json!({
        "requests": [{
            "updateItem": {
                "item": {
                    "itemId": rest_item_id,
                    "questionItem": {
                        "question": {
                            "questionId": question_id,
                            "choiceQuestion": {
                                "type": choice_type(widget),
                                "options": options,
                            }
                        }
                    }
                },
                "location": { "index": index },
                "updateMask": "questionItem.question.choiceQuestion",
            }
        }]
    })
}

#[derive(Debug, Deserialize)]
struct FormBody {
    #[serde(default)]
    items: Vec<FormItem>,
}

impl FormBody {
    fn find(&self, item_id: u64) -> Option<(usize, &FormItem)> {
        self.items
            .iter()
            .enumerate()
            .find(|(_, item)| u64::from_str_radix(&item.item_id, 16).ok() == Some(item_id))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FormItem {
    item_id: String,
    #[serde(default)]
    title: String,
    question_item: Option<QuestionItem>,
}

#[derive(Debug, Deserialize)]
struct QuestionItem {
    question: Question,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Question {
    question_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_item_by_numeric_id() {
        let json = r#"{
            "formId": "abc",
            "items": [
                { "itemId": "0a6bd585", "title": "Action",
                  "questionItem": { "question": { "questionId": "q1", "choiceQuestion": { "type": "RADIO" } } } },
                { "itemId": "6d3c58fc", "title": "Account",
                  "questionItem": { "question": { "questionId": "q2" } } },
                { "itemId": "00ff", "title": "Section", "pageBreakItem": {} }
            ]
        }"#;
        let form: FormBody = serde_json::from_str(json).unwrap();
        let (index, item) = form.find(1832671484).unwrap();
        assert_eq!(index, 1);
        assert_eq!(item.title, "Account");
        assert_eq!(form.find(174839173).unwrap().0, 0);
        assert!(form.find(255).unwrap().1.question_item.is_none());
        assert!(form.find(7).is_none());
    }

    #[test]
    fn test_update_choices_request() {
        let choices = vec!["Cash".to_string(), "Bank".to_string()];
        let body = update_choices_request("6d3c58fc", "q2", 1, ChoiceWidget::DropDown, &choices);
        let update = &body["requests"][0]["updateItem"];
        assert_eq!(update["location"]["index"], 1);
        assert_eq!(update["updateMask"], "questionItem.question.choiceQuestion");
        let choice = &update["item"]["questionItem"]["question"]["choiceQuestion"];
        assert_eq!(choice["type"], "DROP_DOWN");
        assert_eq!(choice["options"][1]["value"], "Bank");
    }
}
