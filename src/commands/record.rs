use crate::api::{self, Workbook};
use crate::commands::Out;
use crate::model::FormSubmission;
use crate::recorder::{self, RecordReport};
use crate::{utils, Config, Mode, Result};
use anyhow::Context;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Records one form submission, read as JSON from `input` or from stdin when `input` is `None`.
pub async fn record(config: Config, mode: Mode, input: Option<&Path>) -> Result<Out<RecordReport>> {
    let json = match input {
        Some(path) => utils::read(path).await?,
        None => {
            let mut json = String::new();
            tokio::io::stdin()
                .read_to_string(&mut json)
                .await
                .context("Unable to read the submission from stdin")?;
            json
        }
    };
    let submission: FormSubmission =
        serde_json::from_str(&json).context("Unable to parse the form submission")?;
    debug!("Read a submission with {} answer(s)", submission.items.len());

    let mut workbook = Workbook::new(api::sheet(&config, mode).await?);
    let report = recorder::record(&config, &mut workbook, &submission).await?;
    Ok(Out::new(report.message(), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::Outcome;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_record_from_file() {
        let env = TestEnv::new().await;
        let path = env.config().root().join("submission.json");
        utils::write(
            &path,
            r#"{
                "timestamp": "2024-03-05T14:30:00+02:00",
                "items": [
                    { "item_id": 174839173, "title": "Action", "response": "Received" },
                    { "item_id": 1, "title": "Amount", "response": "20" },
                    { "item_id": 2, "title": "Account", "response": "Bank" },
                    { "item_id": 3, "title": "Income category", "response": "Gifts" }
                ]
            }"#,
        )
        .await
        .unwrap();

        let out = record(env.config(), Mode::Testing, Some(&path)).await.unwrap();
        let report = out.structure().unwrap();
        assert_eq!(report.outcome(), Outcome::Recorded);
        assert_eq!(report.rows()[0].values, vec!["2024-03-05 14:30:00", "20", "Bank", "Gifts"]);
    }

    #[tokio::test]
    async fn test_record_bad_json() {
        let env = TestEnv::new().await;
        let path = env.config().root().join("submission.json");
        utils::write(&path, "{").await.unwrap();
        assert!(record(env.config(), Mode::Testing, Some(&path)).await.is_err());
    }
}
