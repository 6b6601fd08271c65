use crate::api::{self, Workbook};
use crate::commands::Out;
use crate::model::A1Range;
use crate::options::{self, SyncReport};
use crate::{Config, Mode, Result};

/// What `ledger sync` refreshes.
#[derive(Debug, Clone)]
pub enum SyncTarget {
    /// Every choice item.
    All,
    /// The items whose reference range overlaps `range` on the tab `sheet_id`.
    Edit { sheet_id: i64, range: A1Range },
}

/// Refreshes the form choices, either all of them or the ones that an edit touched.
pub async fn sync(config: Config, mode: Mode, target: SyncTarget) -> Result<Out<SyncReport>> {
    let mut workbook = Workbook::new(api::sheet(&config, mode).await?);
    let mut form = api::form(&config, mode).await?;
    let report = match target {
        SyncTarget::All => options::sync_all(&config, &mut workbook, form.as_mut()).await?,
        SyncTarget::Edit { sheet_id, range } => {
            let edited = workbook.resolve(sheet_id, &range).await?;
            options::sync_edit(&config, &mut workbook, form.as_mut(), &edited).await?
        }
    };
    Ok(Out::new(report.message(), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::sheet_test_client::OVERVIEW_SHEET_ID;
    use crate::config::ItemIds;
    use crate::test::TestEnv;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_sync_edit_range() {
        let env = TestEnv::new().await;
        let target = SyncTarget::Edit {
            sheet_id: OVERVIEW_SHEET_ID,
            range: A1Range::from_str("A5").unwrap(),
        };
        let out = sync(env.config(), Mode::Testing, target).await.unwrap();
        let refreshed = out.structure().unwrap().refreshed();
        assert_eq!(refreshed.len(), 1);
        assert_eq!(refreshed[0].item_id, ItemIds::default().expense_category);
    }

    #[tokio::test]
    async fn test_sync_all() {
        let env = TestEnv::new().await;
        let out = sync(env.config(), Mode::Testing, SyncTarget::All).await.unwrap();
        assert_eq!(out.message(), "Refreshed the choices of 4 form item(s)");
        assert_eq!(env.form_state().updates(), 4);
    }
}
