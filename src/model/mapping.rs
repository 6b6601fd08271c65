//! Maps the titles of form items onto the logical fields of a transaction.
//!
//! Titles are camel-cased first (`"Expense category"` becomes `expenseCategory`) and the result is
//! looked up in an explicit table. Anything that is not in the table is an error rather than being
//! dropped or guessed at.

use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MappingError(String);

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl StdError for MappingError {}

impl MappingError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The logical fields that a form response can carry.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    /// The item whose answer selects the kind of transaction.
    Action,
    /// A user-entered date. It is always replaced by the submission timestamp.
    Date,
    Amount,
    Account,
    Beneficiary,
    Tag,
    Description,
    /// A single category item that serves both expenses and income.
    Category,
    ExpenseCategory,
    IncomeCategory,
    DestinationAccount,
    Commission,
    DestinationCurrencyAmount,
}

serde_plain::derive_display_from_serialize!(FormField);
serde_plain::derive_fromstr_from_deserialize!(FormField);

impl FormField {
    const ALL: [FormField; 13] = [
        FormField::Action,
        FormField::Date,
        FormField::Amount,
        FormField::Account,
        FormField::Beneficiary,
        FormField::Tag,
        FormField::Description,
        FormField::Category,
        FormField::ExpenseCategory,
        FormField::IncomeCategory,
        FormField::DestinationAccount,
        FormField::Commission,
        FormField::DestinationCurrencyAmount,
    ];
}

/// Keys that older versions of the form used.
const HISTORICAL_KEYS: &[(&str, FormField)] = &[("comission", FormField::Commission)];

/// Resolves form item titles to `FormField`s.
///
/// The built-in table knows the camel-cased name of every `FormField`. User-supplied aliases are
/// added on top, keyed by their camel-cased title, and serialize back to the titles they were
/// given as.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TitleMapping {
    aliases: BTreeMap<String, FormField>,
    keys: HashMap<String, FormField>,
}

impl Default for TitleMapping {
    fn default() -> Self {
        Self {
            aliases: BTreeMap::new(),
            keys: builtin_keys(),
        }
    }
}

fn builtin_keys() -> HashMap<String, FormField> {
    FormField::ALL
        .iter()
        .map(|field| (field.to_string(), *field))
        .chain(
            HISTORICAL_KEYS
                .iter()
                .map(|(key, field)| (key.to_string(), *field)),
        )
        .collect()
}

impl TitleMapping {
    /// Creates a mapping from the built-in table plus `aliases` (title -> field).
    ///
    /// # Errors
    /// - An alias whose camel-cased key collides with a built-in key for a different field.
    /// - Two aliases whose camel-cased keys collide.
    pub fn new<S, I>(aliases: I) -> Result<Self, MappingError>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, FormField)>,
    {
        let mut mapping = Self::default();
        let mut alias_keys: HashMap<String, String> = HashMap::new();
        for (title, field) in aliases {
            let title = title.into();
            let key = to_camel_case(&title);
            if key.is_empty() {
                return Err(MappingError(format!(
                    "The alias '{title}' has no letters or digits"
                )));
            }
            if let Some(other) = alias_keys.insert(key.clone(), title.clone()) {
                return Err(MappingError(format!(
                    "The aliases '{other}' and '{title}' both resolve to '{key}'"
                )));
            }
            if let Some(existing) = mapping.keys.get(&key) {
                if *existing != field {
                    return Err(MappingError(format!(
                        "The alias '{title}' resolves to '{key}', which already means '{existing}'"
                    )));
                }
            }
            mapping.keys.insert(key, field);
            mapping.aliases.insert(title, field);
        }
        Ok(mapping)
    }

    /// Looks up the field for a form item `title`.
    pub fn field(&self, title: &str) -> Result<FormField, MappingError> {
        let key = to_camel_case(title);
        self.keys.get(&key).copied().ok_or_else(|| {
            MappingError(format!(
                "The form item '{title}' (key '{key}') is not mapped to a transaction field, \
                add it to title_aliases in the config"
            ))
        })
    }

    pub fn aliases(&self) -> &BTreeMap<String, FormField> {
        &self.aliases
    }
}

impl Serialize for TitleMapping {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.aliases.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TitleMapping {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let aliases: BTreeMap<String, FormField> = BTreeMap::deserialize(deserializer)?;
        TitleMapping::new(aliases).map_err(D::Error::custom)
    }
}

/// Lower-cases `s`, then replaces every run of characters other than `a-z` and `0-9` that is
/// followed by another character with that character upper-cased.
///
/// `"Destination currency amount"` becomes `destinationCurrencyAmount`.
pub fn to_camel_case(s: &str) -> String {
    let lower: Vec<char> = s.to_lowercase().chars().collect();
    let mut out = String::with_capacity(lower.len());
    let mut ix = 0;
    while ix < lower.len() {
        let c = lower[ix];
        if c.is_ascii_alphanumeric() {
            out.push(c);
            ix += 1;
            continue;
        }
        let start = ix;
        while ix < lower.len() && !lower[ix].is_ascii_alphanumeric() {
            ix += 1;
        }
        if ix < lower.len() {
            out.extend(lower[ix].to_uppercase());
            ix += 1;
        } else if ix - start > 1 {
            // A trailing run: the last character of the run is the one that gets upper-cased.
            out.extend(lower[ix - 1].to_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_to_camel_case_titles() {
        assert_eq!(to_camel_case("Amount"), "amount");
        assert_eq!(to_camel_case("Expense category"), "expenseCategory");
        assert_eq!(
            to_camel_case("Destination currency amount"),
            "destinationCurrencyAmount"
        );
        assert_eq!(to_camel_case("  Income -- Category"), "IncomeCategory");
        assert_eq!(to_camel_case("Tag #2"), "tag2");
    }

    #[test]
    fn test_to_camel_case_trailing_punctuation() {
        assert_eq!(to_camel_case("Amount:"), "amount:");
        assert_eq!(to_camel_case("Amount?!"), "amount!");
        assert_eq!(to_camel_case(""), "");
    }

    #[test]
    fn test_builtin_titles() {
        let mapping = TitleMapping::default();
        assert_eq!(mapping.field("Action").unwrap(), FormField::Action);
        assert_eq!(mapping.field("Amount").unwrap(), FormField::Amount);
        assert_eq!(
            mapping.field("Expense category").unwrap(),
            FormField::ExpenseCategory
        );
        assert_eq!(
            mapping.field("Income Category").unwrap(),
            FormField::IncomeCategory
        );
        assert_eq!(
            mapping.field("Destination currency amount").unwrap(),
            FormField::DestinationCurrencyAmount
        );
        assert_eq!(mapping.field("Comission").unwrap(), FormField::Commission);
    }

    #[test]
    fn test_unknown_title_is_an_error() {
        let mapping = TitleMapping::default();
        let err = mapping.field("Mood").unwrap_err();
        assert!(err.to_string().contains("'Mood'"));
    }

    #[test]
    fn test_aliases() {
        let mapping = TitleMapping::new(vec![("Transfer fee", FormField::Commission)]).unwrap();
        assert_eq!(mapping.field("Transfer fee").unwrap(), FormField::Commission);
        assert_eq!(mapping.field("transfer-fee").unwrap(), FormField::Commission);
    }

    #[test]
    fn test_alias_conflicts_with_builtin() {
        let result = TitleMapping::new(vec![("Amount", FormField::Commission)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_alias_conflicts_with_alias() {
        let result = TitleMapping::new(vec![
            ("Fee", FormField::Commission),
            ("fee", FormField::Commission),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_mapping_serde() {
        let json = r#"{"Payee":"beneficiary","Transfer fee":"commission"}"#;
        let mapping: TitleMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.field("Payee").unwrap(), FormField::Beneficiary);
        assert_eq!(serde_json::to_string(&mapping).unwrap(), json);

        let bad = r#"{"Payee":"payee"}"#;
        assert!(serde_json::from_str::<TitleMapping>(bad).is_err());
    }
}
