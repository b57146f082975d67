//! Bidirectional mapping between ledger enum codes and the agent's label vocabulary.
//!
//! Each table is exhaustive over the ledger's enum range. Code 0 (and any code the table does
//! not know) decodes to `Unknown`; an unrecognised label decodes to the table's fallback (or is
//! dropped when that fallback is `Unknown`) and the mismatch is reported back as a warning
//! instead of failing the call.

use crate::error::{Result, ToolError};

pub trait Label: Copy + Sized + 'static {
    /// Name used in warnings, e.g. `category`.
    const KIND: &'static str;
    const ALL: &'static [Self];

    fn from_code(code: i32) -> Self;
    fn code(self) -> i32;
    fn label(self) -> &'static str;
    fn fallback() -> Self;

    fn from_label(raw: &str) -> Option<Self> {
        let wanted = normalize_label(raw);
        Self::ALL.iter().copied().find(|v| v.label() == wanted)
    }

    fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|v| v.label()).collect()
    }

    /// Never fails: unrecognised input becomes the fallback plus a warning.
    fn parse_lenient(raw: &str) -> Parsed<Self> {
        match Self::from_label(raw) {
            Some(value) => Parsed {
                value,
                unrecognized: None,
            },
            None => Parsed {
                value: Self::fallback(),
                unrecognized: Some(raw.trim().to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    pub value: T,
    pub unrecognized: Option<String>,
}

fn normalize_label(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .replace([' ', '-'], "_")
}

macro_rules! label_enum {
    (
        $(#[$meta:meta])*
        $name:ident, kind = $kind:literal, fallback = $fallback:ident,
        { $($variant:ident = $code:literal => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            Unknown,
            $($variant),+
        }

        impl Label for $name {
            const KIND: &'static str = $kind;
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn from_code(code: i32) -> Self {
                match code {
                    $($code => Self::$variant,)+
                    _ => Self::Unknown,
                }
            }

            fn code(self) -> i32 {
                match self {
                    Self::Unknown => 0,
                    $(Self::$variant => $code),+
                }
            }

            fn label(self) -> &'static str {
                match self {
                    Self::Unknown => "unknown",
                    $(Self::$variant => $label),+
                }
            }

            fn fallback() -> Self {
                Self::$fallback
            }
        }
    };
}

label_enum!(
    ExpenseCategory, kind = "category", fallback = Other,
    {
        Food = 1 => "food",
        Housing = 2 => "housing",
        Transportation = 3 => "transportation",
        Entertainment = 4 => "entertainment",
        Healthcare = 5 => "healthcare",
        Utilities = 6 => "utilities",
        Shopping = 7 => "shopping",
        Education = 8 => "education",
        Travel = 9 => "travel",
        Other = 10 => "other",
    }
);

label_enum!(
    ExpenseFrequency, kind = "frequency", fallback = Unknown,
    {
        Daily = 1 => "daily",
        Weekly = 2 => "weekly",
        Fortnightly = 3 => "fortnightly",
        Monthly = 4 => "monthly",
        Quarterly = 5 => "quarterly",
        Annually = 6 => "annually",
        Once = 7 => "once",
    }
);

label_enum!(
    IncomeFrequency, kind = "frequency", fallback = Unknown,
    {
        Weekly = 1 => "weekly",
        Fortnightly = 2 => "fortnightly",
        Monthly = 3 => "monthly",
        Annually = 4 => "annually",
    }
);

label_enum!(
    TaxStatus, kind = "tax status", fallback = Unknown,
    {
        PreTax = 1 => "pre_tax",
        PostTax = 2 => "post_tax",
    }
);

label_enum!(
    BudgetPeriod, kind = "budget period", fallback = Unknown,
    {
        Weekly = 1 => "weekly",
        Fortnightly = 2 => "fortnightly",
        Monthly = 3 => "monthly",
        Quarterly = 4 => "quarterly",
        Yearly = 5 => "yearly",
    }
);

label_enum!(
    GoalStatus, kind = "goal status", fallback = Unknown,
    {
        Active = 1 => "active",
        Paused = 2 => "paused",
        Completed = 3 => "completed",
        Cancelled = 4 => "cancelled",
    }
);

label_enum!(
    TaxDeductionCategory, kind = "tax deduction category", fallback = Other,
    {
        WorkTravel = 1 => "work_travel",
        Uniform = 2 => "uniform",
        SelfEducation = 3 => "self_education",
        OtherWork = 4 => "other_work",
        HomeOffice = 5 => "home_office",
        Vehicle = 6 => "vehicle",
        Donations = 7 => "donations",
        TaxAffairs = 8 => "tax_affairs",
        IncomeProtection = 9 => "income_protection",
        Other = 10 => "other",
    }
);

/// Per-call collector for label mismatches; rendered into the response `warnings` list.
#[derive(Debug, Default)]
pub struct LabelWarnings(Vec<String>);

impl LabelWarnings {
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// Reads an optional label argument; a non-string value is still a validation error.
    ///
    /// A label whose fallback is `Unknown` reads as absent: code 0 means "no change" to the
    /// ledger, so sending it would report a change that never happens.
    pub fn parse<T: Label>(&mut self, args: &serde_json::Value, key: &str) -> Result<Option<T>> {
        let Some(raw) = crate::traits::optional_string(args, key)? else {
            return Ok(None);
        };
        Ok(self.resolve(&raw))
    }

    pub fn parse_list<T: Label>(
        &mut self,
        args: &serde_json::Value,
        key: &str,
    ) -> Result<Option<Vec<T>>> {
        let Some(raw) = crate::traits::optional_string_list(args, key)? else {
            return Ok(None);
        };
        Ok(Some(raw.iter().filter_map(|item| self.resolve(item)).collect()))
    }

    fn resolve<T: Label>(&mut self, raw: &str) -> Option<T> {
        let parsed = T::parse_lenient(raw);
        let known = (parsed.value.code() != 0).then_some(parsed.value);
        if let Some(unrecognized) = parsed.unrecognized {
            let action = match known {
                Some(value) => format!("using \"{}\" instead", value.label()),
                None => "ignoring it".to_string(),
            };
            self.0.push(format!(
                "Unrecognised {} \"{unrecognized}\"; {action} (expected one of: {}).",
                T::KIND,
                T::labels().join(", ")
            ));
        }
        known
    }
}

/// Schema fragment advertising a label vocabulary to the agent.
pub(crate) fn label_schema<T: Label>(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "enum": T::labels(),
        "description": description,
    })
}

/// Strict parse for read filters, where silently widening a filter would mislead.
pub(crate) fn require_known<T: Label>(raw: &str) -> Result<T> {
    T::from_label(raw).ok_or_else(|| {
        ToolError::InvalidArguments(format!(
            "unknown {} \"{raw}\" (expected one of: {})",
            T::KIND,
            T::labels().join(", ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::{
        BudgetPeriod, ExpenseCategory, ExpenseFrequency, GoalStatus, IncomeFrequency, Label,
        LabelWarnings, TaxDeductionCategory, TaxStatus, require_known,
    };

    fn assert_table_is_bijective<T: Label + PartialEq + std::fmt::Debug>() {
        for value in T::ALL {
            assert_eq!(T::from_code(value.code()), *value);
            assert_eq!(T::from_label(value.label()), Some(*value));
            assert_ne!(value.code(), 0);
        }
        assert_eq!(T::from_code(0).label(), "unknown");
        assert_eq!(T::from_code(9999).label(), "unknown");
    }

    #[test]
    fn every_table_round_trips_codes_and_labels() {
        assert_table_is_bijective::<ExpenseCategory>();
        assert_table_is_bijective::<ExpenseFrequency>();
        assert_table_is_bijective::<IncomeFrequency>();
        assert_table_is_bijective::<TaxStatus>();
        assert_table_is_bijective::<BudgetPeriod>();
        assert_table_is_bijective::<GoalStatus>();
        assert_table_is_bijective::<TaxDeductionCategory>();
    }

    #[test]
    fn labels_are_case_and_separator_insensitive() {
        assert_eq!(ExpenseCategory::from_label("FOOD"), Some(ExpenseCategory::Food));
        assert_eq!(TaxStatus::from_label("Pre-Tax"), Some(TaxStatus::PreTax));
        assert_eq!(
            TaxDeductionCategory::from_label("home office"),
            Some(TaxDeductionCategory::HomeOffice)
        );
    }

    #[test]
    fn unknown_category_falls_back_to_other_with_warning() {
        let mut warnings = LabelWarnings::default();
        let value = warnings
            .parse::<ExpenseCategory>(&serde_json::json!({"category": "coffee"}), "category")
            .expect("lenient parse");
        assert_eq!(value, Some(ExpenseCategory::Other));
        let warnings = warnings.into_vec();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("coffee"));
    }

    #[test]
    fn unknown_frequency_falls_back_to_unknown() {
        let parsed = ExpenseFrequency::parse_lenient("every other tuesday");
        assert_eq!(parsed.value, ExpenseFrequency::Unknown);
        assert_eq!(parsed.value.code(), 0);
        assert_eq!(parsed.unrecognized.as_deref(), Some("every other tuesday"));
    }

    #[test]
    fn label_without_fallback_reads_as_absent() {
        let mut warnings = LabelWarnings::default();
        let value = warnings
            .parse::<GoalStatus>(&serde_json::json!({"status": "someday"}), "status")
            .expect("lenient parse");
        assert_eq!(value, None);
        let warnings = warnings.into_vec();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("ignoring it"));
    }

    #[test]
    fn non_string_label_is_still_rejected() {
        let mut warnings = LabelWarnings::default();
        let err = warnings
            .parse::<ExpenseCategory>(&serde_json::json!({"category": 4}), "category")
            .expect_err("numeric label");
        assert!(err.to_string().contains("must be string"));
    }

    #[test]
    fn strict_filter_parse_rejects_unknown() {
        let err = require_known::<GoalStatus>("someday").expect_err("unknown status");
        assert!(err.to_string().contains("someday"));
    }
}
