use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Closed set of triage categories. Adding a variant is a compile error until
/// every exhaustive match (prompt rules, task instruction, bound tool,
/// sub-agent dispatch) handles it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Documentation,
    Bug,
    FeatureRequest,
}

impl Category {
    pub const ALL: [Category; 3] = [Self::Documentation, Self::Bug, Self::FeatureRequest];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Documentation => "documentation",
            Self::Bug => "bug",
            Self::FeatureRequest => "feature_request",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "documentation" => Ok(Self::Documentation),
            "bug" => Ok(Self::Bug),
            "feature_request" => Ok(Self::FeatureRequest),
            other => Err(DomainError::UnknownCategory(other.to_owned())),
        }
    }
}

/// Output contract of the classification step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassificationResult {
    #[serde(default)]
    pub reasoning: String,
    pub category: Category,
}

#[cfg(test)]
mod tests {
    use super::{Category, ClassificationResult};
    use crate::errors::DomainError;

    #[test]
    fn parses_only_the_three_literals() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }

        assert_eq!(
            "other".parse::<Category>(),
            Err(DomainError::UnknownCategory("other".to_owned()))
        );
        assert!("Documentation".parse::<Category>().is_err());
    }

    #[test]
    fn classification_result_rejects_values_outside_the_enum() {
        let ok: ClassificationResult = serde_json::from_str(
            r#"{"reasoning":"asks how to use the api","category":"documentation"}"#,
        )
        .expect("valid classification");
        assert_eq!(ok.category, Category::Documentation);

        let invalid = serde_json::from_str::<ClassificationResult>(
            r#"{"reasoning":"unsure","category":"other"}"#,
        );
        assert!(invalid.is_err());

        let missing = serde_json::from_str::<ClassificationResult>(r#"{"reasoning":"x"}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn reasoning_may_be_absent_but_is_always_present_after_parse() {
        let result: ClassificationResult =
            serde_json::from_str(r#"{"category":"bug"}"#).expect("reasoning defaults");
        assert_eq!(result.reasoning, "");
        assert_eq!(result.category, Category::Bug);
    }
}
