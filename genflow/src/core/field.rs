//! Named artifacts carried through the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One artifact slot of [`super::PipelineState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    /// Raw request supplied by the caller.
    Input,
    /// Condensed restatement of the input.
    Summary,
    /// Requirements document derived from the input.
    Specification,
    /// Artifact generated from the specification.
    Generated,
    /// Reviewed and corrected artifact.
    Reviewed,
    /// Verification findings for the reviewed artifact.
    Verification,
}

impl StateField {
    /// Every field, in chain order.
    pub const ALL: [Self; 6] = [
        Self::Input,
        Self::Summary,
        Self::Specification,
        Self::Generated,
        Self::Reviewed,
        Self::Verification,
    ];

    /// Returns the canonical snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Summary => "summary",
            Self::Specification => "specification",
            Self::Generated => "generated",
            Self::Reviewed => "reviewed",
            Self::Verification => "verification",
        }
    }
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("unknown state field '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        for field in StateField::ALL {
            assert_eq!(field.as_str().parse::<StateField>().unwrap(), field);
        }
    }

    #[test]
    fn test_unknown_name() {
        assert!("html_code".parse::<StateField>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&StateField::Specification).unwrap();
        assert_eq!(json, "\"specification\"");
    }
}
