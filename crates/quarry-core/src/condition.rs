//! Three-valued outcome of a matching assertion

use serde::{Deserialize, Serialize};

/// Result of evaluating an assertion against an entry or value.
///
/// `Undefined` means the assertion could be neither proven nor disproven,
/// for example because no matching rule applies or a value failed to
/// normalize. It is a normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConditionResult {
    True,
    False,
    Undefined,
}

impl ConditionResult {
    /// Logical negation; `Undefined` stays `Undefined`
    pub fn not(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Undefined => Self::Undefined,
        }
    }

    pub fn is_true(self) -> bool {
        self == Self::True
    }

    pub fn is_false(self) -> bool {
        self == Self::False
    }

    pub fn is_undefined(self) -> bool {
        self == Self::Undefined
    }
}

impl From<bool> for ConditionResult {
    fn from(b: bool) -> Self {
        if b {
            Self::True
        } else {
            Self::False
        }
    }
}

impl std::fmt::Display for ConditionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::True => "TRUE",
            Self::False => "FALSE",
            Self::Undefined => "UNDEFINED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not() {
        assert_eq!(ConditionResult::True.not(), ConditionResult::False);
        assert_eq!(ConditionResult::False.not(), ConditionResult::True);
        assert_eq!(ConditionResult::Undefined.not(), ConditionResult::Undefined);
    }

    #[test]
    fn test_from_bool() {
        assert!(ConditionResult::from(true).is_true());
        assert!(ConditionResult::from(false).is_false());
    }
}
