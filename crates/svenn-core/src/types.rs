use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SvennError;

/// Two-part address of a processing unit: `{group}/{name}`.
///
/// `group` is usually the warehouse the unit syncs (e.g. `byggmakker`) and
/// `name` the unit inside it (e.g. `prices`). Persisted only in its string
/// form on the script that a job schedules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitLocator {
    pub group: String,
    pub name: String,
}

impl UnitLocator {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Parse `group/name`. Both segments must be non-empty and no third
    /// segment is allowed.
    pub fn parse(s: &str) -> Result<Self, SvennError> {
        let mut parts = s.trim().split('/');
        let (Some(group), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(SvennError::Validation(format!(
                "invalid unit locator '{s}': expected 'group/name'"
            )));
        };
        if group.is_empty() || name.is_empty() {
            return Err(SvennError::Validation(format!(
                "invalid unit locator '{s}': segments must not be empty"
            )));
        }
        Ok(Self::new(group, name))
    }
}

impl fmt::Display for UnitLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.name)
    }
}

impl FromStr for UnitLocator {
    type Err = SvennError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UnitLocator {
    type Error = SvennError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<UnitLocator> for String {
    fn from(l: UnitLocator) -> Self {
        l.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_group_and_name() {
        let loc = UnitLocator::parse("byggmakker/prices").expect("parse failed");
        assert_eq!(loc.group, "byggmakker");
        assert_eq!(loc.name, "prices");
        assert_eq!(loc.to_string(), "byggmakker/prices");
    }

    #[test]
    fn parse_rejects_single_segment() {
        assert!(UnitLocator::parse("prices").is_err());
    }

    #[test]
    fn parse_rejects_three_segments() {
        assert!(UnitLocator::parse("a/b/c").is_err());
    }

    #[test]
    fn parse_rejects_empty_segment() {
        assert!(UnitLocator::parse("/prices").is_err());
        assert!(UnitLocator::parse("byggmakker/").is_err());
    }

    #[test]
    fn serde_uses_string_form() {
        let loc = UnitLocator::new("byggmakker", "base_data");
        let json = serde_json::to_string(&loc).unwrap();
        assert_eq!(json, r#""byggmakker/base_data""#);
        let back: UnitLocator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, loc);
    }
}
