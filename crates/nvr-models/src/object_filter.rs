//! Per-stream object class filter.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How a stream's class list is applied to detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectFilterMode {
    /// Every class passes.
    #[default]
    None,
    /// Only listed classes pass.
    Include,
    /// Listed classes are dropped.
    Exclude,
}

impl ObjectFilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectFilterMode::None => "none",
            ObjectFilterMode::Include => "include",
            ObjectFilterMode::Exclude => "exclude",
        }
    }
}

impl fmt::Display for ObjectFilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ObjectFilterMode {
    type Err = ObjectFilterModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(ObjectFilterMode::None),
            "include" => Ok(ObjectFilterMode::Include),
            "exclude" => Ok(ObjectFilterMode::Exclude),
            _ => Err(ObjectFilterModeParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown object filter mode: {0}")]
pub struct ObjectFilterModeParseError(String);

/// Object filter configured for a stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ObjectFilter {
    #[serde(default)]
    pub mode: ObjectFilterMode,
    #[serde(default)]
    pub classes: Vec<String>,
}

impl ObjectFilter {
    pub fn new(mode: ObjectFilterMode, classes: Vec<String>) -> Self {
        Self { mode, classes }
    }

    /// Build a filter from a comma separated class list as stored with the
    /// stream configuration.
    pub fn from_list(mode: ObjectFilterMode, list: &str) -> Self {
        let classes = list
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        Self { mode, classes }
    }

    /// True when the filter cannot drop anything.
    pub fn is_pass_through(&self) -> bool {
        self.mode == ObjectFilterMode::None || self.classes.is_empty()
    }

    /// Whether a detection with `label` is accepted.
    pub fn accepts(&self, label: &str) -> bool {
        if self.is_pass_through() {
            return true;
        }

        let listed = self.classes.iter().any(|c| c == label);
        match self.mode {
            ObjectFilterMode::None => true,
            ObjectFilterMode::Include => listed,
            ObjectFilterMode::Exclude => !listed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("include".parse::<ObjectFilterMode>().unwrap(), ObjectFilterMode::Include);
        assert_eq!("EXCLUDE".parse::<ObjectFilterMode>().unwrap(), ObjectFilterMode::Exclude);
        assert_eq!("".parse::<ObjectFilterMode>().unwrap(), ObjectFilterMode::None);
        assert!("allow".parse::<ObjectFilterMode>().is_err());
    }

    #[test]
    fn test_include_exclude() {
        let include = ObjectFilter::from_list(ObjectFilterMode::Include, "person, car");
        assert!(include.accepts("person"));
        assert!(include.accepts("car"));
        assert!(!include.accepts("bicycle"));

        let exclude = ObjectFilter::from_list(ObjectFilterMode::Exclude, "cat");
        assert!(!exclude.accepts("cat"));
        assert!(exclude.accepts("dog"));
    }

    #[test]
    fn test_empty_list_passes_everything() {
        let include = ObjectFilter::from_list(ObjectFilterMode::Include, " , ");
        assert!(include.is_pass_through());
        assert!(include.accepts("anything"));
        assert!(ObjectFilter::default().accepts("person"));
    }
}
