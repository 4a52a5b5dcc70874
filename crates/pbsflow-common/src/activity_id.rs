use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of an activity within one orchestrator: its declaring
/// module and its type name. Two activities with an equal `ActivityId`
/// cannot coexist in the same orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityId {
    pub module: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ActivityId {
    pub fn new(module: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            type_name: type_name.into(),
        }
    }

    /// An id is valid iff both components are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.module.is_empty() && !self.type_name.is_empty()
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_field_wise() {
        let a = ActivityId::new("pbsflow.activities", "PowerOn");
        let b = ActivityId::new("pbsflow.activities", "PowerOn");
        let c = ActivityId::new("pbsflow.activities", "PowerOff");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_module_or_type_is_invalid() {
        assert!(!ActivityId::new("", "PowerOn").is_valid());
        assert!(!ActivityId::new("pbsflow.activities", "").is_valid());
        assert!(ActivityId::new("pbsflow.activities", "PowerOn").is_valid());
    }

    #[test]
    fn display_joins_module_and_type() {
        let id = ActivityId::new("pbsflow.activities", "PowerOn");
        assert_eq!(id.to_string(), "pbsflow.activities.PowerOn");
    }

    #[test]
    fn is_hashable_for_use_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ActivityId::new("m", "T"), 1);
        assert_eq!(map.get(&ActivityId::new("m", "T")), Some(&1));
    }
}
