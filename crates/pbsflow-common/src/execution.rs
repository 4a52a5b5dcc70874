use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::LogEntry;

/// The persisted (or live) per-activity record for one run: the join of
/// `Result` + captured logs + the last status line (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityExecution {
    pub module: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntry>,
}

/// Sort a batch of execution records ascending by `type`, as required for
/// stable API/history output.
pub fn sort_by_type(executions: &mut [ActivityExecution]) {
    executions.sort_by(|a, b| a.type_name.cmp(&b.type_name));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(type_name: &str) -> ActivityExecution {
        ActivityExecution {
            module: "pbsflow.activities".to_string(),
            type_name: type_name.to_string(),
            state: "completed".to_string(),
            status: None,
            error: None,
            start_time: None,
            end_time: None,
            logs: Vec::new(),
        }
    }

    #[test]
    fn sort_by_type_orders_ascending() {
        let mut execs = vec![exec("PowerOff"), exec("BackupJobA"), exec("PowerOn")];
        sort_by_type(&mut execs);
        let names: Vec<_> = execs.iter().map(|e| e.type_name.as_str()).collect();
        assert_eq!(names, vec!["BackupJobA", "PowerOff", "PowerOn"]);
    }

    #[test]
    fn logs_are_omitted_from_json_when_empty() {
        let raw = serde_json::to_string(&exec("PowerOn")).unwrap();
        assert!(!raw.contains("\"logs\""));
    }
}
