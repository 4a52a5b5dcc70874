use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// State of the run manager's single execution slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    /// Catch-all: any string the manager doesn't recognize (including
    /// `"idle"` itself, and anything from an older/newer version of this
    /// enum) decodes to `Idle` rather than failing deserialization (R1).
    #[serde(other)]
    Idle,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Running => f.write_str("running"),
        }
    }
}

/// Top-level record of one workflow-set invocation, as tracked by the run
/// manager and persisted by the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: String,
    pub state: RunState,
    pub workflows: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn started(workflows: Vec<String>, started_at: DateTime<Utc>) -> Self {
        let id = calculate_id(started_at, &workflows);
        Self {
            id,
            state: RunState::Running,
            workflows,
            started_at,
            ended_at: None,
            error: None,
        }
    }

    /// Summaries are immutable once finished; this produces the finished
    /// copy rather than mutating in place.
    pub fn finish(&self, ended_at: DateTime<Utc>, error: Option<String>) -> Self {
        Self {
            id: self.id.clone(),
            state: RunState::Idle,
            workflows: self.workflows.clone(),
            started_at: self.started_at,
            ended_at: Some(ended_at),
            error,
        }
    }

    /// Fills in `id` if it was left empty (e.g. a summary deserialized from
    /// a pre-ID history file), recomputing it from `started_at`/`workflows`.
    pub fn ensure_id(mut self) -> Self {
        if self.id.is_empty() {
            self.id = calculate_id(self.started_at, &self.workflows);
        }
        self
    }
}

/// `id = SHA-256(unix(startedAt) + "," + join(workflows, ","))`, hex-encoded.
pub fn calculate_id(started_at: DateTime<Utc>, workflows: &[String]) -> String {
    let payload = format!("{},{}", started_at.timestamp(), workflows.join(","));
    let digest = Sha256::digest(payload.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculate_id_is_idempotent() {
        let ts = Utc::now();
        let workflows = vec!["backup".to_string(), "power_off".to_string()];
        assert_eq!(calculate_id(ts, &workflows), calculate_id(ts, &workflows));
    }

    #[test]
    fn calculate_id_differs_for_different_workflows() {
        let ts = Utc::now();
        let a = calculate_id(ts, &["backup".to_string()]);
        let b = calculate_id(ts, &["power_off".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn run_state_round_trip_preserves_known_values() {
        for state in [RunState::Idle, RunState::Running] {
            let json = serde_json::to_string(&state).unwrap();
            let back: RunState = serde_json::from_str(&json).unwrap();
            assert_eq!(state, back);
        }
    }

    #[test]
    fn unknown_run_state_string_decodes_to_idle() {
        let back: RunState = serde_json::from_str("\"zombie\"").unwrap();
        assert_eq!(back, RunState::Idle);
    }

    #[test]
    fn finish_preserves_id_and_marks_idle() {
        let started = RunSummary::started(vec!["backup".into()], Utc::now());
        let id = started.id.clone();
        let finished = started.finish(Utc::now(), None);
        assert_eq!(finished.id, id);
        assert_eq!(finished.state, RunState::Idle);
        assert!(finished.ended_at.is_some());
    }

    #[test]
    fn ensure_id_fills_in_missing_id() {
        let mut summary = RunSummary::started(vec!["backup".into()], Utc::now());
        let expected = summary.id.clone();
        summary.id.clear();
        let restored = summary.ensure_id();
        assert_eq!(restored.id, expected);
    }
}
