use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one activity within one orchestrator run.
///
/// Transitions: `NotStarted -> Pending -> Running -> Completed` on a normal
/// run, or `NotStarted -> Skipped` if a dependency failed or the run was
/// cancelled before the body started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    NotStarted,
    Pending,
    Running,
    Completed,
    Skipped,
}

impl std::fmt::Display for ActivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome record for one activity. Construction is restricted to the
/// transition helpers below so the invariants in §3 of the design always
/// hold: an error is only ever attached to a `Completed` result, and
/// `NotStarted`/`Skipped` never carry timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityResult {
    pub state: ActivityState,
    pub error: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ActivityResult {
    /// The result every activity is given immediately on registration (P1).
    pub fn not_started() -> Self {
        Self {
            state: ActivityState::NotStarted,
            error: None,
            start_time: None,
            end_time: None,
        }
    }

    pub fn pending() -> Self {
        Self {
            state: ActivityState::Pending,
            error: None,
            start_time: None,
            end_time: None,
        }
    }

    pub fn skipped() -> Self {
        Self {
            state: ActivityState::Skipped,
            error: None,
            start_time: None,
            end_time: None,
        }
    }

    pub fn running(start_time: DateTime<Utc>) -> Self {
        Self {
            state: ActivityState::Running,
            error: None,
            start_time: Some(start_time),
            end_time: None,
        }
    }

    /// `end_time` must be at or after `start_time` (an invariant the caller
    /// — the orchestrator, which records both from its own clock — upholds).
    pub fn completed(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        error: Option<String>,
    ) -> Self {
        debug_assert!(end_time >= start_time, "end_time must not precede start_time");
        Self {
            state: ActivityState::Completed,
            error,
            start_time: Some(start_time),
            end_time: Some(end_time),
        }
    }

    /// `IsSuccess() ⇔ state = Completed ∧ error = nil`.
    pub fn is_success(&self) -> bool {
        self.state == ActivityState::Completed && self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn not_started_has_no_timestamps_or_error() {
        let r = ActivityResult::not_started();
        assert_eq!(r.state, ActivityState::NotStarted);
        assert!(r.start_time.is_none());
        assert!(r.end_time.is_none());
        assert!(r.error.is_none());
        assert!(!r.is_success());
    }

    #[test]
    fn skipped_has_no_timestamps_or_error() {
        let r = ActivityResult::skipped();
        assert_eq!(r.state, ActivityState::Skipped);
        assert!(r.start_time.is_none() && r.end_time.is_none());
        assert!(!r.is_success());
    }

    #[test]
    fn completed_without_error_is_success() {
        let start = Utc::now();
        let end = start + Duration::seconds(1);
        let r = ActivityResult::completed(start, end, None);
        assert!(r.is_success());
    }

    #[test]
    fn completed_with_error_is_not_success() {
        let start = Utc::now();
        let end = start + Duration::seconds(1);
        let r = ActivityResult::completed(start, end, Some("boom".into()));
        assert_eq!(r.state, ActivityState::Completed);
        assert!(!r.is_success());
        assert_eq!(r.error.as_deref(), Some("boom"));
    }

    #[test]
    fn display_matches_snake_case_variant() {
        assert_eq!(ActivityState::NotStarted.to_string(), "not_started");
        assert_eq!(ActivityState::Completed.to_string(), "completed");
    }

    #[test]
    fn state_round_trips_through_json() {
        for state in [
            ActivityState::NotStarted,
            ActivityState::Pending,
            ActivityState::Running,
            ActivityState::Completed,
            ActivityState::Skipped,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            let back: ActivityState = serde_json::from_str(&json).unwrap();
            assert_eq!(state, back);
        }
    }
}
