//! Per-activity status line (§4.4).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::activity::ActivityId;

/// A single-string channel for one activity's current status message.
#[derive(Clone)]
pub struct StatusLine {
    id: ActivityId,
    handler: StatusHandler,
}

impl StatusLine {
    pub fn set(&self, message: impl Into<String>) {
        self.handler.inner.insert(self.id.clone(), message.into());
    }

    /// Sets the status to a terminal error string when `body` returns `Err`;
    /// returns whatever `body` returned, untouched.
    pub fn capture_error<T, E: std::fmt::Display>(
        &self,
        line: &str,
        body: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        match body() {
            Ok(value) => Ok(value),
            Err(err) => {
                self.set(format!("{line}: {err}"));
                Err(err)
            }
        }
    }
}

/// Read-side access to every activity's current status, and the factory for
/// per-activity [`StatusLine`] handles.
#[derive(Clone, Default)]
pub struct StatusHandler {
    inner: Arc<DashMap<ActivityId, String>>,
}

impl StatusHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line_for(&self, id: ActivityId) -> StatusLine {
        StatusLine {
            id,
            handler: self.clone(),
        }
    }

    pub fn get(&self, id: &ActivityId) -> Option<String> {
        self.inner.get(id).map(|entry| entry.value().clone())
    }

    pub fn snapshot(&self) -> HashMap<ActivityId, String> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_and_is_readable_through_handler() {
        let handler = StatusHandler::new();
        let id = ActivityId::new("pbsflow.activities", "PowerOn");
        let line = handler.line_for(id.clone());
        line.set("booting");
        assert_eq!(handler.get(&id).as_deref(), Some("booting"));
        line.set("booted");
        assert_eq!(handler.get(&id).as_deref(), Some("booted"));
    }

    #[test]
    fn capture_error_sets_terminal_status_on_err() {
        let handler = StatusHandler::new();
        let id = ActivityId::new("pbsflow.activities", "BackupJob");
        let line = handler.line_for(id.clone());
        let result: Result<(), &str> = line.capture_error("backup failed", || Err("timeout"));
        assert!(result.is_err());
        assert_eq!(handler.get(&id).as_deref(), Some("backup failed: timeout"));
    }

    #[test]
    fn capture_error_leaves_status_untouched_on_ok() {
        let handler = StatusHandler::new();
        let id = ActivityId::new("pbsflow.activities", "BackupJob");
        let line = handler.line_for(id.clone());
        let result: Result<u32, &str> = line.capture_error("backup failed", || Ok(42));
        assert_eq!(result.unwrap(), 42);
        assert_eq!(handler.get(&id), None);
    }
}
