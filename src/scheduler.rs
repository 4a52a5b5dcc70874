//! Multi-trigger cron scheduler (§4.7).
//!
//! The `cron` crate's `Schedule` parses 6/7-field (seconds-first)
//! expressions; operators write the conventional 5-field form, so a bare
//! 5-field expression gets a `"0 "` seconds prefix before parsing.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Local;
use cron::Schedule;
use tokio_util::sync::CancellationToken;

use crate::errors::SchedulerError;
use crate::run_manager::RunManager;

fn parse_schedule(expr: &str) -> Result<Schedule, SchedulerError> {
    let field_count = expr.split_whitespace().count();
    let normalized = if field_count == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// One cron entry: N workflow names fired together on one schedule.
pub struct CronTrigger {
    schedule: Schedule,
    workflows: Vec<String>,
}

impl CronTrigger {
    pub fn new(expr: &str, workflows: Vec<String>) -> Result<Self, SchedulerError> {
        if workflows.is_empty() {
            return Err(SchedulerError::EmptyWorkflowList);
        }
        Ok(Self {
            schedule: parse_schedule(expr)?,
            workflows,
        })
    }

    pub fn next_fire(&self) -> Option<chrono::DateTime<Local>> {
        self.schedule.upcoming(Local).next()
    }
}

/// Owns every configured trigger and drives its fire loop against the run
/// manager.
pub struct TriggerManager {
    triggers: Vec<CronTrigger>,
    run_manager: Arc<RunManager>,
}

impl TriggerManager {
    /// Validates that every workflow name referenced by a trigger is known
    /// to `run_manager` and that every cron expression parses.
    pub fn new(
        entries: Vec<(String, Vec<String>)>,
        run_manager: Arc<RunManager>,
    ) -> Result<Self, SchedulerError> {
        let known = run_manager.known_workflows();
        let mut triggers = Vec::with_capacity(entries.len());
        for (expr, workflows) in entries {
            for name in &workflows {
                if !known.contains(name) {
                    return Err(SchedulerError::UnknownWorkflow(name.clone()));
                }
            }
            triggers.push(CronTrigger::new(&expr, workflows)?);
        }
        Ok(Self { triggers, run_manager })
    }

    /// Earliest `next_fire` across every trigger, or `None` if there are no
    /// triggers configured.
    pub fn next_run(&self) -> Option<chrono::DateTime<Local>> {
        self.triggers.iter().filter_map(CronTrigger::next_fire).min()
    }

    /// Spawns one Tokio task per trigger; each loop sleeps until its next
    /// fire time, invokes the run manager (errors logged, never surfaced),
    /// and loops, until `ctx` is cancelled.
    pub fn start(self: Arc<Self>, ctx: CancellationToken) {
        for index in 0..self.triggers.len() {
            let manager = self.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                manager.run_trigger_loop(index, ctx).await;
            });
        }
    }

    async fn run_trigger_loop(&self, index: usize, ctx: CancellationToken) {
        loop {
            let Some(next_fire) = self.triggers[index].next_fire() else {
                return;
            };
            let delay = (next_fire - Local::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);

            tokio::select! {
                _ = ctx.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let workflows = self.triggers[index].workflows.clone();
            match self.run_manager.start(workflows, ctx.clone()) {
                Ok(_handle) => {}
                Err(err) => {
                    tracing::warn!(trigger = index, error = %err, "scheduled run was dropped");
                }
            }
        }
    }
}
