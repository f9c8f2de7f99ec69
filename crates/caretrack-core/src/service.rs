use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{CalendarTask, CareTaskEntry, DateWindow, EventMaster, TaskType};
use crate::recurrence::RecurrenceExpander;
use crate::repository::{CalendarRepository, CareTaskRepository, TeamConfigRepository};

/// Reconciles recurring calendar series with materialized care-task rows.
///
/// Generic over the repository so the merge logic is testable against an
/// in-memory store; all methods are stateless, read-only computations over a
/// bounded window and are safe to call concurrently.
pub struct TaskReconciler<R> {
    repo: R,
}

impl<R> TaskReconciler<R>
where
    R: CalendarRepository + CareTaskRepository + TeamConfigRepository + Sync,
{
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Expanded and merged virtual occurrences for the given teams within
    /// the window: recurrence candidates minus cancellations, with
    /// exceptions superseding their original occurrences.
    ///
    /// Sorted ascending by date; ties keep insertion order.
    pub async fn get_calendar_tasks(
        &self,
        window: &DateWindow,
        team_ids: &[Uuid],
        only_critical: bool,
    ) -> Result<Vec<CalendarTask>, CoreError> {
        ensure_team_scope(team_ids)?;

        let (masters, exceptions, cancellations) = tokio::try_join!(
            self.repo
                .find_event_masters_from_to(window, team_ids, only_critical),
            self.repo.find_event_exceptions_from_to(window, team_ids),
            self.repo.find_event_cancellations_from_to(window, team_ids),
        )?;

        // Index masters for exception fallback; an exception can move an
        // occurrence into the window even when its master's own series does
        // not intersect it, so resolve those masters by id.
        let mut master_index: HashMap<Uuid, EventMaster> =
            masters.iter().map(|m| (m.id, m.clone())).collect();
        let missing: Vec<Uuid> = exceptions
            .iter()
            .map(|ex| ex.event_master_id)
            .filter(|id| !master_index.contains_key(id))
            .collect();
        if !missing.is_empty() {
            for master in self.repo.find_event_masters_by_ids(&missing).await? {
                master_index.insert(master.id, master);
            }
        }

        // Supersession is at UTC calendar-day granularity: an exception that
        // only changes the time of day still replaces the raw occurrence.
        let cancelled_days: HashSet<(Uuid, NaiveDate)> = cancellations
            .iter()
            .map(|c| (c.event_master_id, c.original_date.date_naive()))
            .collect();
        let overridden_days: HashSet<(Uuid, NaiveDate)> = exceptions
            .iter()
            .map(|ex| (ex.event_master_id, ex.original_date.date_naive()))
            .collect();

        let mut tasks: Vec<CalendarTask> = Vec::new();

        for ex in &exceptions {
            // The exception may have moved the occurrence out of sight.
            if !window.contains(ex.new_date) {
                continue;
            }
            let Some(master) = master_index.get(&ex.event_master_id) else {
                warn!(
                    event_master_id = %ex.event_master_id,
                    exception_id = %ex.id,
                    "exception references unknown event master; skipping occurrence"
                );
                continue;
            };
            tasks.push(CalendarTask {
                event_master_id: master.id,
                team_id: master.team_id,
                title: ex.title.clone().unwrap_or_else(|| master.title.clone()),
                description: ex.description.clone().or_else(|| master.description.clone()),
                date: ex.new_date,
                task_type: ex.task_type.unwrap_or(master.task_type),
                created_by: master.created_by,
            });
        }

        for master in &masters {
            let expander = RecurrenceExpander::for_master(master)?;
            for date in expander.occurrences_between(window.start(), window.end()) {
                let day = (master.id, date.date_naive());
                if cancelled_days.contains(&day) || overridden_days.contains(&day) {
                    continue;
                }
                tasks.push(CalendarTask {
                    event_master_id: master.id,
                    team_id: master.team_id,
                    title: master.title.clone(),
                    description: master.description.clone(),
                    date,
                    task_type: master.task_type,
                    created_by: master.created_by,
                });
            }
        }

        // The master fetch already narrows by type, but an exception can
        // override the type either way, so filter on the effective value.
        if only_critical {
            tasks.retain(|t| t.task_type == TaskType::Critical);
        }

        // Two candidates landing on the same (master, timestamp) after all
        // filters means the stored data violates the one-occurrence
        // invariant; surface it instead of silently merging.
        let mut seen: HashSet<(Uuid, DateTime<Utc>)> = HashSet::with_capacity(tasks.len());
        for task in &tasks {
            if !seen.insert((task.event_master_id, task.date)) {
                return Err(CoreError::DataIntegrity(format!(
                    "duplicate occurrence for event master {} at {}",
                    task.event_master_id, task.date
                )));
            }
        }

        tasks.sort_by_key(|t| t.date);
        Ok(tasks)
    }

    /// The final reconciled task list for the given teams and window: all
    /// matching materialized rows plus the virtual occurrences that have not
    /// been cloned into rows yet, sorted ascending by date.
    pub async fn get_care_tasks(
        &self,
        window: &DateWindow,
        team_ids: &[Uuid],
        only_critical: bool,
        only_not_done: bool,
    ) -> Result<Vec<CareTaskEntry>, CoreError> {
        ensure_team_scope(team_ids)?;

        let (care_tasks, calendar_tasks, configs) = tokio::try_join!(
            self.repo
                .find_care_tasks_from_to(window, team_ids, only_critical, only_not_done),
            self.get_calendar_tasks(window, team_ids, only_critical),
            self.repo.find_team_configs(team_ids),
        )?;

        let cutoffs: HashMap<Uuid, Option<DateTime<Utc>>> = configs
            .into_iter()
            .map(|c| (c.team_id, c.cloned_care_tasks_until))
            .collect();

        let mut entries: Vec<CareTaskEntry> = care_tasks
            .into_iter()
            .map(CareTaskEntry::Materialized)
            .collect();

        for task in calendar_tasks {
            let include = match cutoffs.get(&task.team_id) {
                // Occurrences at or before the cutoff already exist as rows.
                Some(Some(cutoff)) => task.date > *cutoff,
                Some(None) => true,
                None => {
                    // A team with calendar data but no config row is a data
                    // anomaly; fail open and show the occurrence rather than
                    // hiding work from caregivers.
                    warn!(
                        team_id = %task.team_id,
                        "no team config for calendar task; treating occurrences as not yet materialized"
                    );
                    true
                }
            };
            if include {
                entries.push(CareTaskEntry::Virtual(task));
            }
        }

        if only_not_done {
            entries.retain(|e| e.done_at().is_none());
        }

        entries.sort_by_key(|e| e.date());
        Ok(entries)
    }
}

/// Every public query must be scoped to at least one team; an empty scope
/// would silently read across tenants.
fn ensure_team_scope(team_ids: &[Uuid]) -> Result<(), CoreError> {
    if team_ids.is_empty() {
        return Err(CoreError::InvalidInput(
            "team_ids must not be empty".to_string(),
        ));
    }
    Ok(())
}
