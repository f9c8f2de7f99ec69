use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoreError;

/// Severity class of a task or event occurrence.
///
/// Critical tasks surface in caregiver-facing "critical only" views; the
/// flag flows from the event master through exceptions down to care tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TaskType {
    Normal,
    Critical,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid task type: {0}")]
pub struct ParseTaskTypeError(String);

impl FromStr for TaskType {
    type Err = ParseTaskTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(TaskType::Normal),
            "critical" => Ok(TaskType::Critical),
            _ => Err(ParseTaskTypeError(s.to_string())),
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Normal => write!(f, "normal"),
            TaskType::Critical => write!(f, "critical"),
        }
    }
}

/// The stored template of a recurring event series.
///
/// `rule` is an RFC 5545 RRULE, with or without an embedded DTSTART; when
/// the DTSTART is absent, `date_start` supplies it. `date_until` is a hard
/// upper bound on expansion regardless of what the rule itself says.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventMaster {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// RFC 5545 recurrence rule (e.g. "FREQ=DAILY;INTERVAL=1").
    pub rule: String,
    /// Series start; becomes the DTSTART when the rule carries none.
    pub date_start: DateTime<Utc>,
    /// Optional hard end of the series.
    pub date_until: Option<DateTime<Utc>>,
    pub task_type: TaskType,
    pub team_id: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A single-occurrence override of a recurring series.
///
/// Supersedes the raw recurrence candidate on `original_date` (same UTC
/// calendar day) and re-emits the occurrence at `new_date`, with content
/// overrides falling back to the master's where absent. Never mutated,
/// only created and deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventException {
    pub id: Uuid,
    pub event_master_id: Uuid,
    /// The occurrence being overridden.
    pub original_date: DateTime<Utc>,
    /// Where the occurrence now lands (may equal `original_date`).
    pub new_date: DateTime<Utc>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub task_type: Option<TaskType>,
    pub created_at: DateTime<Utc>,
}

/// Tombstone suppressing a single occurrence of a recurring series.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventCancellation {
    pub id: Uuid,
    pub event_master_id: Uuid,
    pub original_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A persisted, concrete care task row.
///
/// `event_master_id = None` means the task was created by hand rather than
/// materialized from a recurring series.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CareTask {
    pub id: Uuid,
    pub event_master_id: Option<Uuid>,
    pub team_id: Uuid,
    pub date: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    /// Free-form caregiver notes recorded when working the task.
    pub details: Option<String>,
    pub task_type: TaskType,
    pub done_at: Option<DateTime<Utc>>,
    pub done_by_user_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A virtual occurrence: computed from an event master (and possibly an
/// exception), not yet persisted as a [`CareTask`] row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarTask {
    pub event_master_id: Uuid,
    pub team_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub task_type: TaskType,
    pub created_by: Uuid,
}

impl CalendarTask {
    /// Stable handle for this occurrence prior to materialization.
    pub fn composite_id(&self) -> String {
        composite_task_id(self.event_master_id, self.date)
    }
}

/// Derives the stable identifier of a virtual occurrence from its master id
/// and occurrence timestamp.
///
/// Deterministic and injective for distinct `(event_master_id, date)` pairs:
/// the uuid prefix is fixed-length, so the separator cannot be confused with
/// uuid content, and the timestamp is rendered at millisecond precision in
/// UTC. Used for idempotent create-or-update operations on occurrences that
/// have no database id yet.
pub fn composite_task_id(event_master_id: Uuid, date: DateTime<Utc>) -> String {
    format!(
        "{}-{}",
        event_master_id,
        date.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// One entry of the reconciled team task list.
///
/// The materialized/virtual split is a tagged union rather than a nullable
/// id so call sites must handle both arms: a materialized task can be marked
/// done in place, a virtual one has to be materialized first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CareTaskEntry {
    Materialized(CareTask),
    Virtual(CalendarTask),
}

impl CareTaskEntry {
    pub fn date(&self) -> DateTime<Utc> {
        match self {
            CareTaskEntry::Materialized(t) => t.date,
            CareTaskEntry::Virtual(t) => t.date,
        }
    }

    pub fn team_id(&self) -> Uuid {
        match self {
            CareTaskEntry::Materialized(t) => t.team_id,
            CareTaskEntry::Virtual(t) => t.team_id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            CareTaskEntry::Materialized(t) => &t.title,
            CareTaskEntry::Virtual(t) => &t.title,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            CareTaskEntry::Materialized(t) => t.description.as_deref(),
            CareTaskEntry::Virtual(t) => t.description.as_deref(),
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            CareTaskEntry::Materialized(t) => t.task_type,
            CareTaskEntry::Virtual(t) => t.task_type,
        }
    }

    /// Completion timestamp; virtual occurrences are never done.
    pub fn done_at(&self) -> Option<DateTime<Utc>> {
        match self {
            CareTaskEntry::Materialized(t) => t.done_at,
            CareTaskEntry::Virtual(_) => None,
        }
    }

    /// Database row id, present only for materialized tasks.
    pub fn id(&self) -> Option<Uuid> {
        match self {
            CareTaskEntry::Materialized(t) => Some(t.id),
            CareTaskEntry::Virtual(_) => None,
        }
    }

    /// Stable string handle: the row uuid for materialized tasks, the
    /// composite id for virtual ones.
    pub fn handle(&self) -> String {
        match self {
            CareTaskEntry::Materialized(t) => t.id.to_string(),
            CareTaskEntry::Virtual(t) => t.composite_id(),
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, CareTaskEntry::Virtual(_))
    }
}

/// Per-team configuration consulted during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeamConfig {
    pub team_id: Uuid,
    /// Virtual occurrences dated at or before this point are assumed to have
    /// already been cloned into real care-task rows and are hidden.
    pub cloned_care_tasks_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An inclusive `[start, end]` query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CoreError> {
        if end < start {
            return Err(CoreError::InvalidInput(format!(
                "Date window end ({}) precedes start ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        dt >= self.start && dt <= self.end
    }
}

// ============================================================================
// Data Transfer Objects for write operations
// ============================================================================

/// Data required to create a new recurring event master.
#[derive(Debug, Clone)]
pub struct NewEventMaster {
    pub title: String,
    pub description: Option<String>,
    /// Raw RRULE; validated before the row is written.
    pub rule: String,
    pub date_start: DateTime<Utc>,
    pub date_until: Option<DateTime<Utc>>,
    pub task_type: TaskType,
    pub team_id: Uuid,
    pub created_by: Uuid,
}

/// Data for overriding a single occurrence of a series.
#[derive(Debug, Clone)]
pub struct NewEventException {
    pub event_master_id: Uuid,
    pub original_date: DateTime<Utc>,
    pub new_date: DateTime<Utc>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub task_type: Option<TaskType>,
}

/// Data for suppressing a single occurrence of a series.
#[derive(Debug, Clone)]
pub struct NewEventCancellation {
    pub event_master_id: Uuid,
    pub original_date: DateTime<Utc>,
}

/// Data required to create a care task row directly.
#[derive(Debug, Clone)]
pub struct NewCareTask {
    pub event_master_id: Option<Uuid>,
    pub team_id: Uuid,
    pub date: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub details: Option<String>,
    pub task_type: TaskType,
    pub created_by: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn task_type_round_trip() {
        assert_eq!("normal".parse::<TaskType>().unwrap(), TaskType::Normal);
        assert_eq!("CRITICAL".parse::<TaskType>().unwrap(), TaskType::Critical);
        assert!("urgent".parse::<TaskType>().is_err());
        assert_eq!(TaskType::Critical.to_string(), "critical");
    }

    #[test]
    fn composite_id_is_deterministic() {
        let master = Uuid::now_v7();
        let date = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        assert_eq!(
            composite_task_id(master, date),
            composite_task_id(master, date)
        );
    }

    #[test]
    fn composite_id_uses_iso_millis() {
        let master = Uuid::nil();
        let date = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        assert_eq!(
            composite_task_id(master, date),
            format!("{}-2025-03-14T09:30:00.000Z", Uuid::nil())
        );
    }

    #[test]
    fn care_task_entry_serializes_with_kind_tag() {
        let virtual_task = CalendarTask {
            event_master_id: Uuid::nil(),
            team_id: Uuid::nil(),
            title: "Standup".to_string(),
            description: None,
            date: Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap(),
            task_type: TaskType::Normal,
            created_by: Uuid::nil(),
        };
        let value =
            serde_json::to_value(CareTaskEntry::Virtual(virtual_task)).unwrap();
        assert_eq!(value["kind"], "virtual");
        assert_eq!(value["title"], "Standup");
    }

    #[test]
    fn date_window_rejects_inverted_bounds() {
        let start = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            DateWindow::new(start, end),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(DateWindow::new(start, start).is_ok());
    }

    #[test]
    fn date_window_contains_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap();
        let window = DateWindow::new(start, end).unwrap();
        assert!(window.contains(start));
        assert!(window.contains(end));
        assert!(!window.contains(end + chrono::Duration::seconds(1)));
    }

    proptest! {
        /// Distinct (master, timestamp) pairs must never collide.
        #[test]
        fn composite_id_injective(
            a in any::<u128>(),
            b in any::<u128>(),
            secs_a in 0i64..4_102_444_800,
            secs_b in 0i64..4_102_444_800,
        ) {
            let (ma, mb) = (Uuid::from_u128(a), Uuid::from_u128(b));
            let da = DateTime::<Utc>::from_timestamp(secs_a, 0).unwrap();
            let db = DateTime::<Utc>::from_timestamp(secs_b, 0).unwrap();
            if (ma, da) != (mb, db) {
                prop_assert_ne!(composite_task_id(ma, da), composite_task_id(mb, db));
            } else {
                prop_assert_eq!(composite_task_id(ma, da), composite_task_id(mb, db));
            }
        }
    }
}
