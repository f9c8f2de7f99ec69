use chrono::{DateTime, Utc};
use rrule::{RRuleSet, Tz as RRuleTz};
use tracing::error;

use crate::error::CoreError;
use crate::models::EventMaster;

/// Safety cap on how many occurrences a single expansion may yield. Windows
/// are bounded (a handful of weeks in practice), so hitting this means a
/// runaway rule, not a legitimate query.
const MAX_EXPANDED_OCCURRENCES: u16 = 1000;

/// Expands an event master's RFC 5545 rule into concrete occurrence dates.
///
/// Parsing happens once at construction; a malformed rule is a fatal
/// [`CoreError::InvalidRule`], logged and propagated rather than silently
/// yielding an empty series.
#[derive(Debug)]
pub struct RecurrenceExpander {
    rrule_set: RRuleSet,
    date_until: Option<DateTime<Utc>>,
}

impl RecurrenceExpander {
    /// Builds an expander for the given master.
    pub fn for_master(master: &EventMaster) -> Result<Self, CoreError> {
        let rrule_set = parse_rule(&master.rule, master.date_start)?;
        Ok(Self {
            rrule_set,
            date_until: master.date_until,
        })
    }

    /// All occurrence dates within `[start, end]`, boundaries inclusive,
    /// clamped to the master's `date_until` when one is set.
    pub fn occurrences_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        let end = match self.date_until {
            Some(until) => end.min(until),
            None => end,
        };
        if end < start {
            return Vec::new();
        }

        let bounded = self
            .rrule_set
            .clone()
            .after(start.with_timezone(&RRuleTz::UTC))
            .before(end.with_timezone(&RRuleTz::UTC));
        let (occurrences, _) = bounded.all(MAX_EXPANDED_OCCURRENCES);

        occurrences
            .into_iter()
            .map(|dt| dt.with_timezone(&Utc))
            .collect()
    }

    /// Validates a rule string without keeping the parsed set around. Used
    /// by the write path before an event master is persisted.
    pub fn validate_rule(rule: &str, date_start: DateTime<Utc>) -> Result<(), CoreError> {
        parse_rule(rule, date_start).map(|_| ())
    }
}

/// Parses a rule, prepending a DTSTART derived from `date_start` when the
/// stored rule does not carry its own.
fn parse_rule(rule: &str, date_start: DateTime<Utc>) -> Result<RRuleSet, CoreError> {
    let rule_string = if rule.contains("DTSTART") {
        rule.to_string()
    } else {
        format!(
            "DTSTART:{}\nRRULE:{}",
            date_start.format("%Y%m%dT%H%M%SZ"),
            rule
        )
    };

    rule_string.parse::<RRuleSet>().map_err(|e| {
        error!(rule = %rule_string, error = %e, "failed to parse recurrence rule");
        CoreError::InvalidRule(format!("Failed to parse rule '{}': {}", rule_string, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskType;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn daily_master(rule: &str) -> EventMaster {
        EventMaster {
            id: Uuid::now_v7(),
            title: "Give medication".to_string(),
            description: None,
            rule: rule.to_string(),
            date_start: Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap(),
            date_until: None,
            task_type: TaskType::Normal,
            team_id: Uuid::now_v7(),
            created_by: Uuid::now_v7(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn expands_daily_rule_inclusive_of_boundaries() {
        let master = daily_master("FREQ=DAILY;INTERVAL=1");
        let expander = RecurrenceExpander::for_master(&master).unwrap();

        let start = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 5, 8, 0, 0).unwrap();
        let dates = expander.occurrences_between(start, end);

        assert_eq!(dates.len(), 5);
        assert_eq!(dates[0], start);
        assert_eq!(dates[4], end);
    }

    #[test]
    fn respects_interval_and_count() {
        let master = daily_master("FREQ=DAILY;INTERVAL=2;COUNT=3");
        let expander = RecurrenceExpander::for_master(&master).unwrap();

        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let dates = expander.occurrences_between(start, end);

        assert_eq!(dates.len(), 3);
        assert_eq!(dates[1] - dates[0], Duration::days(2));
    }

    #[test]
    fn date_until_clamps_expansion() {
        let mut master = daily_master("FREQ=DAILY;INTERVAL=1");
        master.date_until = Some(Utc.with_ymd_and_hms(2025, 1, 3, 8, 0, 0).unwrap());
        let expander = RecurrenceExpander::for_master(&master).unwrap();

        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        let dates = expander.occurrences_between(start, end);

        assert_eq!(dates.len(), 3);
    }

    #[test]
    fn empty_when_window_entirely_past_date_until() {
        let mut master = daily_master("FREQ=DAILY;INTERVAL=1");
        master.date_until = Some(Utc.with_ymd_and_hms(2025, 1, 3, 8, 0, 0).unwrap());
        let expander = RecurrenceExpander::for_master(&master).unwrap();

        let start = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap();
        assert!(expander.occurrences_between(start, end).is_empty());
    }

    #[test]
    fn malformed_rule_is_a_parse_error() {
        let master = daily_master("NOT_A_RULE");
        let result = RecurrenceExpander::for_master(&master);
        assert!(matches!(result, Err(CoreError::InvalidRule(_))));
    }

    #[test]
    fn validate_rule_matches_parser() {
        let dtstart = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        assert!(RecurrenceExpander::validate_rule("FREQ=DAILY;INTERVAL=1", dtstart).is_ok());
        assert!(RecurrenceExpander::validate_rule("FREQ=WEEKLY;BYDAY=MO,WE", dtstart).is_ok());
        assert!(RecurrenceExpander::validate_rule("garbage", dtstart).is_err());
    }

    #[test]
    fn rule_with_embedded_dtstart_is_used_verbatim() {
        let mut master = daily_master("x");
        master.rule = "DTSTART:20250110T080000Z\nRRULE:FREQ=DAILY;INTERVAL=1".to_string();
        let expander = RecurrenceExpander::for_master(&master).unwrap();

        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 12, 0, 0, 0).unwrap();
        let dates = expander.occurrences_between(start, end);

        // Series starts on the 10th regardless of the earlier window start.
        assert_eq!(dates.len(), 2);
        assert_eq!(
            dates[0],
            Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap()
        );
    }
}
