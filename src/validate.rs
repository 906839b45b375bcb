//! Request checks applied before a window reaches the scheduler.

use crate::error::ValidationError;
use crate::settings::{ScheduleSettings, format_duration};
use chrono::{DateTime, Utc};

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobWindow {
    pub event_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Parse and check a scheduling request, collecting every problem rather
/// than stopping at the first one. Windows shorter than the lead time are
/// accepted; they simply start immediately.
pub fn validate_window(
    event_id: &str,
    start: &str,
    end: &str,
    limits: &ScheduleSettings,
    now: DateTime<Utc>,
) -> Result<JobWindow, ValidationError> {
    let mut reasons = vec![];

    let event_id = event_id.trim();
    if event_id.is_empty() {
        reasons.push("eventId must not be empty".to_string());
    } else if event_id.contains(['/', '\\'])
        || event_id.contains("..")
        || event_id.chars().any(char::is_control)
    {
        reasons.push(format!(
            "eventId '{}' must not contain path separators, '..' or control characters",
            event_id.escape_debug()
        ));
    }
    let start = parse_time("startTime", start, &mut reasons);
    let end = parse_time("endTime", end, &mut reasons);

    if let Some(end) = end
        && end <= now
    {
        reasons.push(format!("endTime {} is not in the future", end.to_rfc3339()));
    }
    if let Some(start) = start {
        // a bound past chrono's range means no bound at all
        if now
            .checked_add_signed(limits.horizon)
            .is_some_and(|limit| start > limit)
        {
            reasons.push(format!(
                "startTime {} is more than {} ahead",
                start.to_rfc3339(),
                format_duration(limits.horizon)
            ));
        }
        if now
            .checked_sub_signed(limits.max_lookback)
            .is_some_and(|limit| start < limit)
        {
            reasons.push(format!(
                "startTime {} is more than {} in the past",
                start.to_rfc3339(),
                format_duration(limits.max_lookback)
            ));
        }
    }
    if let (Some(start), Some(end)) = (start, end)
        && start >= end
    {
        reasons.push("startTime must be before endTime".to_string());
    }

    match (start, end) {
        (Some(start), Some(end)) if reasons.is_empty() => Ok(JobWindow {
            event_id: event_id.to_string(),
            start,
            end,
        }),
        _ => Err(ValidationError { reasons }),
    }
}

fn parse_time(field: &str, value: &str, reasons: &mut Vec<String>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        reasons.push(format!("{field} is required"));
        return None;
    }
    match DateTime::parse_from_rfc3339(value) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            reasons.push(format!("{field} '{value}' is not an RFC 3339 timestamp: {e}"));
            None
        }
    }
}
