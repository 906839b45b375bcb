//! One-shot calendar triggers.
//!
//! A trigger runs a callback once at an absolute wall-clock time in a fixed
//! timezone. The production implementation resolves the fire time through a
//! calendar (cron) expression rather than a single long sleep, and re-reads
//! the wall clock while it waits, so clock adjustments during a multi-week
//! wait are honored.

use crate::error::TriggerError;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::AbortHandle;

pub type Callback = Box<dyn FnOnce() + Send + 'static>;

pub trait Trigger: Send + Sync {
    /// Run `callback` once at `at`, evaluated in timezone `tz`.
    fn arm(&self, at: DateTime<Utc>, tz: Tz, callback: Callback)
    -> Result<TriggerHandle, TriggerError>;
}

/// Cancellation handle for an armed trigger. Dropping it leaves the trigger
/// armed.
#[derive(Debug)]
pub struct TriggerHandle {
    fire_at: DateTime<Tz>,
    armed: Arc<AtomicBool>,
    task: Option<AbortHandle>,
}

impl TriggerHandle {
    /// `armed` is shared with whatever fires the callback; the firing side
    /// must swap it to `false` and only run the callback if it was `true`.
    pub fn new(fire_at: DateTime<Tz>, armed: Arc<AtomicBool>, task: Option<AbortHandle>) -> Self {
        Self {
            fire_at,
            armed,
            task,
        }
    }

    pub fn fire_at(&self) -> DateTime<Tz> {
        self.fire_at
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Safe to call any number of times, before or after firing.
    pub fn disarm(&self) {
        if self.armed.swap(false, Ordering::SeqCst)
            && let Some(task) = &self.task
        {
            task.abort();
        }
    }
}

/// Cron-backed trigger running on the tokio runtime.
#[derive(Debug, Clone)]
pub struct CalendarTrigger {
    /// Longest single sleep before the wall clock is consulted again.
    max_slice: Duration,
}

impl Default for CalendarTrigger {
    fn default() -> Self {
        Self {
            max_slice: Duration::from_secs(30),
        }
    }
}

/// One-shot expression: `sec min hour day-of-month month day-of-week year`.
pub fn expression(at: &DateTime<Tz>) -> String {
    format!(
        "{} {} {} {} {} * {}",
        at.second(),
        at.minute(),
        at.hour(),
        at.day(),
        at.month(),
        at.year()
    )
}

impl CalendarTrigger {
    pub fn new(max_slice: Duration) -> Self {
        Self { max_slice }
    }

    /// Resolve the instant the expression for `at` next matches, or `None`
    /// when `at` is not after the current second (fire immediately).
    fn resolve(&self, at: DateTime<Tz>, now: DateTime<Tz>) -> Result<Option<DateTime<Tz>>, TriggerError> {
        let at = at.with_nanosecond(0).unwrap_or(at);
        if at <= now {
            return Ok(None);
        }
        let expr = expression(&at);
        let schedule = Schedule::from_str(&expr).map_err(|e| TriggerError {
            at: at.to_rfc3339(),
            reason: format!("invalid expression '{expr}': {e}"),
        })?;
        // The expression names a wall-clock time. On a fall-back night that
        // time occurs twice; the requested instant picks the occurrence.
        let repeated = at
            .timezone()
            .from_local_datetime(&at.naive_local())
            .single()
            .is_none();
        match schedule.after(&now).next() {
            Some(next) if next.naive_local() == at.naive_local() => Ok(Some(at)),
            None if repeated => Ok(Some(at)),
            Some(next) => Err(TriggerError {
                at: at.to_rfc3339(),
                reason: format!("expression '{expr}' resolved to {}", next.to_rfc3339()),
            }),
            None => Err(TriggerError {
                at: at.to_rfc3339(),
                reason: format!("expression '{expr}' has no upcoming occurrence"),
            }),
        }
    }
}

impl Trigger for CalendarTrigger {
    fn arm(
        &self,
        at: DateTime<Utc>,
        tz: Tz,
        callback: Callback,
    ) -> Result<TriggerHandle, TriggerError> {
        let now = Utc::now().with_timezone(&tz);
        let local = at.with_timezone(&tz);
        let resolved = self.resolve(local, now)?;
        let fire_at = resolved.unwrap_or(now);
        match resolved {
            Some(t) => trace!("trigger armed for {t} ({})", expression(&t)),
            None => trace!("trigger time {local} already passed, firing now"),
        }

        let armed = Arc::new(AtomicBool::new(true));
        let flag = armed.clone();
        let max_slice = self.max_slice;
        let task = tokio::spawn(async move {
            let target = fire_at.with_timezone(&Utc);
            loop {
                let now = Utc::now();
                if target <= now {
                    break;
                }
                let remaining = (target - now).to_std().unwrap_or_default();
                tokio::time::sleep(remaining.min(max_slice)).await;
            }
            if flag.swap(false, Ordering::SeqCst) {
                callback();
            }
        });

        Ok(TriggerHandle::new(fire_at, armed, Some(task.abort_handle())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[test]
    fn test_expression_pins_every_calendar_field() {
        let at = chrono_tz::Asia::Beirut
            .with_ymd_and_hms(2026, 3, 29, 14, 5, 9)
            .unwrap();
        assert_eq!(expression(&at), "9 5 14 29 3 * 2026");
    }

    #[test]
    fn test_resolve_matches_requested_instant() {
        let tz = chrono_tz::Asia::Beirut;
        let now = tz.with_ymd_and_hms(2026, 1, 10, 8, 0, 0).unwrap();
        let at = tz.with_ymd_and_hms(2026, 2, 1, 20, 30, 0).unwrap();
        let resolved = CalendarTrigger::default().resolve(at, now).unwrap();
        assert_eq!(resolved, Some(at));
    }

    #[test]
    fn test_resolve_keeps_occurrence_of_repeated_hour() {
        // 2026-10-25 03:00 CEST falls back to 02:00 CET
        let tz = chrono_tz::Europe::Paris;
        let first = Utc.with_ymd_and_hms(2026, 10, 25, 0, 30, 0).unwrap().with_timezone(&tz);
        let second = Utc.with_ymd_and_hms(2026, 10, 25, 1, 30, 0).unwrap().with_timezone(&tz);
        assert_eq!(first.naive_local(), second.naive_local());
        assert_ne!(first, second);

        let trigger = CalendarTrigger::default();
        let now = Utc.with_ymd_and_hms(2026, 10, 24, 12, 0, 0).unwrap().with_timezone(&tz);
        assert_eq!(trigger.resolve(first, now).unwrap(), Some(first));
        assert_eq!(trigger.resolve(second, now).unwrap(), Some(second));

        // between the two occurrences
        let now = Utc.with_ymd_and_hms(2026, 10, 25, 0, 45, 0).unwrap().with_timezone(&tz);
        assert_eq!(trigger.resolve(second, now).unwrap(), Some(second));
    }

    #[test]
    fn test_resolve_second_occurrence_in_event_timezone() {
        let tz = chrono_tz::Asia::Beirut;
        let end = Utc.with_ymd_and_hms(2026, 10, 24, 21, 30, 0).unwrap().with_timezone(&tz);
        let now = Utc.with_ymd_and_hms(2026, 10, 24, 12, 0, 0).unwrap().with_timezone(&tz);
        let resolved = CalendarTrigger::default().resolve(end, now).unwrap();
        assert_eq!(
            resolved.map(|t| t.with_timezone(&Utc)),
            Some(Utc.with_ymd_and_hms(2026, 10, 24, 21, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_resolve_past_or_current_second_fires_now() {
        let tz = chrono_tz::UTC;
        let now = tz.with_ymd_and_hms(2026, 1, 10, 8, 0, 0).unwrap();
        let trigger = CalendarTrigger::default();
        assert_eq!(trigger.resolve(now - chrono::Duration::minutes(3), now).unwrap(), None);
        assert_eq!(trigger.resolve(now, now).unwrap(), None);
    }

    #[tokio::test]
    async fn test_fires_once_and_disarms() {
        let (tx, rx) = oneshot::channel();
        let at = Utc::now() + chrono::Duration::milliseconds(1200);
        let handle = CalendarTrigger::new(Duration::from_millis(200))
            .arm(at, chrono_tz::UTC, Box::new(move || {
                let _ = tx.send(Utc::now());
            }))
            .unwrap();
        assert!(handle.is_armed());

        let fired = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("trigger did not fire")
            .unwrap();
        // fire time is truncated to the second
        assert!(fired >= at - chrono::Duration::seconds(1));
        assert!(!handle.is_armed());
        handle.disarm();
    }

    #[tokio::test]
    async fn test_disarm_before_fire() {
        let (tx, rx) = oneshot::channel::<()>();
        let handle = CalendarTrigger::default()
            .arm(
                Utc::now() + chrono::Duration::seconds(2),
                chrono_tz::Asia::Beirut,
                Box::new(move || {
                    let _ = tx.send(());
                }),
            )
            .unwrap();
        handle.disarm();
        handle.disarm();
        assert!(!handle.is_armed());

        // the aborted task drops the callback, closing the channel unsent
        let result = tokio::time::timeout(Duration::from_secs(4), rx).await;
        assert!(matches!(result, Ok(Err(_))));
    }

    #[tokio::test]
    async fn test_past_time_fires_immediately() {
        let (tx, rx) = oneshot::channel();
        CalendarTrigger::default()
            .arm(
                Utc::now() - chrono::Duration::minutes(1),
                chrono_tz::UTC,
                Box::new(move || {
                    let _ = tx.send(());
                }),
            )
            .unwrap();
        assert!(tokio::time::timeout(Duration::from_secs(1), rx).await.is_ok());
    }
}
