//! Pure schedule evaluation.

use crate::{ScheduleError, ScheduleResult};
use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use verdant_types::{PumpCycle, ScheduleConfig};

fn parse_tz(cfg: &ScheduleConfig) -> ScheduleResult<Tz> {
    cfg.tz
        .parse()
        .map_err(|_| ScheduleError::InvalidTimezone(cfg.tz.clone()))
}

/// Whether the light should be on at `now`.
///
/// The on minute is inclusive, the off minute exclusive. When the on time
/// is not before the off time, the window spans midnight.
pub fn is_light_on(now: DateTime<Utc>, cfg: &ScheduleConfig) -> ScheduleResult<bool> {
    let tz = parse_tz(cfg)?;
    let local = now.with_timezone(&tz);
    let minute = local.hour() * 60 + local.minute();
    let on = cfg.on_minute_of_day();
    let off = cfg.off_minute_of_day();
    Ok(if on < off {
        minute >= on && minute < off
    } else {
        minute >= on || minute < off
    })
}

/// Next UTC instant of the daily on transition, strictly after `now`.
pub fn next_on(now: DateTime<Utc>, cfg: &ScheduleConfig) -> ScheduleResult<DateTime<Utc>> {
    next_local_occurrence(now, cfg, cfg.on_hour, cfg.on_minute)
}

/// Next UTC instant of the daily off transition, strictly after `now`.
pub fn next_off(now: DateTime<Utc>, cfg: &ScheduleConfig) -> ScheduleResult<DateTime<Utc>> {
    next_local_occurrence(now, cfg, cfg.off_hour, cfg.off_minute)
}

fn next_local_occurrence(
    now: DateTime<Utc>,
    cfg: &ScheduleConfig,
    hour: u8,
    minute: u8,
) -> ScheduleResult<DateTime<Utc>> {
    let tz = parse_tz(cfg)?;
    let target = NaiveTime::from_hms_opt(u32::from(hour), u32::from(minute), 0)
        .ok_or_else(|| ScheduleError::InvalidConfig(format!("{hour:02}:{minute:02}")))?;

    let mut date = now.with_timezone(&tz).date_naive();
    let mut candidate = resolve_local(tz, date.and_time(target))?;
    if candidate <= now {
        date = date.succ_opt().ok_or(ScheduleError::Overflow)?;
        candidate = resolve_local(tz, date.and_time(target))?;
    }
    Ok(candidate.with_timezone(&Utc))
}

/// Map a local wall-clock time onto an instant.
///
/// A DST fold takes the earlier offset; a DST gap takes the earliest valid
/// instant after the gap.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> ScheduleResult<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => Ok(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            // Spring-forward gap: walk forward minute by minute until the
            // wall clock exists again. Gaps are at most a few hours.
            for offset_min in 1i64..=180 {
                let shifted = naive + Duration::minutes(offset_min);
                match tz.from_local_datetime(&shifted) {
                    LocalResult::Single(t) => return Ok(t.with_timezone(&Utc)),
                    LocalResult::Ambiguous(earliest, _) => {
                        return Ok(earliest.with_timezone(&Utc))
                    }
                    LocalResult::None => continue,
                }
            }
            Err(ScheduleError::Overflow)
        }
    }
}

/// Collapse any number of missed transitions between `last_seen` and `now`
/// into at most one state correction.
///
/// Returns the desired light state when the predicate differs between the
/// two instants, `None` otherwise (including `last_seen >= now`).
pub fn reconcile(
    last_seen: DateTime<Utc>,
    now: DateTime<Utc>,
    cfg: &ScheduleConfig,
) -> ScheduleResult<Option<bool>> {
    if last_seen >= now {
        return Ok(None);
    }
    let was = is_light_on(last_seen, cfg)?;
    let current = is_light_on(now, cfg)?;
    Ok(if was != current { Some(current) } else { None })
}

/// Whether the pump is in the on-phase of its epoch-anchored cycle.
pub fn pump_is_on(now: DateTime<Utc>, cycle: &PumpCycle) -> bool {
    let cycle = cycle.normalized();
    if cycle.on_minutes == 0 || cycle.period_minutes == 0 {
        return false;
    }
    let minutes = now.timestamp().div_euclid(60);
    minutes.rem_euclid(i64::from(cycle.period_minutes)) < i64::from(cycle.on_minutes)
}
