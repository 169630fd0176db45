use chrono::{Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use super::EngineConfig;
use crate::model::shift_schedule::ShiftSchedule;

/// A planned shift resolved to absolute UTC instants for one anchor day.
///
/// `end` is always strictly after `start`; an end time-of-day at or before
/// the start time-of-day rolls over to the next calendar day (overnight
/// shift). `check_in_open` extends the window earlier so punches shortly
/// before shift start are still taken as that day's check-in candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub check_in_open: NaiveDateTime,
}

impl ShiftWindow {
    /// Acceptance test for check-in candidates: `[check_in_open, end]`.
    pub fn accepts_check_in(&self, at: NaiveDateTime) -> bool {
        at >= self.check_in_open && at <= self.end
    }
}

/// Calendar day of a UTC instant under the fixed organizational offset.
pub fn local_day(at_utc: NaiveDateTime, offset: FixedOffset) -> NaiveDate {
    (at_utc + Duration::seconds(offset.local_minus_utc() as i64)).date()
}

/// Resolve a planned day + wall-clock start/end into a `ShiftWindow`.
pub fn resolve_window(
    day: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    offset: FixedOffset,
    check_in_buffer_minutes: i64,
) -> ShiftWindow {
    let start_local = day.and_time(start_time);
    let mut end_local = day.and_time(end_time);
    if end_local <= start_local {
        end_local += Duration::days(1);
    }

    let to_utc = Duration::seconds(offset.local_minus_utc() as i64);
    let start = start_local - to_utc;
    let end = end_local - to_utc;

    ShiftWindow {
        start,
        end,
        check_in_open: start - Duration::minutes(check_in_buffer_minutes),
    }
}

pub fn window_for(schedule: &ShiftSchedule, cfg: &EngineConfig) -> ShiftWindow {
    resolve_window(
        schedule.work_date,
        schedule.start_time,
        schedule.end_time,
        cfg.offset(),
        cfg.check_in_buffer_minutes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, min: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, min, 0).unwrap()
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn day_shift_resolves_same_day() {
        let w = resolve_window(d(2026, 3, 2), t(8, 0), t(17, 0), utc(), 60);
        assert_eq!(w.start, d(2026, 3, 2).and_time(t(8, 0)));
        assert_eq!(w.end, d(2026, 3, 2).and_time(t(17, 0)));
        assert_eq!(w.check_in_open, d(2026, 3, 2).and_time(t(7, 0)));
    }

    #[test]
    fn overnight_shift_rolls_end_to_next_day() {
        let w = resolve_window(d(2026, 3, 2), t(22, 0), t(6, 0), utc(), 60);
        assert_eq!(w.start, d(2026, 3, 2).and_time(t(22, 0)));
        assert_eq!(w.end, d(2026, 3, 3).and_time(t(6, 0)));
        assert!(w.end > w.start);
    }

    #[test]
    fn end_equal_to_start_counts_as_overnight() {
        let w = resolve_window(d(2026, 3, 2), t(9, 0), t(9, 0), utc(), 60);
        assert_eq!(w.end - w.start, Duration::days(1));
    }

    #[test]
    fn window_is_shifted_by_fixed_offset() {
        // UTC+6: a 08:00 local start is 02:00 UTC.
        let off = FixedOffset::east_opt(6 * 3600).unwrap();
        let w = resolve_window(d(2026, 3, 2), t(8, 0), t(17, 0), off, 60);
        assert_eq!(w.start, d(2026, 3, 2).and_time(t(2, 0)));
        assert_eq!(w.end, d(2026, 3, 2).and_time(t(11, 0)));
    }

    #[test]
    fn check_in_window_acceptance_bounds() {
        let w = resolve_window(d(2026, 3, 2), t(8, 0), t(17, 0), utc(), 60);
        assert!(w.accepts_check_in(d(2026, 3, 2).and_time(t(7, 0))));
        assert!(w.accepts_check_in(d(2026, 3, 2).and_time(t(17, 0))));
        assert!(!w.accepts_check_in(d(2026, 3, 2).and_time(t(6, 59))));
        assert!(!w.accepts_check_in(d(2026, 3, 2).and_time(t(17, 1))));
    }

    #[test]
    fn local_day_respects_offset_not_process_tz() {
        // 2026-03-02T20:30Z is already 03-03 in UTC+6.
        let off = FixedOffset::east_opt(6 * 3600).unwrap();
        let at = d(2026, 3, 2).and_time(t(20, 30));
        assert_eq!(local_day(at, off), d(2026, 3, 3));
        assert_eq!(local_day(at, utc()), d(2026, 3, 2));
    }
}
