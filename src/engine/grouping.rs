use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};

use super::EngineConfig;
use super::window::{local_day, window_for};
use crate::model::punch_event::PunchEvent;
use crate::model::shift_schedule::ShiftSchedule;

/// A punch whose device identity has been resolved to an employee.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPunch {
    pub employee_id: u64,
    pub event: PunchEvent,
}

/// Key of a reconciliation bucket.
pub type BucketKey = (u64, NaiveDate);

/// Decide which work-day a punch belongs to.
///
/// Policy, in order: the punch's own calendar day if it falls inside that
/// day's check-in window; else the previous day if it falls inside the
/// previous day's check-in window (early-morning punches of an overnight
/// shift land on the shift's start day); else the punch's own day with no
/// schedule. When today's and yesterday's windows overlap, today wins.
pub fn assign_day(
    punch: &ResolvedPunch,
    schedules: &HashMap<BucketKey, ShiftSchedule>,
    cfg: &EngineConfig,
) -> NaiveDate {
    let at = punch.event.occurred_at;
    let day = local_day(at, cfg.offset());

    if let Some(schedule) = schedules.get(&(punch.employee_id, day)) {
        if window_for(schedule, cfg).accepts_check_in(at) {
            return day;
        }
    }

    let prev = day - Duration::days(1);
    if let Some(schedule) = schedules.get(&(punch.employee_id, prev)) {
        if window_for(schedule, cfg).accepts_check_in(at) {
            return prev;
        }
    }

    day
}

/// Group resolved punches into `(employee, work-day)` buckets, each bucket
/// ordered by epoch.
pub fn group_punches(
    mut punches: Vec<ResolvedPunch>,
    schedules: &HashMap<BucketKey, ShiftSchedule>,
    cfg: &EngineConfig,
) -> BTreeMap<BucketKey, Vec<PunchEvent>> {
    punches.sort_by_key(|p| p.event.epoch);

    let mut buckets: BTreeMap<BucketKey, Vec<PunchEvent>> = BTreeMap::new();
    for punch in punches {
        let day = assign_day(&punch, schedules, cfg);
        buckets
            .entry((punch.employee_id, day))
            .or_default()
            .push(punch.event);
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, NaiveTime};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn at(day: u32, h: u32, min: u32) -> NaiveDateTime {
        d(day).and_time(NaiveTime::from_hms_opt(h, min, 0).unwrap())
    }

    fn punch(employee_id: u64, epoch: i64, day: u32, h: u32, min: u32) -> ResolvedPunch {
        ResolvedPunch {
            employee_id,
            event: PunchEvent {
                id: epoch as u64,
                device_id: "dev-1".into(),
                device_user_code: "101".into(),
                occurred_at: at(day, h, min),
                epoch,
            },
        }
    }

    fn schedule(employee_id: u64, day: u32, start: (u32, u32), end: (u32, u32)) -> ShiftSchedule {
        ShiftSchedule {
            id: 0,
            employee_id,
            work_date: d(day),
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            break_minutes: 0,
            late_grace_minutes: 0,
            early_grace_minutes: 0,
        }
    }

    fn schedules(list: Vec<ShiftSchedule>) -> HashMap<BucketKey, ShiftSchedule> {
        list.into_iter()
            .map(|s| ((s.employee_id, s.work_date), s))
            .collect()
    }

    #[test]
    fn overnight_punches_group_on_shift_start_day() {
        let cfg = EngineConfig::default();
        let scheds = schedules(vec![schedule(7, 2, (22, 0), (6, 0))]);
        let buckets = group_punches(
            vec![punch(7, 1, 2, 23, 30), punch(7, 2, 3, 5, 30)],
            &scheds,
            &cfg,
        );

        assert_eq!(buckets.len(), 1);
        let group = &buckets[&(7, d(2))];
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].occurred_at, at(2, 23, 30));
        assert_eq!(group[1].occurred_at, at(3, 5, 30));
    }

    #[test]
    fn punch_without_any_schedule_stays_on_own_day() {
        let cfg = EngineConfig::default();
        let buckets = group_punches(vec![punch(7, 1, 2, 7, 0)], &HashMap::new(), &cfg);
        assert!(buckets.contains_key(&(7, d(2))));
    }

    #[test]
    fn same_day_window_wins_over_previous_day() {
        let cfg = EngineConfig::default();
        // Overnight shift on day 2 ending 08:00; day-3 shift starting 07:30.
        // A 07:00 punch on day 3 sits in both check-in windows; today's
        // schedule takes it.
        let scheds = schedules(vec![
            schedule(7, 2, (23, 0), (8, 0)),
            schedule(7, 3, (7, 30), (16, 0)),
        ]);
        let buckets = group_punches(vec![punch(7, 1, 3, 7, 0)], &scheds, &cfg);
        assert!(buckets.contains_key(&(7, d(3))));
    }

    #[test]
    fn punch_outside_both_windows_falls_back_to_own_day() {
        let cfg = EngineConfig::default();
        // Shift on day 2 only. A day-3 noon punch is past its check-in
        // window, so it stays a no-shift punch on day 3.
        let scheds = schedules(vec![schedule(7, 2, (8, 0), (17, 0))]);
        let buckets = group_punches(vec![punch(7, 1, 3, 12, 0)], &scheds, &cfg);
        assert!(buckets.contains_key(&(7, d(3))));
    }

    #[test]
    fn bucket_order_follows_epoch_not_insertion() {
        let cfg = EngineConfig::default();
        let scheds = schedules(vec![schedule(7, 2, (8, 0), (17, 0))]);
        let buckets = group_punches(
            vec![punch(7, 5, 2, 16, 0), punch(7, 3, 2, 8, 0)],
            &scheds,
            &cfg,
        );
        let group = &buckets[&(7, d(2))];
        assert_eq!(group[0].epoch, 3);
        assert_eq!(group[1].epoch, 5);
    }

    #[test]
    fn employees_are_bucketed_independently() {
        let cfg = EngineConfig::default();
        let scheds = schedules(vec![
            schedule(7, 2, (8, 0), (17, 0)),
            schedule(8, 2, (8, 0), (17, 0)),
        ]);
        let buckets = group_punches(
            vec![punch(7, 1, 2, 8, 0), punch(8, 2, 2, 8, 5)],
            &scheds,
            &cfg,
        );
        assert_eq!(buckets.len(), 2);
    }
}
