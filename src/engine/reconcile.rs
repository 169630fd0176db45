use chrono::{Duration, NaiveDate, NaiveDateTime};

use super::EngineConfig;
use super::window::window_for;
use crate::model::attendance::{
    AttendanceEvent, AttendanceEventKind, AttendanceRecord, CheckStatus, DayStatus, RecordSource,
};
use crate::model::punch_event::PunchEvent;
use crate::model::shift_schedule::ShiftSchedule;

/// Schedules relevant to one bucket: the bucket's own day and the next day
/// (the next-day shift caps the forced-checkout cutoff).
#[derive(Debug, Clone, Copy, Default)]
pub struct DaySchedules<'a> {
    pub today: Option<&'a ShiftSchedule>,
    pub next: Option<&'a ShiftSchedule>,
}

/// Outcome of reconciling one `(employee, day)` bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// A derived record plus its audit rows, ready to persist atomically.
    Record {
        record: AttendanceRecord,
        audits: Vec<AttendanceEvent>,
    },
    /// Not enough data to decide yet; write nothing and let a later batch
    /// complete the day once more punches arrive.
    Pending,
}

/// Derive the attendance record for one bucket of punches.
///
/// Pure: everything time-dependent comes in through `now`, everything
/// schedule-dependent through `schedules`. Buckets for manually adjusted
/// days must be filtered out by the caller before reaching here.
pub fn reconcile_day(
    employee_id: u64,
    day: NaiveDate,
    punches: &[PunchEvent],
    schedules: DaySchedules<'_>,
    now: NaiveDateTime,
    cfg: &EngineConfig,
) -> Reconciled {
    let Some(schedule) = schedules.today else {
        return reconcile_no_shift(employee_id, day, punches);
    };

    // Buckets only exist from punches, but an empty slice still has a
    // sensible answer: nothing to derive yet.
    let Some(latest_punch) = punches.iter().max_by_key(|p| p.occurred_at) else {
        return Reconciled::Pending;
    };

    let window = window_for(schedule, cfg);
    let earliest_candidate = punches
        .iter()
        .filter(|p| window.accepts_check_in(p.occurred_at))
        .min_by_key(|p| p.occurred_at);

    let Some(check_in_punch) = earliest_candidate else {
        // No eligible check-in. Once the window has fully passed the day is
        // closed as absent; before that the bucket stays open.
        if latest_punch.occurred_at >= window.end {
            return Reconciled::Record {
                record: AttendanceRecord {
                    employee_id,
                    work_date: day,
                    check_in_at: None,
                    check_out_at: None,
                    actual_minutes: 0,
                    late_minutes: 0,
                    early_leave_minutes: 0,
                    overtime_minutes: 0,
                    check_in_status: Some(CheckStatus::Missed),
                    check_out_status: Some(CheckStatus::Missed),
                    status: DayStatus::Absent,
                    source: RecordSource::Device,
                },
                audits: Vec::new(),
            };
        }
        return Reconciled::Pending;
    };

    let check_in_at = check_in_punch.occurred_at;

    // Latest instant this day may still be closed at: a fixed allowance past
    // shift end, capped so it never runs into the next day's shift.
    let mut cutoff = window.end + Duration::hours(cfg.auto_checkout_allowance_hours);
    if let Some(next) = schedules.next {
        let next_start = window_for(next, cfg).start - Duration::hours(cfg.next_shift_guard_hours);
        cutoff = cutoff.min(next_start);
    }

    let checkout_punch = punches
        .iter()
        .filter(|p| p.occurred_at >= check_in_at && p.occurred_at <= cutoff)
        .max_by_key(|p| p.occurred_at)
        .filter(|p| p.occurred_at > check_in_at);

    let mut check_out_at = checkout_punch.map(|p| p.occurred_at);
    let mut forced = false;
    if check_out_at.is_none() && (latest_punch.occurred_at >= cutoff || now >= cutoff) {
        check_out_at = Some(cutoff);
        forced = true;
    }

    let late_grace = window.start + Duration::minutes(schedule.late_grace_minutes as i64);
    let late_minutes = positive_minutes(late_grace, check_in_at);

    let mut early_leave_minutes = 0;
    let mut overtime_minutes = 0;
    let mut actual_minutes = 0;
    if let Some(out) = check_out_at {
        let early_bound = window.end - Duration::minutes(schedule.early_grace_minutes as i64);
        early_leave_minutes = positive_minutes(out, early_bound);
        actual_minutes = (positive_minutes(check_in_at, out) - schedule.break_minutes as i64).max(0);
        // A synthetic checkout closes the day but never earns overtime.
        if !forced {
            overtime_minutes = positive_minutes(window.end, out);
        }
    }

    let check_in_status = Some(if late_minutes > 0 {
        CheckStatus::Late
    } else {
        CheckStatus::OnTime
    });
    let check_out_status = Some(if forced {
        CheckStatus::Missed
    } else if check_out_at.is_none() {
        CheckStatus::Pending
    } else if overtime_minutes > 0 {
        CheckStatus::Overtime
    } else if early_leave_minutes > 0 {
        CheckStatus::Early
    } else {
        CheckStatus::OnTime
    });

    let status = if check_out_at.is_none() {
        DayStatus::Incomplete
    } else if forced {
        DayStatus::NonCompliant
    } else if late_minutes > 0 && early_leave_minutes > 0 {
        DayStatus::LateAndEarly
    } else if late_minutes > 0 {
        // Overtime at least covering the tardiness nets out to a normal day.
        if overtime_minutes >= late_minutes {
            DayStatus::Present
        } else {
            DayStatus::Late
        }
    } else if early_leave_minutes > 0 {
        DayStatus::EarlyLeave
    } else if overtime_minutes > 0 {
        DayStatus::Overtime
    } else {
        DayStatus::Present
    };

    let mut audits = vec![audit(employee_id, day, AttendanceEventKind::CheckIn, check_in_punch)];
    if let Some(p) = checkout_punch {
        audits.push(audit(employee_id, day, AttendanceEventKind::CheckOut, p));
    }

    Reconciled::Record {
        record: AttendanceRecord {
            employee_id,
            work_date: day,
            check_in_at: Some(check_in_at),
            check_out_at,
            actual_minutes,
            late_minutes,
            early_leave_minutes,
            overtime_minutes,
            check_in_status,
            check_out_status,
            status,
            source: RecordSource::Device,
        },
        audits,
    }
}

/// Punches on a day with no planned shift: keep the raw envelope, compute
/// no lateness or overtime.
fn reconcile_no_shift(employee_id: u64, day: NaiveDate, punches: &[PunchEvent]) -> Reconciled {
    let Some(first) = punches.iter().min_by_key(|p| p.occurred_at) else {
        return Reconciled::Pending;
    };
    let last = punches
        .iter()
        .max_by_key(|p| p.occurred_at)
        .filter(|p| p.occurred_at > first.occurred_at);

    let mut audits = vec![audit(employee_id, day, AttendanceEventKind::CheckIn, first)];
    if let Some(p) = last {
        audits.push(audit(employee_id, day, AttendanceEventKind::CheckOut, p));
    }

    Reconciled::Record {
        record: AttendanceRecord {
            employee_id,
            work_date: day,
            check_in_at: Some(first.occurred_at),
            check_out_at: last.map(|p| p.occurred_at),
            actual_minutes: 0,
            late_minutes: 0,
            early_leave_minutes: 0,
            overtime_minutes: 0,
            check_in_status: None,
            check_out_status: None,
            status: DayStatus::NoShift,
            source: RecordSource::Device,
        },
        audits,
    }
}

fn audit(
    employee_id: u64,
    day: NaiveDate,
    kind: AttendanceEventKind,
    punch: &PunchEvent,
) -> AttendanceEvent {
    AttendanceEvent {
        employee_id,
        work_date: day,
        kind,
        punch_epoch: punch.epoch,
        punched_at: punch.occurred_at,
        device_id: punch.device_id.clone(),
    }
}

/// Whole minutes from `from` to `to`, clamped at zero.
fn positive_minutes(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_minutes().max(0)
}
