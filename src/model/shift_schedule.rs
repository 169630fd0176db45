use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Planned shift for one employee on one calendar day.
///
/// Times are wall-clock in the organizational time zone. `end_time` less
/// than or equal to `start_time` means the shift ends on the next calendar
/// day (overnight shift). At most one schedule per employee per day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShiftSchedule {
    pub id: u64,
    pub employee_id: u64,
    pub work_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub break_minutes: i32,
    pub late_grace_minutes: i32,
    pub early_grace_minutes: i32,
}
