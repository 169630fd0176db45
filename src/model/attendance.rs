use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

/// Aggregate classification of one employee-day, persisted as a string.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DayStatus {
    Present,
    Late,
    EarlyLeave,
    LateAndEarly,
    Overtime,
    Incomplete,
    NonCompliant,
    Absent,
    NoShift,
}

/// Status of a single derived check-in or check-out.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    OnTime,
    Late,
    Early,
    Overtime,
    Pending,
    Missed,
}

/// Where a record's values came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordSource {
    Device,
    Manual,
    Web,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceEventKind {
    CheckIn,
    CheckOut,
}

/// Reconciliation output for one `(employee, day)`.
///
/// The adjustment fields (`is_adjusted`, adjuster identity/time/note) live
/// only in storage: the engine never writes them, and never touches a row
/// where `is_adjusted` is already set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub employee_id: u64,
    pub work_date: NaiveDate,
    pub check_in_at: Option<NaiveDateTime>,
    pub check_out_at: Option<NaiveDateTime>,
    pub actual_minutes: i64,
    pub late_minutes: i64,
    pub early_leave_minutes: i64,
    pub overtime_minutes: i64,
    pub check_in_status: Option<CheckStatus>,
    pub check_out_status: Option<CheckStatus>,
    pub status: DayStatus,
    pub source: RecordSource,
}

/// Audit row tying a derived check-in/check-out back to the punch that
/// produced it. Keyed on `(employee_id, work_date, kind)` so re-deriving
/// the same result is a no-op write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub employee_id: u64,
    pub work_date: NaiveDate,
    pub kind: AttendanceEventKind,
    pub punch_epoch: i64,
    pub punched_at: NaiveDateTime,
    pub device_id: String,
}

/// Stored attendance record as read back for listings. Statuses come back
/// as the strings the engine persisted.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecordRow {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 42)]
    pub employee_id: u64,
    #[schema(example = "2026-03-02", value_type = String, format = "date")]
    pub work_date: NaiveDate,
    #[schema(example = "2026-03-02T02:05:00", value_type = String, nullable = true)]
    pub check_in_at: Option<NaiveDateTime>,
    #[schema(example = "2026-03-02T11:10:00", value_type = String, nullable = true)]
    pub check_out_at: Option<NaiveDateTime>,
    pub actual_minutes: i64,
    pub late_minutes: i64,
    pub early_leave_minutes: i64,
    pub overtime_minutes: i64,
    #[schema(example = "LATE", nullable = true)]
    pub check_in_status: Option<String>,
    #[schema(example = "ON_TIME", nullable = true)]
    pub check_out_status: Option<String>,
    #[schema(example = "PRESENT")]
    pub status: String,
    #[schema(example = "DEVICE")]
    pub source: String,
    pub is_adjusted: bool,
    #[schema(nullable = true)]
    pub adjusted_by: Option<u64>,
    #[schema(value_type = String, nullable = true)]
    pub adjusted_at: Option<NaiveDateTime>,
    #[schema(nullable = true)]
    pub adjustment_note: Option<String>,
}
