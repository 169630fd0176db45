use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::MySqlPool;
use tracing::warn;

use crate::model::attendance::{AttendanceEvent, AttendanceRecord};
use crate::model::device_mapping::{DeviceKey, DeviceUserMapping};
use crate::model::punch_event::PunchEvent;
use crate::model::shift_schedule::ShiftSchedule;

/// Key of the engine's cursor in the watermark table.
pub const WATERMARK_NAME: &str = "punch_reconciliation";

/// Read the durable watermark. Missing means zero (never ran); an
/// unparseable stored value is also treated as zero, which only causes
/// idempotent reprocessing, never corruption.
pub async fn load_watermark(pool: &MySqlPool) -> Result<i64> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT value FROM reconcile_watermark WHERE name = ?")
            .bind(WATERMARK_NAME)
            .fetch_optional(pool)
            .await
            .context("failed to read watermark")?;

    Ok(match row {
        None => 0,
        Some((raw,)) => match raw.trim().parse::<i64>() {
            Ok(epoch) => epoch,
            Err(_) => {
                warn!(value = %raw, "unparseable watermark, reprocessing from epoch 0");
                0
            }
        },
    })
}

pub async fn save_watermark(pool: &MySqlPool, epoch: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO reconcile_watermark (name, value)
        VALUES (?, ?)
        ON DUPLICATE KEY UPDATE value = VALUES(value)
        "#,
    )
    .bind(WATERMARK_NAME)
    .bind(epoch.to_string())
    .execute(pool)
    .await
    .context("failed to save watermark")?;
    Ok(())
}

/// Next slice of unprocessed punches, ascending by epoch.
pub async fn fetch_events_after(
    pool: &MySqlPool,
    epoch: i64,
    limit: u32,
) -> Result<Vec<PunchEvent>> {
    sqlx::query_as::<_, PunchEvent>(
        r#"
        SELECT id, device_id, device_user_code, occurred_at, epoch
        FROM punch_events
        WHERE epoch > ?
        ORDER BY epoch ASC
        LIMIT ?
        "#,
    )
    .bind(epoch)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to fetch punch events")
}

/// Punches for a backfill scope: optional device/user pairs, optional UTC
/// range, paged by an epoch cursor exactly like the main loop.
pub async fn fetch_events_scoped(
    pool: &MySqlPool,
    pairs: &[DeviceKey],
    from: Option<NaiveDateTime>,
    to: Option<NaiveDateTime>,
    after_epoch: i64,
    limit: u32,
) -> Result<Vec<PunchEvent>> {
    let mut conditions = vec!["epoch > ?".to_string()];
    if !pairs.is_empty() {
        let ors = pairs
            .iter()
            .map(|_| "(device_id = ? AND device_user_code = ?)")
            .collect::<Vec<_>>()
            .join(" OR ");
        conditions.push(format!("({})", ors));
    }
    if from.is_some() {
        conditions.push("occurred_at >= ?".to_string());
    }
    if to.is_some() {
        conditions.push("occurred_at < ?".to_string());
    }

    let sql = format!(
        "SELECT id, device_id, device_user_code, occurred_at, epoch \
         FROM punch_events WHERE {} ORDER BY epoch ASC LIMIT ?",
        conditions.join(" AND ")
    );

    let mut query = sqlx::query_as::<_, PunchEvent>(&sql).bind(after_epoch);
    for (device_id, code) in pairs {
        query = query.bind(device_id).bind(code);
    }
    if let Some(from) = from {
        query = query.bind(from);
    }
    if let Some(to) = to {
        query = query.bind(to);
    }

    query
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("failed to fetch scoped punch events")
}

/// All active device keys for the given employees. Used to widen a batch's
/// history fetch to each employee's full device footprint, so a check-in on
/// one device still pairs with a check-out on another.
pub async fn fetch_mappings_for_employees(
    pool: &MySqlPool,
    employee_ids: &[u64],
) -> Result<Vec<DeviceUserMapping>> {
    if employee_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; employee_ids.len()].join(", ");
    let sql = format!(
        "SELECT id, device_id, device_user_code, employee_id, is_active \
         FROM device_user_mappings \
         WHERE is_active = 1 AND employee_id IN ({})",
        placeholders
    );

    let mut query = sqlx::query_as::<_, DeviceUserMapping>(&sql);
    for id in employee_ids {
        query = query.bind(id);
    }

    query
        .fetch_all(pool)
        .await
        .context("failed to fetch employee device mappings")
}

/// Every punch for the given device keys in `[from, to)`, with no epoch
/// bound: reconciliation must always see a day's complete punch set, not
/// just the slice that happened to arrive in the current batch.
pub async fn fetch_events_for_pairs(
    pool: &MySqlPool,
    pairs: &[DeviceKey],
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> Result<Vec<PunchEvent>> {
    if pairs.is_empty() {
        return Ok(Vec::new());
    }

    let ors = pairs
        .iter()
        .map(|_| "(device_id = ? AND device_user_code = ?)")
        .collect::<Vec<_>>()
        .join(" OR ");
    let sql = format!(
        "SELECT id, device_id, device_user_code, occurred_at, epoch \
         FROM punch_events \
         WHERE ({}) AND occurred_at >= ? AND occurred_at < ? \
         ORDER BY epoch ASC",
        ors
    );

    let mut query = sqlx::query_as::<_, PunchEvent>(&sql);
    for (device_id, code) in pairs {
        query = query.bind(device_id).bind(code);
    }

    query
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .context("failed to fetch punch history")
}

/// Mapping behind a device key, active rows only.
pub async fn find_active_mapping(
    pool: &MySqlPool,
    device_id: &str,
    device_user_code: &str,
) -> Result<Option<DeviceUserMapping>> {
    sqlx::query_as::<_, DeviceUserMapping>(
        r#"
        SELECT id, device_id, device_user_code, employee_id, is_active
        FROM device_user_mappings
        WHERE device_id = ? AND device_user_code = ? AND is_active = 1
        "#,
    )
    .bind(device_id)
    .bind(device_user_code)
    .fetch_optional(pool)
    .await
    .context("failed to look up device mapping")
}

/// All schedules for the given employees in `[from, to]`, keyed for the
/// planner.
pub async fn fetch_schedules(
    pool: &MySqlPool,
    employee_ids: &[u64],
    from: NaiveDate,
    to: NaiveDate,
) -> Result<HashMap<(u64, NaiveDate), ShiftSchedule>> {
    if employee_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = vec!["?"; employee_ids.len()].join(", ");
    let sql = format!(
        "SELECT id, employee_id, work_date, start_time, end_time, \
                break_minutes, late_grace_minutes, early_grace_minutes \
         FROM shift_schedules \
         WHERE employee_id IN ({}) AND work_date BETWEEN ? AND ?",
        placeholders
    );

    let mut query = sqlx::query_as::<_, ShiftSchedule>(&sql);
    for id in employee_ids {
        query = query.bind(id);
    }

    let rows = query
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .context("failed to fetch shift schedules")?;

    Ok(rows
        .into_iter()
        .map(|s| ((s.employee_id, s.work_date), s))
        .collect())
}

/// Days in `[from, to]` a human has already corrected; the planner skips
/// these buckets entirely.
pub async fn load_adjusted_keys(
    pool: &MySqlPool,
    employee_ids: &[u64],
    from: NaiveDate,
    to: NaiveDate,
) -> Result<HashSet<(u64, NaiveDate)>> {
    if employee_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let placeholders = vec!["?"; employee_ids.len()].join(", ");
    let sql = format!(
        "SELECT employee_id, work_date FROM attendance_records \
         WHERE is_adjusted = 1 AND employee_id IN ({}) AND work_date BETWEEN ? AND ?",
        placeholders
    );

    let mut query = sqlx::query_as::<_, (u64, NaiveDate)>(&sql);
    for id in employee_ids {
        query = query.bind(id);
    }

    let rows = query
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .context("failed to fetch adjusted days")?;

    Ok(rows.into_iter().collect())
}

/// Write one record and its audit rows in a single transaction.
///
/// Both writes are keyed upserts, so replaying the same bucket converges
/// to identical state. The record upsert additionally refuses field
/// updates at the SQL level when `is_adjusted` was set between planning
/// and persistence.
pub async fn persist_bucket(
    pool: &MySqlPool,
    record: &AttendanceRecord,
    audits: &[AttendanceEvent],
) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to open transaction")?;

    sqlx::query(
        r#"
        INSERT INTO attendance_records
            (employee_id, work_date, check_in_at, check_out_at,
             actual_minutes, late_minutes, early_leave_minutes, overtime_minutes,
             check_in_status, check_out_status, status, source, is_adjusted)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
        ON DUPLICATE KEY UPDATE
            check_in_at         = IF(is_adjusted, check_in_at, VALUES(check_in_at)),
            check_out_at        = IF(is_adjusted, check_out_at, VALUES(check_out_at)),
            actual_minutes      = IF(is_adjusted, actual_minutes, VALUES(actual_minutes)),
            late_minutes        = IF(is_adjusted, late_minutes, VALUES(late_minutes)),
            early_leave_minutes = IF(is_adjusted, early_leave_minutes, VALUES(early_leave_minutes)),
            overtime_minutes    = IF(is_adjusted, overtime_minutes, VALUES(overtime_minutes)),
            check_in_status     = IF(is_adjusted, check_in_status, VALUES(check_in_status)),
            check_out_status    = IF(is_adjusted, check_out_status, VALUES(check_out_status)),
            status              = IF(is_adjusted, status, VALUES(status)),
            source              = IF(is_adjusted, source, VALUES(source))
        "#,
    )
    .bind(record.employee_id)
    .bind(record.work_date)
    .bind(record.check_in_at)
    .bind(record.check_out_at)
    .bind(record.actual_minutes)
    .bind(record.late_minutes)
    .bind(record.early_leave_minutes)
    .bind(record.overtime_minutes)
    .bind(record.check_in_status.map(|s| s.to_string()))
    .bind(record.check_out_status.map(|s| s.to_string()))
    .bind(record.status.to_string())
    .bind(record.source.to_string())
    .execute(&mut *tx)
    .await
    .context("failed to upsert attendance record")?;

    for audit in audits {
        sqlx::query(
            r#"
            INSERT INTO attendance_events
                (employee_id, work_date, kind, punch_epoch, punched_at, device_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                punch_epoch = VALUES(punch_epoch),
                punched_at  = VALUES(punched_at),
                device_id   = VALUES(device_id)
            "#,
        )
        .bind(audit.employee_id)
        .bind(audit.work_date)
        .bind(audit.kind.to_string())
        .bind(audit.punch_epoch)
        .bind(audit.punched_at)
        .bind(&audit.device_id)
        .execute(&mut *tx)
        .await
        .context("failed to upsert attendance event")?;
    }

    tx.commit().await.context("failed to commit bucket")?;
    Ok(())
}
