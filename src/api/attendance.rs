use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::model::attendance::AttendanceRecordRow;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employee_id: Option<u64>,
    #[schema(value_type = String, format = "date", nullable = true)]
    pub from: Option<NaiveDate>,
    #[schema(value_type = String, format = "date", nullable = true)]
    pub to: Option<NaiveDate>,
    pub status: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RecordListResponse {
    pub data: Vec<AttendanceRecordRow>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 312)]
    pub total: i64,
}

/// List derived attendance records
#[utoipa::path(
    get,
    path = "/api/v1/attendance",
    params(
        ("page", Query, description = "Page number"),
        ("per_page", Query, description = "Items per page"),
        ("employee_id", Query, description = "Filter by employee"),
        ("from", Query, description = "Work date lower bound (inclusive)"),
        ("to", Query, description = "Work date upper bound (inclusive)"),
        ("status", Query, description = "Filter by day status, e.g. LATE")
    ),
    responses(
        (status = 200, description = "Paginated attendance records", body = RecordListResponse)
    ),
    tag = "Attendance"
)]
pub async fn list_records(
    pool: web::Data<MySqlPool>,
    query: web::Query<RecordQuery>,
) -> actix_web::Result<impl Responder> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    // ---------- build WHERE clause dynamically ----------
    let mut conditions = Vec::new();

    if query.employee_id.is_some() {
        conditions.push("employee_id = ?");
    }
    if query.from.is_some() {
        conditions.push("work_date >= ?");
    }
    if query.to.is_some() {
        conditions.push("work_date <= ?");
    }
    if query.status.is_some() {
        conditions.push("status = ?");
    }

    let where_clause = if conditions.is_empty() {
        "".to_string()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    // ---------- total count ----------
    let count_sql = format!(
        "SELECT COUNT(*) as total FROM attendance_records {}",
        where_clause
    );
    debug!(sql = %count_sql, "Counting attendance records");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(employee_id) = query.employee_id {
        count_query = count_query.bind(employee_id);
    }
    if let Some(from) = query.from {
        count_query = count_query.bind(from);
    }
    if let Some(to) = query.to {
        count_query = count_query.bind(to);
    }
    if let Some(status) = &query.status {
        count_query = count_query.bind(status);
    }

    let total = count_query.fetch_one(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %count_sql, "Failed to count attendance records");
        ErrorInternalServerError("Database error")
    })?;

    // ---------- data query ----------
    let data_sql = format!(
        "SELECT * FROM attendance_records {} ORDER BY work_date DESC, employee_id ASC LIMIT ? OFFSET ?",
        where_clause
    );
    debug!(sql = %data_sql, page, per_page, offset, "Fetching attendance records");

    let mut data_query = sqlx::query_as::<_, AttendanceRecordRow>(&data_sql);
    if let Some(employee_id) = query.employee_id {
        data_query = data_query.bind(employee_id);
    }
    if let Some(from) = query.from {
        data_query = data_query.bind(from);
    }
    if let Some(to) = query.to {
        data_query = data_query.bind(to);
    }
    if let Some(status) = &query.status {
        data_query = data_query.bind(status);
    }
    data_query = data_query.bind(per_page as i64).bind(offset as i64);

    let records = data_query.fetch_all(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %data_sql, "Failed to fetch attendance records");
        ErrorInternalServerError("Database error")
    })?;

    Ok(HttpResponse::Ok().json(RecordListResponse {
        data: records,
        page,
        per_page,
        total,
    }))
}
