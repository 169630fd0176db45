use crate::api::attendance::{RecordQuery, RecordListResponse};
use crate::model::attendance::{
    AttendanceEventKind, AttendanceRecordRow, CheckStatus, DayStatus, RecordSource,
};
use crate::models::{BackfillRequest, DevicePair, RunSummary};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Reconciliation Engine API",
        version = "1.0.0",
        description = r#"
## Attendance Reconciliation Engine

Turns raw time-clock punches from physical devices into derived attendance
records: check-in/check-out instants, lateness, early-leave and overtime
minutes, and a per-day status.

### 🔹 Key Features
- **Watermark-driven batch runs**
  - Incremental, crash-safe processing of newly ingested punch events
- **Targeted backfill**
  - Reprocess an explicit device/user scope or time range without touching the watermark
- **Overnight shifts**
  - Punches crossing midnight land on the shift's start day
- **Manual-adjustment safety**
  - A day corrected by a human is never overwritten by automatic runs

### 📦 Response Format
- JSON-based RESTful responses
- Pagination supported for list endpoints

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::reconcile::run_now,
        crate::api::reconcile::backfill,
        crate::api::reconcile::watermark,

        crate::api::attendance::list_records,
    ),
    components(
        schemas(
            BackfillRequest,
            DevicePair,
            RunSummary,
            RecordQuery,
            RecordListResponse,
            AttendanceRecordRow,
            DayStatus,
            CheckStatus,
            RecordSource,
            AttendanceEventKind
        )
    ),
    tags(
        (name = "Reconciliation", description = "Batch run and backfill entry points"),
        (name = "Attendance", description = "Derived attendance record reads"),
    )
)]
pub struct ApiDoc;
