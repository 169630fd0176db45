use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use serde_json::json;
use sqlx::MySqlPool;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;
use crate::engine::{batch, store};
use crate::models::{BackfillRequest, RunSummary};

/// Run lock for the watermark loop. The engine itself does not detect
/// concurrent runs; this caller-side flag is what guarantees at most one
/// loop per process.
static RUN_ACTIVE: AtomicBool = AtomicBool::new(false);

struct RunGuard;

impl Drop for RunGuard {
    fn drop(&mut self) {
        RUN_ACTIVE.store(false, Ordering::Release);
    }
}

/// Drain all punch events past the current watermark
#[utoipa::path(
    post,
    path = "/api/v1/reconcile/run",
    responses(
        (status = 200, description = "Run completed", body = RunSummary),
        (status = 409, description = "Another run is in progress", body = Object, example = json!({
            "message": "A reconciliation run is already in progress"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Reconciliation"
)]
pub async fn run_now(
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    if RUN_ACTIVE
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Ok(HttpResponse::Conflict().json(json!({
            "message": "A reconciliation run is already in progress"
        })));
    }
    let _guard = RunGuard;

    let summary = batch::run_batch_loop(pool.get_ref(), &config.engine())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Reconciliation run failed");
            ErrorInternalServerError("Internal Server Error")
        })?;

    Ok(HttpResponse::Ok().json(summary))
}

/// Reprocess an explicit device/user and/or time scope
#[utoipa::path(
    post,
    path = "/api/v1/reconcile/backfill",
    request_body = BackfillRequest,
    responses(
        (status = 200, description = "Backfill completed", body = RunSummary),
        (status = 400, description = "Empty scope", body = Object, example = json!({
            "message": "Backfill needs device pairs or a time range"
        })),
        (status = 409, description = "Another run is in progress"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Reconciliation"
)]
pub async fn backfill(
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<BackfillRequest>,
) -> actix_web::Result<impl Responder> {
    // Refuse an unbounded rescan of the whole punch log.
    if payload.pairs.is_empty() && payload.from.is_none() && payload.to.is_none() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Backfill needs device pairs or a time range"
        })));
    }

    if RUN_ACTIVE
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Ok(HttpResponse::Conflict().json(json!({
            "message": "A reconciliation run is already in progress"
        })));
    }
    let _guard = RunGuard;

    let pairs: Vec<(String, String)> = payload
        .pairs
        .iter()
        .map(|p| (p.device_id.clone(), p.device_user_code.clone()))
        .collect();

    let summary = batch::run_backfill(
        pool.get_ref(),
        &config.engine(),
        &pairs,
        payload.from,
        payload.to,
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Backfill failed");
        ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok().json(summary))
}

/// Current durable watermark
#[utoipa::path(
    get,
    path = "/api/v1/reconcile/watermark",
    responses(
        (status = 200, description = "Current watermark", body = Object, example = json!({
            "epoch": 90250
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Reconciliation"
)]
pub async fn watermark(pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    let epoch = store::load_watermark(pool.get_ref()).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to read watermark");
        ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok().json(json!({ "epoch": epoch })))
}
