use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One (device, device-local user) pair, as used by the backfill endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DevicePair {
    #[schema(example = "GATE-2")]
    pub device_id: String,
    #[schema(example = "1017")]
    pub device_user_code: String,
}

/// Scope for a targeted re-run: explicit pairs and/or an absolute UTC range.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BackfillRequest {
    pub pairs: Vec<DevicePair>,
    #[schema(example = "2026-03-01T00:00:00", value_type = String, nullable = true)]
    pub from: Option<NaiveDateTime>,
    #[schema(example = "2026-03-08T00:00:00", value_type = String, nullable = true)]
    pub to: Option<NaiveDateTime>,
}

/// Operational counters for one reconciliation run (batch or backfill).
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct RunSummary {
    #[schema(example = 3)]
    pub batches: u32,
    #[schema(example = 1250)]
    pub events_seen: u64,
    /// Events whose (device, user code) had no active mapping. Non-fatal.
    #[schema(example = 4)]
    pub skipped_no_mapping: u64,
    /// Buckets left alone because a human already corrected that day.
    #[schema(example = 1)]
    pub skipped_adjusted: u64,
    /// Buckets with too little data to decide; a later run completes them.
    #[schema(example = 2)]
    pub pending_buckets: u64,
    #[schema(example = 310)]
    pub records_written: u64,
    #[schema(example = 90250)]
    pub final_watermark: i64,
}
