use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Raw time-clock punch as ingested from a physical device.
///
/// Rows are append-only and immutable. `epoch` is assigned by the ingestion
/// layer in arrival order and is the unit of reconciliation progress;
/// `occurred_at` (UTC) may arrive out of order across devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PunchEvent {
    pub id: u64,
    pub device_id: String,
    pub device_user_code: String,
    pub occurred_at: NaiveDateTime,
    pub epoch: i64,
}
