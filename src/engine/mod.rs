pub mod batch;
pub mod grouping;
pub mod reconcile;
pub mod store;
pub mod window;

use chrono::FixedOffset;

/// Tunables for the reconciliation engine. All derived from env config;
/// kept as a plain value so the pure parts of the engine stay free of any
/// process-level state.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Fixed organizational UTC offset in minutes. Calendar-day assignment
    /// must never depend on the process-local time zone.
    pub utc_offset_minutes: i32,
    /// How far before the planned shift start a punch still counts as that
    /// day's check-in candidate.
    pub check_in_buffer_minutes: i64,
    /// How long after shift end an employee who forgot to punch out keeps
    /// the day open before it is force-closed.
    pub auto_checkout_allowance_hours: i64,
    /// A forced checkout may never run into the next shift; it is capped at
    /// next-day shift start minus this buffer.
    pub next_shift_guard_hours: i64,
    /// Max punch events fetched per batch iteration.
    pub batch_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            check_in_buffer_minutes: 60,
            auto_checkout_allowance_hours: 8,
            next_shift_guard_hours: 2,
            batch_size: 500,
        }
    }
}

impl EngineConfig {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }
}
