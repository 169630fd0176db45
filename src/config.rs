use crate::engine::EngineConfig;
use dotenvy::dotenv;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub server_addr: String,

    // Reconciliation knobs
    pub utc_offset_minutes: i32,
    pub batch_size: u32,
    pub check_in_buffer_minutes: i64,
    pub auto_checkout_allowance_hours: i64,
    pub next_shift_guard_hours: i64,

    // Rate limiting
    pub rate_reconcile_per_min: u32,
    pub rate_query_per_min: u32,

    pub api_prefix: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            server_addr: env::var("SERVER_ADDR").expect("SERVER_ADDR must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),

            utc_offset_minutes: env::var("UTC_OFFSET_MINUTES")
                .unwrap_or_else(|_| "360".to_string()) // default UTC+6
                .parse()
                .unwrap(),
            batch_size: env::var("BATCH_SIZE")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap(),
            check_in_buffer_minutes: env::var("CHECK_IN_BUFFER_MINUTES")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap(),
            auto_checkout_allowance_hours: env::var("AUTO_CHECKOUT_ALLOWANCE_HOURS")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .unwrap(),
            next_shift_guard_hours: env::var("NEXT_SHIFT_GUARD_HOURS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap(),

            rate_reconcile_per_min: env::var("RATE_RECONCILE_PER_MIN")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap(),
            rate_query_per_min: env::var("RATE_QUERY_PER_MIN")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap(),

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api/v1".to_string()),
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            utc_offset_minutes: self.utc_offset_minutes,
            check_in_buffer_minutes: self.check_in_buffer_minutes,
            auto_checkout_allowance_hours: self.auto_checkout_allowance_hours,
            next_shift_guard_hours: self.next_shift_guard_hours,
            batch_size: self.batch_size,
        }
    }
}
