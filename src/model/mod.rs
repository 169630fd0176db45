pub mod attendance;
pub mod device_mapping;
pub mod punch_event;
pub mod shift_schedule;
