pub mod attendance;
pub mod reconcile;
