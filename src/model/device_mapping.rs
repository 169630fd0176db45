use serde::{Deserialize, Serialize};

/// Key identifying a device-local user: (device id, device-local user code).
pub type DeviceKey = (String, String);

/// Mapping from a device-local user code to an employee.
///
/// Maintained by an external admin tool. Many-to-one; deactivated mappings
/// are kept (soft-disabled) but the engine only ever reads active ones.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceUserMapping {
    pub id: u64,
    pub device_id: String,
    pub device_user_code: String,
    pub employee_id: u64,
    pub is_active: bool,
}
