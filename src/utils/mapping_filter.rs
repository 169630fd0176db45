use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Expected capacity and false-positive rate.
/// Tune these based on real device-user counts.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static MAPPING_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

/// Until warmup has completed the filter answers "maybe" for everything,
/// so batch runs started early fall through to the database instead of
/// wrongly skipping punches as unmapped.
static FILTER_READY: AtomicBool = AtomicBool::new(false);

#[inline]
fn filter_key(device_id: &str, device_user_code: &str) -> String {
    format!("{}\u{1f}{}", device_id, device_user_code)
}

/// Check if a device key might have an active mapping (false positives
/// possible, false negatives only after a completed warmup).
pub fn might_exist(device_id: &str, device_user_code: &str) -> bool {
    if !FILTER_READY.load(Ordering::Acquire) {
        return true;
    }
    MAPPING_FILTER
        .read()
        .expect("mapping filter poisoned")
        .contains(&filter_key(device_id, device_user_code))
}

/// Insert a single device key into the filter
pub fn insert(device_id: &str, device_user_code: &str) {
    MAPPING_FILTER
        .write()
        .expect("mapping filter poisoned")
        .add(&filter_key(device_id, device_user_code));
}

/// Warm up the mapping filter using streaming + batching
pub async fn warmup_mapping_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String, String)>(
        "SELECT device_id, device_user_code FROM device_user_mappings WHERE is_active = 1",
    )
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (device_id, code) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        batch.push(filter_key(&device_id, &code));
        total += 1;

        if batch.len() == batch_size {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    FILTER_READY.store(true, Ordering::Release);
    log::info!("Mapping filter warmup complete: {} active mappings", total);
    Ok(())
}

/// Insert a batch of pre-built filter keys
fn insert_batch(keys: &[String]) {
    let mut filter = MAPPING_FILTER.write().expect("mapping filter poisoned");

    for key in keys {
        filter.add(key);
    }
}
