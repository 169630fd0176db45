use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

/// (device id, device-local user code) -> employee id, active mappings only.
pub static MAPPING_CACHE: Lazy<Cache<String, u64>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(500_000) // tune based on memory
        .time_to_live(Duration::from_secs(86400)) // 24h TTL
        .build()
});

#[inline]
fn cache_key(device_id: &str, device_user_code: &str) -> String {
    format!("{}\u{1f}{}", device_id, device_user_code)
}

/// Cache a resolved mapping
pub async fn put(device_id: &str, device_user_code: &str, employee_id: u64) {
    MAPPING_CACHE
        .insert(cache_key(device_id, device_user_code), employee_id)
        .await;
}

/// Look up a cached mapping
pub async fn get(device_id: &str, device_user_code: &str) -> Option<u64> {
    MAPPING_CACHE.get(&cache_key(device_id, device_user_code)).await
}

/// Batch insert resolved mappings
async fn batch_put(rows: &[(String, String, u64)]) {
    let futures: Vec<_> = rows
        .iter()
        .map(|(device_id, code, employee_id)| {
            MAPPING_CACHE.insert(cache_key(device_id, code), *employee_id)
        })
        .collect();

    // Await all insertions concurrently
    futures::future::join_all(futures).await;
}

/// Load all active device mappings into the in-memory cache (batched)
pub async fn warmup_mapping_cache(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String, String, u64)>(
        r#"
        SELECT device_id, device_user_code, employee_id
        FROM device_user_mappings
        WHERE is_active = 1
        "#,
    )
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total_count = 0usize;

    while let Some(row) = stream.next().await {
        let row = row?;
        batch.push(row);
        total_count += 1;

        if batch.len() >= batch_size {
            batch_put(&batch).await;
            batch.clear();
        }
    }

    // Insert any remaining mappings
    if !batch.is_empty() {
        batch_put(&batch).await;
    }

    log::info!(
        "Mapping cache warmup complete: {} active mappings",
        total_count
    );

    Ok(())
}
