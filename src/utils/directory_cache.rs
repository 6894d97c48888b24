use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::model::profile::Profile;

/// In-memory user directory keyed by lowercased email. Backs the punch
/// lookup and the batch-page labels without a round trip per scan.
pub static DIRECTORY_CACHE: Lazy<Cache<String, Profile>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000)
        .time_to_live(Duration::from_secs(86400)) // 24h TTL
        .build()
});

pub async fn remember(profile: Profile) {
    DIRECTORY_CACHE
        .insert(profile.email.to_lowercase(), profile)
        .await;
}

pub async fn get(email: &str) -> Option<Profile> {
    DIRECTORY_CACHE.get(&email.to_lowercase()).await
}

pub async fn forget(email: &str) {
    DIRECTORY_CACHE.invalidate(&email.to_lowercase()).await;
}

async fn remember_batch(profiles: Vec<Profile>) {
    let futures: Vec<_> = profiles
        .into_iter()
        .map(|p| DIRECTORY_CACHE.insert(p.email.to_lowercase(), p))
        .collect();

    futures::future::join_all(futures).await;
}

/// Stream the whole directory into the cache in batches at startup.
pub async fn warmup_directory_cache(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, Profile>(
        r#"
        SELECT id, name, class_id, seat_no, email, student_id
        FROM profiles
        "#,
    )
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total_count = 0usize;

    while let Some(row) = stream.next().await {
        batch.push(row?);
        total_count += 1;

        if batch.len() >= batch_size {
            remember_batch(std::mem::take(&mut batch)).await;
        }
    }

    if !batch.is_empty() {
        remember_batch(batch).await;
    }

    log::info!("Directory cache warmup complete: {} profiles", total_count);

    Ok(())
}
