//! Cache Probe - inspects values written by the typed cache client
//!
//! With key arguments, prints the frame header and decoded value of each key.
//! Without arguments, writes a sliding value under a random key, reads it
//! back and removes it.

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use typed_cache::{CacheClient, CacheConfig, CacheValue, Expiration, TypeRegistry};

/// Main entry point for the cache probe.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect to the configured Redis server
/// 4. Inspect the given keys, or run the round-trip check
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "typed_cache=info,cache_probe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: redis_url={}, compression_threshold={}, compression_level={}",
        config.redis_url, config.compression_threshold, config.compression_level
    );

    let client = CacheClient::from_config(&config, TypeRegistry::new())
        .context("Failed to create cache client")?;
    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", config.redis_url))?;

    let keys: Vec<String> = std::env::args().skip(1).collect();
    let outcome = if keys.is_empty() {
        round_trip(&client).await
    } else {
        inspect(&client, &keys).await
    };

    client.close().await.context("Failed to close cache client")?;
    outcome
}

/// Prints the header and value of every key.
async fn inspect(client: &CacheClient, keys: &[String]) -> anyhow::Result<()> {
    for key in keys {
        let Some(bytes) = client.get_raw(key).await? else {
            println!("{key}: <missing>");
            continue;
        };

        let info = client
            .codec()
            .describe(&bytes)
            .with_context(|| format!("Key {key} does not hold a cache frame"))?;
        println!(
            "{key}: type={} compressed={} sliding={:?} stored={}B frame={}B",
            info.tag, info.compressed, info.sliding, info.stored_len, info.frame_len
        );

        match client.codec().decode(&bytes) {
            Ok(decoded) => println!("  value: {:?}", decoded.value),
            Err(error) => warn!(key = %key, error = %error, "Unable to decode value"),
        }
    }
    Ok(())
}

/// Writes, reads back and removes a probe value.
async fn round_trip(client: &CacheClient) -> anyhow::Result<()> {
    let key = format!("cache-probe:{}", Uuid::new_v4());
    let value = format!("probe written at {}", chrono::Utc::now().to_rfc3339());

    client
        .set(&key, value.clone(), Expiration::sliding_millis(30_000))
        .await
        .context("Failed to write probe value")?;
    client.flush().await;

    let read = client.get(&key).await.context("Failed to read probe value")?;
    if read != Some(CacheValue::String(value)) {
        bail!("Probe value under {key} did not round-trip: {read:?}");
    }

    client.remove(&key).await?;
    client.flush().await;

    let stats = client.stats();
    if stats.failed_commands > 0 {
        bail!("{} background commands failed", stats.failed_commands);
    }
    info!(key = %key, stats = %serde_json::to_string(&stats)?, "Round trip succeeded");
    println!("ok");
    Ok(())
}
