use memocache::{Cached, FsStore, MemoryStore, Memoized, MultiStore, ReadOptions, Ttl};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const CACHE_DURATION_SECS: u64 = 5;
const LOAD_DELAY_MS: u64 = 100;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let dir = std::env::temp_dir().join("memocache-demo");
    let report = Cached::on_disk(dir.join("report"), Ttl::from_secs(CACHE_DURATION_SECS), || async {
        tokio::time::sleep(Duration::from_millis(LOAD_DELAY_MS)).await;
        Ok::<_, std::io::Error>(format!("report built at {:?}", std::time::SystemTime::now()))
    });

    println!("Loading report (run twice within {CACHE_DURATION_SECS}s to see the disk cache)...");
    let value = report.get().await.trace_cache_error()?;
    println!("Got: {}", value);

    println!("Loading report again (should be cached)...");
    let value = report.get().await.trace_cache_error()?;
    println!("Got: {}", value);

    println!("Forcing a refresh...");
    let value = report.call(ReadOptions::force_refresh()).await.trace_cache_error()?;
    println!("Got: {}", value);

    let stores = MultiStore::new(Duration::from_secs(CACHE_DURATION_SECS))
        .with_store(Arc::new(MemoryStore::new()))
        .with_store(Arc::new(FsStore::new(dir.join("values"), true)));

    let (shutdown, signal) = watch::channel(false);
    let lookup = Memoized::builder(Ttl::from_secs(CACHE_DURATION_SECS))
        .store(Arc::new(stores))
        .key_prefix("value-")
        .eviction(Duration::from_secs(1), signal)
        .build(|key: i32| async move {
            tokio::time::sleep(Duration::from_millis(LOAD_DELAY_MS)).await;
            Ok::<_, std::io::Error>(format!("Value for key: {}", key))
        });

    println!("Testing multiple keys:");
    for key in [10, 20, 30, 10] {
        let value = lookup.get(key).await.trace_cache_error()?;
        println!("  {key} -> {value}");
    }
    println!("Cached inputs: {}", lookup.len());

    shutdown.send(true)?;
    Ok(())
}
