//! Integration tests for the Redis store.
//!
//! These tests need a running Redis server and are ignored by default:
//!
//! ```text
//! REDIS_URL=redis://localhost:6379 cargo test -p jobwatch-store -- --ignored
//! ```
//!
//! ISOLATION: each test writes under its own namespace so parallel runs
//! never share keys.

use jobwatch_core::{SearchDefinition, SearchKey, SearchRepository, SeenStore};
use jobwatch_store::RedisStore;

async fn setup_store(test_name: &str) -> RedisStore {
    dotenvy::dotenv().ok();
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let namespace = format!(
        "jobwatch-test:{}:{}",
        test_name,
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );
    RedisStore::connect(&redis_url)
        .await
        .expect("Failed to connect to Redis")
        .with_namespace(&namespace)
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_seen_set_roundtrip() {
    let store = setup_store("seen_roundtrip").await;
    let key = SearchKey::from("python developer:warszawa");

    assert!(!store.has(&key, "P1").await.unwrap());
    store.mark_seen(&key, "P1").await.unwrap();
    assert!(store.has(&key, "P1").await.unwrap());
    assert!(store.first_seen(&key, "P1").await.unwrap().is_some());
    assert_eq!(store.count(&key).await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_mark_seen_twice_keeps_first_timestamp() {
    let store = setup_store("mark_twice").await;
    let key = SearchKey::from("devops engineer");

    store.mark_seen(&key, "P1").await.unwrap();
    let first = store.first_seen(&key, "P1").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    store.mark_seen(&key, "P1").await.unwrap();

    assert_eq!(store.first_seen(&key, "P1").await.unwrap(), first);
    assert_eq!(store.count(&key).await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_search_mirror_roundtrip() {
    let store = setup_store("search_mirror").await;
    let python = SearchDefinition::new("Python Developer", Some("Warszawa")).unwrap();
    let devops = SearchDefinition::new("DevOps Engineer", None).unwrap();

    store.save(&python).await.unwrap();
    store.save(&devops).await.unwrap();
    store.save(&devops).await.unwrap();

    let loaded = store.load_all().await.unwrap();
    assert_eq!(loaded, vec![devops.clone(), python.clone()]);

    assert!(store.delete(&devops.key()).await.unwrap());
    assert!(!store.delete(&devops.key()).await.unwrap());
    assert_eq!(store.load_all().await.unwrap(), vec![python]);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_removing_search_keeps_seen_set() {
    let store = setup_store("remove_keeps_seen").await;
    let search = SearchDefinition::new("Cloud Engineer", Some("Warszawa")).unwrap();

    store.save(&search).await.unwrap();
    store.mark_seen(&search.key(), "P9").await.unwrap();
    store.delete(&search.key()).await.unwrap();

    assert!(store.has(&search.key(), "P9").await.unwrap());
}

#[tokio::test]
async fn test_connect_rejects_invalid_url() {
    let result = RedisStore::connect("not a url").await;
    assert!(matches!(result, Err(jobwatch_core::Error::Config(_))));
}
