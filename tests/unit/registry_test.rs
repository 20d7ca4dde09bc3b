//! Unit tests for the file-backed registry

use service_gateway::registry::{FileRegistry, Registration, Removal, ServiceRegistry};
use service_gateway::GatewayError;
use std::sync::Arc;
use std::time::Duration;

fn open(dir: &tempfile::TempDir) -> FileRegistry {
    FileRegistry::open(dir.path().join("registry.json")).unwrap()
}

#[tokio::test]
async fn test_register_and_discover() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(&dir);

    registry
        .register(
            Registration::new("item-service", "http://localhost:3003")
                .with_metadata("version", "1.0.0"),
        )
        .await
        .unwrap();

    let record = registry.discover("item-service").await.unwrap();
    assert_eq!(record.url, "http://localhost:3003");
    assert!(record.healthy);
    assert_eq!(record.metadata["version"], "1.0.0");
}

#[tokio::test]
async fn test_reregistration_replaces_record() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(&dir);

    registry
        .register(Registration::new("item-service", "http://localhost:3003"))
        .await
        .unwrap();
    registry
        .register(Registration::new("item-service", "http://localhost:4003"))
        .await
        .unwrap();

    let services = registry.list_services().await.unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services["item-service"].url, "http://localhost:4003");
}

#[tokio::test]
async fn test_discover_missing_service() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(&dir);

    assert!(matches!(
        registry.discover("item-service").await,
        Err(GatewayError::ServiceNotFound { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_writers_do_not_lose_entries() {
    let dir = tempfile::tempdir().unwrap();
    // Two handles on the same file behave like two processes
    let first = Arc::new(open(&dir));
    let second = Arc::new(open(&dir));

    let mut tasks = Vec::new();
    for i in 0..20 {
        let registry = if i % 2 == 0 { first.clone() } else { second.clone() };
        tasks.push(tokio::spawn(async move {
            registry
                .register(Registration::new(
                    format!("service-{}", i),
                    format!("http://localhost:{}", 4000 + i),
                ))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let services = first.list_services().await.unwrap();
    assert_eq!(services.len(), 20);
}

#[tokio::test]
async fn test_health_updates_and_heartbeats() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(&dir);
    registry
        .register(Registration::new("list-service", "http://localhost:3002"))
        .await
        .unwrap();

    registry.update_health("list-service", false).await.unwrap();
    assert!(!registry.discover("list-service").await.unwrap().healthy);

    assert!(registry.heartbeat("list-service", Some(120)).await.unwrap());
    let record = registry.discover("list-service").await.unwrap();
    assert!(record.healthy);
    assert_eq!(record.uptime_secs, Some(120));

    // Unknown names are ignored
    registry.update_health("ghost", true).await.unwrap();
    assert!(!registry.heartbeat("ghost", None).await.unwrap());
    assert_eq!(registry.list_services().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cleanup_stale_and_unregister() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(&dir);
    registry
        .register(Registration::new("user-service", "http://localhost:3001"))
        .await
        .unwrap();

    assert!(registry
        .cleanup_stale(Duration::from_secs(300))
        .await
        .unwrap()
        .is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let removed = registry
        .cleanup_stale(Duration::from_millis(1))
        .await
        .unwrap();
    assert_eq!(removed, vec!["user-service".to_string()]);

    assert_eq!(
        registry.unregister("user-service", None).await.unwrap(),
        Removal::NotFound
    );
}

#[tokio::test]
async fn test_stale_owner_cannot_unregister_replacement() {
    let dir = tempfile::tempdir().unwrap();
    let old_instance = open(&dir);
    let new_instance = open(&dir);

    let mut first = Registration::new("item-service", "http://localhost:3003");
    first.pid = Some(1111);
    old_instance.register(first).await.unwrap();

    let mut second = Registration::new("item-service", "http://localhost:4003");
    second.pid = Some(2222);
    new_instance.register(second).await.unwrap();

    assert_eq!(
        old_instance
            .unregister("item-service", Some(1111))
            .await
            .unwrap(),
        Removal::OwnerMismatch { owner: Some(2222) }
    );
    let record = old_instance.discover("item-service").await.unwrap();
    assert_eq!(record.url, "http://localhost:4003");

    assert!(new_instance
        .unregister("item-service", Some(2222))
        .await
        .unwrap()
        .is_removed());
    assert!(old_instance.list_services().await.unwrap().is_empty());
}
