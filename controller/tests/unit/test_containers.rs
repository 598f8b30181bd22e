//! Container controller tests

use deployctl::errors::ControllerError;

use crate::support::{log_lines, Fixture};

#[tokio::test]
async fn test_list_reports_every_service() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();

    let containers = fixture.app.containers.list().await.unwrap();
    let names: Vec<&str> = containers.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["db", "web"]);

    let web = &containers[1];
    assert_eq!(web.container_name, "shop-web-1");
    assert_eq!(web.image, "nginx:1.27");
    assert_eq!(web.status, "running");
    assert_eq!(web.ports, vec!["80"]);
    assert_eq!(web.depends_on, vec!["db"]);
    assert!(web.started_at.is_some());
}

#[tokio::test]
async fn test_stop_is_verified() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();

    let info = fixture.app.containers.control("web", "stop").await.unwrap();
    assert_eq!(info.name, "web");
    assert_eq!(info.status, "exited");
    assert!(!fixture.gateway.is_running("shop-web-1"));
    assert!(fixture.gateway.is_running("shop-db-1"));
    assert_eq!(fixture.gateway.calls(), vec!["stop:shop-web-1"]);
}

#[tokio::test]
async fn test_start_after_stop() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();
    let containers = &fixture.app.containers;

    containers.control("db", "stop").await.unwrap();
    let info = containers.control("db", "start").await.unwrap();
    assert_eq!(info.status, "running");

    let info = containers.control("db", "restart").await.unwrap();
    assert_eq!(info.status, "running");
}

#[tokio::test]
async fn test_unknown_service_is_not_found() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();

    let result = fixture.app.containers.control("cache", "start").await;
    assert!(matches!(result, Err(ControllerError::ContainerNotFound(_))));
    let result = fixture.app.containers.get("cache").await;
    assert!(matches!(result, Err(ControllerError::ContainerNotFound(_))));
    assert!(fixture.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_action_is_rejected() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();

    let result = fixture.app.containers.control("web", "pause").await;
    assert!(matches!(result, Err(ControllerError::ValidationError(_))));
    assert!(fixture.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_container_never_created_is_not_found() {
    let fixture = Fixture::new().await;

    let result = fixture.app.containers.control("web", "start").await;
    assert!(matches!(result, Err(ControllerError::ContainerNotFound(_))));
    assert!(fixture.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_failed_action_is_verification_failure() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();
    fixture.gateway.fail_actions();

    let result = fixture.app.containers.control("web", "restart").await;
    assert!(matches!(result, Err(ControllerError::VerificationFailed(_))));
}

#[tokio::test]
async fn test_unmet_postcondition_is_verification_failure() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();
    fixture.gateway.ignore_actions();

    let result = fixture.app.containers.control("web", "stop").await;
    assert!(matches!(result, Err(ControllerError::VerificationFailed(_))));
    assert!(fixture.gateway.is_running("shop-web-1"));
}

#[tokio::test]
async fn test_unreachable_runtime_is_distinct_from_verification() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();
    fixture.gateway.set_unavailable(true);

    let result = fixture.app.containers.control("web", "stop").await;
    assert!(matches!(result, Err(ControllerError::BackendUnavailable(_))));
    let result = fixture.app.containers.list().await;
    assert!(matches!(result, Err(ControllerError::BackendUnavailable(_))));
}

#[tokio::test]
async fn test_logs_follow_existing_container() {
    let fixture = Fixture::running().await;

    let mut stream = fixture.app.containers.logs("web").await.unwrap();
    let mut lines = Vec::new();
    while let Some(line) = stream.recv().await {
        lines.push(line.unwrap());
    }

    assert_eq!(lines, log_lines("shop-web-1"));
    assert_eq!(fixture.gateway.calls(), vec!["logs:shop-web-1"]);
}

#[tokio::test]
async fn test_logs_need_a_created_container() {
    let fixture = Fixture::new().await;

    let missing = fixture.app.containers.logs("web").await;
    assert!(matches!(missing, Err(ControllerError::ContainerNotFound(_))));

    let unknown = fixture.app.containers.logs("cache").await;
    assert!(matches!(unknown, Err(ControllerError::ContainerNotFound(_))));
    assert!(fixture.gateway.calls().is_empty());
}
