//! Deployment state machine tests

use deployctl::errors::ControllerError;
use openapi_server::models::{CurrentState, DesiredState, TransitionResult};

use crate::support::Fixture;

#[tokio::test]
async fn test_initialize_observes_running_stack() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();

    let machine = &fixture.app.machine;
    machine.initialize().await;

    assert_eq!(machine.desired_state().await, DesiredState::Running);
    assert_eq!(machine.cached_state().await, CurrentState::Running);
}

#[tokio::test]
async fn test_initialize_with_unreachable_runtime_assumes_stopped() {
    let fixture = Fixture::new().await;
    fixture.gateway.set_unavailable(true);

    let machine = &fixture.app.machine;
    machine.initialize().await;

    assert_eq!(machine.desired_state().await, DesiredState::Stopped);
    assert_eq!(machine.cached_state().await, CurrentState::Stopped);
}

#[tokio::test]
async fn test_request_returns_before_backend_finishes() {
    let fixture = Fixture::new().await;
    let machine = &fixture.app.machine;
    fixture.gateway.hold();

    let ticket = machine.request_transition("running").await.unwrap();
    assert_eq!(ticket.desired_state, DesiredState::Running);
    assert_eq!(ticket.previous_state, CurrentState::Stopped);
    assert_eq!(machine.desired_state().await, DesiredState::Running);

    fixture.gateway.wait_for_call("up:start").await;
    assert!(!ticket.handle.is_finished());

    let snapshot = machine.status().await.unwrap();
    assert_eq!(snapshot.current_state, CurrentState::Transitioning);
    assert_eq!(snapshot.desired_state, DesiredState::Running);
    assert_eq!(snapshot.last_state_change, Some(ticket.accepted_at));

    fixture.gateway.release(1);
    ticket.handle.await.unwrap();

    let snapshot = machine.status().await.unwrap();
    assert_eq!(snapshot.current_state, CurrentState::Running);
    assert!(fixture.gateway.is_running("shop-web-1"));
    assert!(fixture.gateway.is_running("shop-db-1"));
}

#[tokio::test]
async fn test_invalid_desired_state_is_rejected() {
    let fixture = Fixture::new().await;
    let machine = &fixture.app.machine;

    for value in ["deleted", "Running", ""] {
        let result = machine.request_transition(value).await;
        assert!(matches!(result, Err(ControllerError::InvalidState(_))));
    }

    assert_eq!(machine.desired_state().await, DesiredState::Stopped);
    assert!(fixture.gateway.calls().is_empty());
    let snapshot = machine.status().await.unwrap();
    assert_eq!(snapshot.last_state_change, None);
}

#[tokio::test]
async fn test_unreachable_runtime_rejects_without_recording_intent() {
    let fixture = Fixture::new().await;
    let machine = &fixture.app.machine;
    fixture.gateway.set_unavailable(true);

    let result = machine.request_transition("running").await;
    assert!(matches!(result, Err(ControllerError::BackendUnavailable(_))));
    assert_eq!(machine.desired_state().await, DesiredState::Stopped);

    let status = machine.status().await;
    assert!(matches!(status, Err(ControllerError::BackendUnavailable(_))));
}

#[tokio::test]
async fn test_restart_completes_down_before_up() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();
    let machine = &fixture.app.machine;
    machine.initialize().await;

    let ticket = machine.request_transition("restarting").await.unwrap();
    assert_eq!(ticket.previous_state, CurrentState::Running);
    ticket.handle.await.unwrap();

    assert_eq!(
        fixture.gateway.calls(),
        vec!["down:start", "down:end", "up:start", "up:end"]
    );
    let snapshot = machine.status().await.unwrap();
    assert_eq!(snapshot.current_state, CurrentState::Running);
    assert_eq!(snapshot.desired_state, DesiredState::Restarting);
}

#[tokio::test]
async fn test_restart_in_flight_reports_restarting() {
    let fixture = Fixture::running().await;
    let machine = &fixture.app.machine;
    fixture.gateway.hold();

    let ticket = machine.request_transition("restarting").await.unwrap();
    fixture.gateway.wait_for_call("down:start").await;

    let snapshot = machine.status().await.unwrap();
    assert_eq!(snapshot.current_state, CurrentState::Restarting);
    let report = snapshot.last_transition.unwrap();
    assert_eq!(report.transition_id, ticket.transition_id);
    assert_eq!(report.result, TransitionResult::Pending);
    assert_eq!(report.finished_at, None);

    fixture.gateway.release(1);
    fixture.gateway.wait_for_call("up:start").await;
    let snapshot = machine.status().await.unwrap();
    assert_eq!(snapshot.current_state, CurrentState::Restarting);

    fixture.gateway.release(1);
    ticket.handle.await.unwrap();
    let snapshot = machine.status().await.unwrap();
    assert_eq!(snapshot.current_state, CurrentState::Running);
}

#[tokio::test]
async fn test_failed_restart_is_distinguishable_from_success() {
    let succeeded = Fixture::running().await;
    let ticket = succeeded
        .app
        .machine
        .request_transition("restarting")
        .await
        .unwrap();
    ticket.handle.await.unwrap();

    let failed = Fixture::running().await;
    failed.gateway.fail_compose();
    let ticket = failed
        .app
        .machine
        .request_transition("restarting")
        .await
        .unwrap();
    ticket.handle.await.unwrap();
    assert_eq!(failed.gateway.calls(), vec!["down:start", "down:failed"]);

    let ok = succeeded.app.machine.status().await.unwrap();
    let bad = failed.app.machine.status().await.unwrap();

    // The containers never went down, so both observe a running stack
    assert_eq!(ok.current_state, bad.current_state);
    assert_eq!(ok.desired_state, bad.desired_state);

    let ok = ok.last_transition.unwrap();
    assert_eq!(ok.result, TransitionResult::Succeeded);
    assert_eq!(ok.error, None);
    assert!(ok.finished_at.is_some());

    let bad = bad.last_transition.unwrap();
    assert_eq!(bad.transition_id, ticket.transition_id);
    assert_eq!(bad.result, TransitionResult::Failed);
    assert!(bad.error.unwrap().contains("simulated failure"));
    assert!(bad.finished_at.is_some());
}

#[tokio::test]
async fn test_latest_request_wins() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();
    let machine = &fixture.app.machine;
    machine.initialize().await;
    fixture.gateway.hold();

    let stop = machine.request_transition("stopped").await.unwrap();
    fixture.gateway.wait_for_call("down:start").await;
    let run = machine.request_transition("running").await.unwrap();
    fixture.gateway.wait_for_call("up:start").await;
    assert_ne!(stop.transition_id, run.transition_id);
    assert_eq!(machine.desired_state().await, DesiredState::Running);

    fixture.gateway.release(1);
    stop.handle.await.unwrap();

    // The superseded stop finished but the newer request is still in flight
    let snapshot = machine.status().await.unwrap();
    assert_eq!(snapshot.current_state, CurrentState::Transitioning);
    assert_eq!(snapshot.desired_state, DesiredState::Running);

    fixture.gateway.release(1);
    run.handle.await.unwrap();

    assert_eq!(machine.cached_state().await, CurrentState::Running);
    let snapshot = machine.status().await.unwrap();
    assert_eq!(snapshot.current_state, CurrentState::Running);
    assert_eq!(snapshot.desired_state, DesiredState::Running);
    let report = snapshot.last_transition.unwrap();
    assert_eq!(report.transition_id, run.transition_id);
    assert_eq!(report.result, TransitionResult::Succeeded);
}

#[tokio::test]
async fn test_failed_transition_leaves_divergence_visible() {
    let fixture = Fixture::new().await;
    let machine = &fixture.app.machine;
    fixture.gateway.fail_compose();

    let ticket = machine.request_transition("running").await.unwrap();
    ticket.handle.await.unwrap();

    assert_eq!(fixture.gateway.calls(), vec!["up:start", "up:failed"]);
    let snapshot = machine.status().await.unwrap();
    assert_eq!(snapshot.current_state, CurrentState::Stopped);
    assert_eq!(snapshot.desired_state, DesiredState::Running);
}

#[tokio::test]
async fn test_destroy_removes_containers_and_volumes() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();
    let machine = &fixture.app.machine;
    machine.initialize().await;

    let report = machine.destroy().await.unwrap();
    assert_eq!(report.removed_containers, vec!["shop-db-1", "shop-web-1"]);
    assert_eq!(report.removed_volumes, vec!["shop_db-data"]);
    assert!(!fixture.gateway.volumes_present());

    let snapshot = machine.status().await.unwrap();
    assert_eq!(snapshot.current_state, CurrentState::Stopped);
    assert_eq!(snapshot.desired_state, DesiredState::Stopped);
    assert_eq!(snapshot.last_transition, None);

    let web = fixture.app.containers.get("web").await.unwrap();
    assert_eq!(web.status, "not created");
    let control = fixture.app.containers.control("web", "start").await;
    assert!(matches!(control, Err(ControllerError::ContainerNotFound(_))));
}

#[tokio::test]
async fn test_destroy_with_unreachable_runtime() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();
    fixture.gateway.set_unavailable(true);

    let result = fixture.app.machine.destroy().await;
    assert!(matches!(result, Err(ControllerError::BackendUnavailable(_))));
    assert!(fixture.gateway.volumes_present());
}

#[tokio::test]
async fn test_destroy_failure_is_an_operation_error() {
    let fixture = Fixture::running().await;
    fixture.gateway.fail_compose();

    let result = fixture.app.machine.destroy().await;
    assert!(matches!(
        result,
        Err(ControllerError::BackendOperationFailed(_))
    ));
    assert!(fixture.gateway.volumes_present());
    assert!(fixture.gateway.is_running("shop-web-1"));
}
