/*!
 * Integration tests for error mapping and bounded deletes
 *
 * Failures are injected into the mock server to verify that every
 * collaborator failure surfaces as exactly one error kind, and that a delete
 * the server never finishes is abandoned after the configured budget.
 */

mod common;

use common::*;
use omero_client::gateway::{ConnectionStatus, GatewayError, ObjectKind, ObjectRef};
use omero_client::{DeleteWait, ErrorKind, ProjectWrapper, RepositoryObject, Session};
use std::time::{Duration, Instant};

#[test]
fn test_access_failure_maps_to_access_error() {
    let gateway = server();
    let session = connect(&gateway);
    gateway.fail_next("get_projects", GatewayError::Access("denied".to_string()));

    let err = session.get_projects().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Access);
    assert_eq!(err.to_string(), "Cannot get projects");
    assert!(matches!(err.gateway_cause(), Some(GatewayError::Access(_))));
}

#[test]
fn test_server_failure_maps_to_server_error() {
    let gateway = server();
    let session = connect(&gateway);
    gateway.fail_next("get_images", GatewayError::Server("boom".to_string()));

    let err = session.get_image(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
}

#[test]
fn test_out_of_service_maps_to_service_error() {
    let gateway = server();
    let session = connect(&gateway);
    gateway.fail_next(
        "get_datasets",
        GatewayError::out_of_service("session expired", ConnectionStatus::Unauthenticated),
    );

    let err = session.get_datasets().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Service);
    assert_eq!(err.connection_status(), Some(ConnectionStatus::Unauthenticated));
}

#[test]
fn test_unavailable_facility_maps_to_service_error() {
    let gateway = server();
    let session = connect(&gateway);
    gateway.fail_next("roi", GatewayError::Facility("cannot instantiate".to_string()));

    let image = session.get_image(1).unwrap();
    let err = image.rois(&session).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Service);

    // Retrieval is retried on the next call
    assert!(image.rois(&session).unwrap().is_empty());
}

#[test]
fn test_missing_entity_is_not_found() {
    let gateway = server();
    let session = connect(&gateway);

    assert_eq!(session.get_project(200).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(session.get_tag(200).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(session.get_user("nobody").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(session.get_group("nogroup").unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_entity_in_other_group_is_not_found() {
    let gateway = server();
    let session = connect(&gateway);

    assert_eq!(session.get_project(3).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_unsaved_entity_is_precondition_error() {
    let gateway = server();
    let session = connect(&gateway);
    let unsaved = ProjectWrapper::new(Default::default());

    let err = session.delete(&unsaved).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn test_bad_name_pattern_is_precondition_error() {
    let gateway = server();
    let session = connect(&gateway);

    let err = session.get_images_like("image[").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn test_delete_of_foreign_object_is_access_error() {
    let gateway = server();
    let session = connect(&gateway);

    let err = session
        .delete_ref(ObjectRef::new(ObjectKind::Image, 5))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Access);
    assert!(gateway.contains(ObjectRef::new(ObjectKind::Image, 5)));
}

#[test]
fn test_stalled_delete_is_bounded() {
    let gateway = server();
    let session = connect(&gateway);
    gateway.stall_deletes(true);

    let start = Instant::now();
    let err = session
        .delete_ref(ObjectRef::new(ObjectKind::TagAnnotation, 2))
        .unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(gateway.delete_polls(), 10);
    assert_eq!(err.kind(), ErrorKind::Server);
    assert!(matches!(err.gateway_cause(), Some(GatewayError::LockTimeout(_))));
    assert!(err.to_string().contains("thread was interrupted"));
    assert!(!err.is_interrupted());

    let budget = quick_wait().budget();
    assert!(elapsed >= budget);
    assert!(elapsed < budget + Duration::from_secs(1));
}

#[test]
fn test_custom_delete_budget() {
    let gateway = server();
    let mut session = Session::with_delete_wait(
        gateway.clone(),
        DeleteWait::new(3, Duration::from_millis(1)),
    );
    session
        .connect_with_password(HOST, PORT, "testUser", "password", None)
        .unwrap();
    gateway.stall_deletes(true);

    session
        .delete_ref(ObjectRef::new(ObjectKind::TagAnnotation, 2))
        .unwrap_err();

    assert_eq!(gateway.delete_polls(), 3);
}

#[test]
fn test_zero_delete_budget_still_polls_once() {
    let gateway = server();
    let mut session = Session::with_delete_wait(
        gateway.clone(),
        DeleteWait::new(0, Duration::from_millis(1)),
    );
    session
        .connect_with_password(HOST, PORT, "testUser", "password", None)
        .unwrap();

    session
        .delete_ref(ObjectRef::new(ObjectKind::TagAnnotation, 2))
        .unwrap();

    assert_eq!(gateway.delete_polls(), 1);
    assert!(!gateway.contains(ObjectRef::new(ObjectKind::TagAnnotation, 2)));
}

#[test]
fn test_interrupted_delete_keeps_cause() {
    let gateway = server();
    let session = connect(&gateway);
    gateway.interrupt_deletes(true);

    let err = session
        .delete_ref(ObjectRef::new(ObjectKind::TagAnnotation, 2))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Server);
    assert!(err.is_interrupted());
    assert_eq!(gateway.delete_polls(), 1);
}

#[test]
fn test_delete_completes() {
    let gateway = server();
    let session = connect(&gateway);
    let tag = session.get_tag(2).unwrap();

    session.delete(&tag).unwrap();

    assert!(!gateway.contains(ObjectRef::new(ObjectKind::TagAnnotation, 2)));
    assert_eq!(session.get_tag(2).unwrap_err().kind(), ErrorKind::NotFound);
    // Links to the deleted tag are gone with it
    let image = session.get_image(1).unwrap();
    assert_eq!(ids(&image.tags(&session).unwrap()), vec![1]);
}

#[test]
fn test_find_by_query() {
    let gateway = server();
    let session = connect(&gateway);
    let query = "select p from Project p";
    gateway.on_query(query, vec![ObjectRef::new(ObjectKind::Project, 1)]);

    let found = session.find_by_query(query).unwrap();
    assert_eq!(found, vec![ObjectRef::new(ObjectKind::Project, 1)]);

    let err = session.find_by_query("select nonsense").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
}
