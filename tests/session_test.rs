/*!
 * Integration tests for the session lifecycle
 *
 * Covers connecting (including group resolution), disconnecting,
 * impersonation and group switching against the seeded mock server.
 */

mod common;

use common::*;
use omero_client::gateway::{ConnectionStatus, LoginCredentials};
use omero_client::{ClientConfig, ErrorKind, OmeroError, Session};

#[test]
fn test_connect_in_requested_group() {
    let gateway = server();
    let session = connect(&gateway);

    assert!(session.is_connected());
    assert_eq!(session.user_id(), Some(TEST_USER));
    assert_eq!(session.current_group_id(), Some(TEST_GROUP));
    assert!(!session.is_sudo());
    assert_eq!(session.user().map(|u| u.user_name()), Some("testUser"));
}

#[test]
fn test_connect_in_other_member_group() {
    let gateway = server();
    let mut session = Session::new(gateway.clone());
    session
        .connect_with_password(HOST, PORT, "testUser", "password", Some(TEST_GROUP2))
        .unwrap();

    assert_eq!(session.current_group_id(), Some(TEST_GROUP2));
    // The identity keeps its own default group
    assert_eq!(session.user().map(|u| u.default_group_id()), Some(TEST_GROUP));
}

#[test]
fn test_connect_falls_back_to_default_group() {
    let gateway = server();
    let mut session = Session::new(gateway.clone());

    session
        .connect_with_password(HOST, PORT, "testUser", "password", Some(200))
        .unwrap();
    assert_eq!(session.current_group_id(), Some(TEST_GROUP));

    // Not an administrator, so the system group is not an option either
    session
        .connect_with_password(HOST, PORT, "testUser", "password", Some(0))
        .unwrap();
    assert_eq!(session.current_group_id(), Some(TEST_GROUP));
}

#[test]
fn test_connect_with_bad_password() {
    let gateway = server();
    let mut session = Session::new(gateway.clone());

    let err = session
        .connect_with_password(HOST, PORT, "testUser", "wrong", None)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Service);
    assert_eq!(err.connection_status(), Some(ConnectionStatus::Unauthenticated));
    assert!(err.to_string().starts_with("Cannot connect to OMERO"));
    assert!(!session.is_connected());
}

#[test]
fn test_connect_to_unreachable_host() {
    let gateway = server();
    let mut session = Session::new(gateway.clone());

    let err = session
        .connect_with_password("127.0.0.1", PORT, "testUser", "password", None)
        .unwrap_err();

    assert_eq!(err.connection_status(), Some(ConnectionStatus::Network));
}

#[test]
fn test_connect_with_session_key() {
    let gateway = server();
    let first = connect(&gateway);
    let key = first.session_id().unwrap();

    let mut second = Session::new(gateway.clone());
    second.connect_with_session_key(HOST, PORT, &key).unwrap();

    assert_eq!(second.user_id(), Some(TEST_USER));
}

#[test]
fn test_connect_from_config() {
    let gateway = server();
    let config = ClientConfig {
        host: HOST.to_string(),
        port: PORT,
        username: "testUser".to_string(),
        group_id: Some(TEST_GROUP2),
        delete_attempts: 3,
        ..Default::default()
    };

    let mut session = Session::from_config(gateway.clone(), &config);
    session.connect(&config.credentials("password")).unwrap();

    assert_eq!(session.current_group_id(), Some(TEST_GROUP2));
    assert_eq!(session.delete_wait().attempts(), 3);
}

#[test]
fn test_reconnect_replaces_previous_connection() {
    let gateway = server();
    let mut session = connect(&gateway);

    session
        .connect(&LoginCredentials::password(HOST, PORT, "testUser2", "password2"))
        .unwrap();

    assert_eq!(session.user_id(), Some(TEST_USER2));
    assert_eq!(gateway.disconnect_count(), 1);
}

#[test]
fn test_disconnect_is_idempotent() {
    let gateway = server();
    let mut session = connect(&gateway);

    session.disconnect();
    assert!(!session.is_connected());
    assert!(session.user().is_none());
    assert!(session.security_context().is_none());

    session.disconnect();
    assert!(!session.is_connected());
    assert_eq!(gateway.disconnect_count(), 1);
}

#[test]
fn test_operations_fail_fast_after_disconnect() {
    let gateway = server();
    let mut session = connect(&gateway);
    session.disconnect();

    let err = session.get_projects().unwrap_err();
    assert!(matches!(err, OmeroError::Precondition(_)));
}

#[test]
fn test_lost_connection_is_service_error() {
    let gateway = server();
    let session = connect(&gateway);
    gateway.drop_connection();

    assert!(!session.is_connected());
    let err = session.get_projects().unwrap_err();
    assert_eq!(err.connection_status(), Some(ConnectionStatus::LostConnection));
}

#[test]
fn test_sudo_creates_isolated_session() {
    let gateway = server();
    let root = connect_root(&gateway);
    let root_ctx = root.security_context().unwrap();

    let sudo = root.sudo("testUser").unwrap();

    assert!(sudo.is_sudo());
    assert_eq!(sudo.user_id(), Some(TEST_USER));
    assert_eq!(sudo.current_group_id(), Some(TEST_GROUP));
    assert_eq!(sudo.user().map(|u| u.user_name()), Some("testUser"));

    // The impersonating session is unchanged
    assert!(!root.is_sudo());
    assert_eq!(root.user_id(), Some(ROOT));
    assert_eq!(root.security_context().unwrap(), root_ctx);

    // The impersonated view sees testUser's data
    assert_eq!(ids(&sudo.get_projects().unwrap()), vec![1, 2]);
}

#[test]
fn test_sudo_disconnect_keeps_shared_connection() {
    let gateway = server();
    let root = connect_root(&gateway);
    let mut sudo = root.sudo("testUser").unwrap();

    sudo.disconnect();

    assert!(!sudo.is_connected());
    assert!(root.is_connected());
    assert_eq!(gateway.disconnect_count(), 0);
}

#[test]
fn test_sudo_session_cannot_open_its_own_connection() {
    let gateway = server();
    let root = connect_root(&gateway);
    let mut sudo = root.sudo("testUser").unwrap();

    let err = sudo
        .connect(&LoginCredentials::password(HOST, PORT, "testUser2", "password2"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    // Both sessions are left as they were
    assert_eq!(sudo.user_id(), Some(TEST_USER));
    assert!(sudo.is_sudo());
    sudo.disconnect();
    assert!(root.is_connected());
    assert_eq!(root.user_id(), Some(ROOT));
    assert_eq!(gateway.disconnect_count(), 0);
}

#[test]
fn test_sudo_debug_output() {
    let gateway = server();
    let root = connect_root(&gateway);
    let sudo = root.sudo("testUser").unwrap();

    let shown = format!("{:?}", sudo);
    assert!(shown.contains("sudo: true"));
    assert!(shown.contains("owns_connection: false"));
}

#[test]
fn test_sudo_unknown_user() {
    let gateway = server();
    let root = connect_root(&gateway);

    let err = root.sudo("nobody").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_switch_group_replaces_context() {
    let gateway = server();
    let mut session = connect(&gateway);
    let before = session.security_context().unwrap();

    session.switch_group(TEST_GROUP2).unwrap();

    assert_eq!(session.current_group_id(), Some(TEST_GROUP2));
    assert_eq!(session.user_id(), Some(TEST_USER));
    // A context captured earlier keeps its group
    assert_eq!(before.group_id(), TEST_GROUP);

    assert_eq!(ids(&session.get_projects().unwrap()), vec![3]);
}

#[test]
fn test_switch_group_keeps_sudo_flag() {
    let gateway = server();
    let root = connect_root(&gateway);
    let mut sudo = root.sudo("testUser").unwrap();

    sudo.switch_group(TEST_GROUP2).unwrap();

    assert!(sudo.is_sudo());
    assert_eq!(sudo.user_id(), Some(TEST_USER));
    assert_eq!(root.current_group_id(), Some(0));
}

#[test]
fn test_parent_switch_leaves_sudo_session_in_its_group() {
    let gateway = server();
    let mut root = connect_root(&gateway);
    let sudo = root.sudo("testUser").unwrap();

    root.switch_group(TEST_GROUP2).unwrap();

    assert_eq!(root.current_group_id(), Some(TEST_GROUP2));
    assert_eq!(sudo.current_group_id(), Some(TEST_GROUP));
    assert_eq!(ids(&sudo.get_projects().unwrap()), vec![1, 2]);
}

#[test]
fn test_switch_to_foreign_group_is_denied() {
    let gateway = server();
    let mut session = Session::new(gateway.clone());
    session
        .connect_with_password(HOST, PORT, "testUser2", "password2", None)
        .unwrap();

    let err = session.switch_group(TEST_GROUP2).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Access);
    assert_eq!(session.current_group_id(), Some(TEST_GROUP));
}

#[test]
fn test_admin_switches_to_any_existing_group() {
    let gateway = server();
    let mut root = connect_root(&gateway);

    root.switch_group(TEST_GROUP).unwrap();
    assert_eq!(root.current_group_id(), Some(TEST_GROUP));

    let err = root.switch_group(200).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(root.current_group_id(), Some(TEST_GROUP));
}
