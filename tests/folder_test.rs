/*!
 * Integration tests for folders and ROIs
 */

mod common;

use common::*;
use omero_client::gateway::{ObjectKind, ObjectRef};
use omero_client::{EntityWrapper, ErrorKind, FolderWrapper, RepositoryObject, RoiWrapper};

/// Folder on image 1 holding two freshly saved ROIs
fn folder_with_rois(session: &omero_client::Session) -> (FolderWrapper, Vec<RoiWrapper>) {
    let image = session.get_image(1).unwrap();

    let mut folder = FolderWrapper::create(session, "Test folder", "holds two ROIs").unwrap();
    folder.set_image(&image).unwrap();

    let rois: Vec<RoiWrapper> = ["roi 1", "roi 2"]
        .iter()
        .map(|name| image.save_roi(session, &RoiWrapper::unsaved(*name)).unwrap())
        .collect();
    for roi in &rois {
        folder.add_roi(session, roi).unwrap();
    }

    (folder, rois)
}

#[test]
fn test_folder_rois() {
    let gateway = server();
    let session = connect(&gateway);
    let (folder, rois) = folder_with_rois(&session);

    assert_eq!(ids(&folder.rois(&session).unwrap()), ids(&rois));
    assert_eq!(rois[0].image_id(), Some(1));
    assert_eq!(rois[0].name(), "roi 1");
}

#[test]
fn test_unlink_roi_keeps_roi() {
    let gateway = server();
    let session = connect(&gateway);
    let (folder, rois) = folder_with_rois(&session);

    folder.unlink_roi(&session, &rois[0]).unwrap();

    assert_eq!(ids(&folder.rois(&session).unwrap()), ids(&rois[1..]));
    let image = session.get_image(1).unwrap();
    assert_eq!(image.rois(&session).unwrap().len(), 2);
}

#[test]
fn test_delete_folder_unlinks_rois_first() {
    let gateway = server();
    let session = connect(&gateway);
    let (folder, rois) = folder_with_rois(&session);
    let folder_id = folder.id().unwrap();

    session.delete(&folder).unwrap();

    assert!(!gateway.contains(ObjectRef::new(ObjectKind::Folder, folder_id)));
    assert!(gateway.rois_in_folder(folder_id).is_empty());

    // The ROIs outlive the folder
    let image = session.get_image(1).unwrap();
    assert_eq!(ids(&image.rois(&session).unwrap()), ids(&rois));
}

#[test]
fn test_delete_folder_without_image_is_rejected_while_referenced() {
    let gateway = server();
    let session = connect(&gateway);
    let (folder, _) = folder_with_rois(&session);

    // Without an image the folder cannot know which ROIs to unlink
    let detached = session.get_folder(folder.id().unwrap()).unwrap();
    assert_eq!(detached.image_id(), None);

    let err = session.delete(&detached).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
    assert!(gateway.contains(ObjectRef::new(ObjectKind::Folder, folder.id().unwrap())));
}

#[test]
fn test_roi_operations_require_image() {
    let gateway = server();
    let session = connect(&gateway);
    let folder = FolderWrapper::create(&session, "No image", "").unwrap();

    let err = folder.rois(&session).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    // Nothing to unlink, so the delete goes through
    session.delete(&folder).unwrap();
}

#[test]
fn test_folder_refresh_keeps_image() {
    let gateway = server();
    let session = connect(&gateway);
    let (mut folder, _) = folder_with_rois(&session);

    folder.refresh(&session).unwrap();

    assert_eq!(folder.image_id(), Some(1));
    assert_eq!(folder.name(), "Test folder");
}

#[test]
fn test_folder_tags() {
    let gateway = server();
    let session = connect(&gateway);
    let folder = FolderWrapper::create(&session, "Tagged folder", "").unwrap();

    folder.add_tag_id(&session, 1).unwrap();

    assert_eq!(ids(&folder.tags(&session).unwrap()), vec![1]);
    assert_eq!(ids(&session.get_folders().unwrap()), vec![folder.id().unwrap()]);
}
