//! Shared fixture for integration tests
//!
//! Seeds a mock server with the layout below. Ids are assigned per kind,
//! starting at 1, in the order objects are created.
//!
//! Groups: system (0), user (1), testGroup (3), testGroup2 (4)
//! Users: root (0, admin), testUser (2, owner of testGroup), testUser2 (3)
//!
//! In testGroup, owned by testUser:
//! - Project 1 "TestProject": dataset 1 "TestDataset", dataset 2 "TestDatasetImport"
//! - Project 2 "TestProject2" (empty)
//! - Dataset 3 "OrphanDataset"
//! - Image 1 "image1.fake" in dataset 1, tags 1 and 2, testKey1=testValue1
//! - Image 2 "image2.fake" in datasets 1 and 2, tag 1, testKey1=testValue1, testKey2=testValue2
//! - Image 3 "image1.fake" in dataset 2, testKey1=otherValue
//! - Image 4 "image1.fake.bak", in no dataset
//! - Tag 1 "tag1", tag 2 "tag2"
//!
//! Image 5 "image3.fake" belongs to testUser2. Project 3 "TestProject" lives
//! in testGroup2.

#![allow(dead_code)]

use omero_client::gateway::{Id, ObjectKind, ObjectRef};
use omero_client::{DeleteWait, MockGateway, Session};
use std::sync::Arc;
use std::time::Duration;

pub const HOST: &str = "omero";
pub const PORT: u16 = 4064;

pub const ROOT: Id = 0;
pub const TEST_USER: Id = 2;
pub const TEST_USER2: Id = 3;
pub const TEST_GROUP: Id = 3;
pub const TEST_GROUP2: Id = 4;

pub fn image_ref(id: Id) -> ObjectRef {
    ObjectRef::new(ObjectKind::Image, id)
}

/// Seeded mock server
pub fn server() -> Arc<MockGateway> {
    omero_client::logging::init_test_logging();

    let gateway = MockGateway::new(HOST, PORT);

    gateway.add_group(0, "system");
    gateway.add_group(1, "user");
    gateway.add_group(TEST_GROUP, "testGroup");
    gateway.add_group(TEST_GROUP2, "testGroup2");

    gateway.add_user(ROOT, "root", "omero", &[0, 1]);
    gateway.add_user(TEST_USER, "testUser", "password", &[TEST_GROUP, TEST_GROUP2, 1]);
    gateway.add_user(TEST_USER2, "testUser2", "password2", &[TEST_GROUP, 1]);
    gateway.set_group_owner(TEST_GROUP, TEST_USER);

    let (u, g) = (TEST_USER, TEST_GROUP);

    let project = gateway.add_project(u, g, "TestProject", "description");
    gateway.add_project(u, g, "TestProject2", "");
    gateway.add_project(u, TEST_GROUP2, "TestProject", "in another group");

    let dataset1 = gateway.add_dataset(u, g, "TestDataset", Some(project));
    let dataset2 = gateway.add_dataset(u, g, "TestDatasetImport", Some(project));
    gateway.add_dataset(u, g, "OrphanDataset", None);

    let image1 = gateway.add_image(u, g, "image1.fake", Some(dataset1));
    let image2 = gateway.add_image(u, g, "image2.fake", Some(dataset1));
    gateway.add_image_to_dataset(dataset2, image2);
    let image3 = gateway.add_image(u, g, "image1.fake", Some(dataset2));
    gateway.add_image(u, g, "image1.fake.bak", None);
    gateway.add_image(TEST_USER2, g, "image3.fake", None);

    let tag1 = gateway.add_tag(u, g, "tag1", "description 1");
    let tag2 = gateway.add_tag(u, g, "tag2", "description 2");
    gateway.tag(image_ref(image1), tag1);
    gateway.tag(image_ref(image1), tag2);
    gateway.tag(image_ref(image2), tag1);

    gateway.add_pairs(u, g, image_ref(image1), &[("testKey1", "testValue1")]);
    gateway.add_pairs(
        u,
        g,
        image_ref(image2),
        &[("testKey1", "testValue1"), ("testKey2", "testValue2")],
    );
    gateway.add_pairs(u, g, image_ref(image3), &[("testKey1", "otherValue")]);

    Arc::new(gateway)
}

/// Delete budget short enough for tests: 10 polls of 5ms
pub fn quick_wait() -> DeleteWait {
    DeleteWait::new(10, Duration::from_millis(5))
}

/// Session connected as testUser in testGroup
pub fn connect(gateway: &Arc<MockGateway>) -> Session {
    let mut session = Session::with_delete_wait(gateway.clone(), quick_wait());
    session
        .connect_with_password(HOST, PORT, "testUser", "password", Some(TEST_GROUP))
        .expect("testUser login");
    session
}

/// Session connected as root in the system group
pub fn connect_root(gateway: &Arc<MockGateway>) -> Session {
    let mut session = Session::with_delete_wait(gateway.clone(), quick_wait());
    session
        .connect_with_password(HOST, PORT, "root", "omero", None)
        .expect("root login");
    session
}

/// Ids of a list of wrappers
pub fn ids<W: omero_client::EntityWrapper>(items: &[W]) -> Vec<Id> {
    items.iter().filter_map(|w| w.id()).collect()
}
