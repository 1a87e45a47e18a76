//! Remote payloads as the gateway materializes them
//!
//! Every payload carries an optional id: `None` until the server assigns one
//! on the first successful save.

use crate::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Id of the administrators' group
pub const SYSTEM_GROUP_ID: Id = 0;

/// Kind of a remote object, named the way the server names its tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Project,
    Dataset,
    Image,
    TagAnnotation,
    MapAnnotation,
    Folder,
    Roi,
    Experimenter,
    ExperimenterGroup,
    Link(LinkKind),
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Project => "Project",
            ObjectKind::Dataset => "Dataset",
            ObjectKind::Image => "Image",
            ObjectKind::TagAnnotation => "TagAnnotation",
            ObjectKind::MapAnnotation => "MapAnnotation",
            ObjectKind::Folder => "Folder",
            ObjectKind::Roi => "Roi",
            ObjectKind::Experimenter => "Experimenter",
            ObjectKind::ExperimenterGroup => "ExperimenterGroup",
            ObjectKind::Link(link) => link.as_str(),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link tables between a parent and a child object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkKind {
    ProjectDataset,
    DatasetImage,
    ProjectAnnotation,
    DatasetAnnotation,
    ImageAnnotation,
    FolderAnnotation,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::ProjectDataset => "ProjectDatasetLink",
            LinkKind::DatasetImage => "DatasetImageLink",
            LinkKind::ProjectAnnotation => "ProjectAnnotationLink",
            LinkKind::DatasetAnnotation => "DatasetAnnotationLink",
            LinkKind::ImageAnnotation => "ImageAnnotationLink",
            LinkKind::FolderAnnotation => "FolderAnnotationLink",
        }
    }

    /// Kind of the parent side of the link
    pub fn parent_kind(&self) -> ObjectKind {
        match self {
            LinkKind::ProjectDataset | LinkKind::ProjectAnnotation => ObjectKind::Project,
            LinkKind::DatasetImage | LinkKind::DatasetAnnotation => ObjectKind::Dataset,
            LinkKind::ImageAnnotation => ObjectKind::Image,
            LinkKind::FolderAnnotation => ObjectKind::Folder,
        }
    }
}

/// Unloaded reference to a remote object: kind plus id, no payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub id: Id,
}

impl ObjectRef {
    pub fn new(kind: ObjectKind, id: Id) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Ownership details attached to every owned payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details {
    pub owner_id: Option<Id>,
    pub group_id: Option<Id>,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectData {
    pub id: Option<Id>,
    pub name: String,
    pub description: String,
    pub details: Details,
    /// Datasets loaded with the project, in server order
    pub datasets: Vec<DatasetData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetData {
    pub id: Option<Id>,
    pub name: String,
    pub description: String,
    pub details: Details,
    /// Projects to link the dataset to when it is first saved
    pub projects: Vec<Id>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub id: Option<Id>,
    pub name: String,
    pub description: String,
    pub details: Details,
    pub acquisition_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagData {
    pub id: Option<Id>,
    /// Text value of the tag
    pub name: String,
    pub description: String,
    pub namespace: Option<String>,
    pub details: Details,
}

/// One key/value entry of a map annotation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: String,
}

impl NamedValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapAnnotationData {
    pub id: Option<Id>,
    pub namespace: Option<String>,
    pub pairs: Vec<NamedValue>,
    pub details: Details,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderData {
    pub id: Option<Id>,
    pub name: String,
    pub description: String,
    pub details: Details,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoiData {
    pub id: Option<Id>,
    pub name: String,
    pub description: String,
    /// Image the ROI belongs to
    pub image_id: Option<Id>,
    pub details: Details,
}

/// ROIs of one image, as returned by the ROI facility
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoiResult {
    pub image_id: Id,
    pub rois: Vec<RoiData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub experimenter_id: Id,
    /// Group owners are the group's leaders
    pub owner: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionLevel {
    #[default]
    Private,
    ReadOnly,
    ReadAnnotate,
    ReadWrite,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupData {
    pub id: Option<Id>,
    pub name: String,
    pub description: String,
    pub permissions: PermissionLevel,
    pub members: Vec<GroupMember>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimenterData {
    pub id: Option<Id>,
    pub username: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub email: String,
    pub institution: String,
    pub active: bool,
    pub ldap: bool,
    pub default_group_id: Id,
    pub groups: Vec<GroupData>,
}

impl ExperimenterData {
    pub fn is_member_of_group(&self, group_id: Id) -> bool {
        self.groups.iter().any(|g| g.id == Some(group_id))
    }

    pub fn is_admin(&self) -> bool {
        self.is_member_of_group(SYSTEM_GROUP_ID)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkData {
    pub id: Option<Id>,
    pub kind: LinkKind,
    pub parent: ObjectRef,
    pub child: ObjectRef,
}

impl LinkData {
    pub fn new(kind: LinkKind, parent: ObjectRef, child: ObjectRef) -> Self {
        Self {
            id: None,
            kind,
            parent,
            child,
        }
    }
}

/// Any object the data manager can persist or the query service can return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteObject {
    Project(ProjectData),
    Dataset(DatasetData),
    Image(ImageData),
    Tag(TagData),
    MapAnnotation(MapAnnotationData),
    Folder(FolderData),
    Roi(RoiData),
    Link(LinkData),
}

impl RemoteObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            RemoteObject::Project(_) => ObjectKind::Project,
            RemoteObject::Dataset(_) => ObjectKind::Dataset,
            RemoteObject::Image(_) => ObjectKind::Image,
            RemoteObject::Tag(_) => ObjectKind::TagAnnotation,
            RemoteObject::MapAnnotation(_) => ObjectKind::MapAnnotation,
            RemoteObject::Folder(_) => ObjectKind::Folder,
            RemoteObject::Roi(_) => ObjectKind::Roi,
            RemoteObject::Link(link) => ObjectKind::Link(link.kind),
        }
    }

    pub fn id(&self) -> Option<Id> {
        match self {
            RemoteObject::Project(d) => d.id,
            RemoteObject::Dataset(d) => d.id,
            RemoteObject::Image(d) => d.id,
            RemoteObject::Tag(d) => d.id,
            RemoteObject::MapAnnotation(d) => d.id,
            RemoteObject::Folder(d) => d.id,
            RemoteObject::Roi(d) => d.id,
            RemoteObject::Link(d) => d.id,
        }
    }

    /// Unloaded reference, if the object has been saved
    pub fn object_ref(&self) -> Option<ObjectRef> {
        self.id().map(|id| ObjectRef::new(self.kind(), id))
    }
}

macro_rules! remote_variant {
    ($variant:ident, $data:ty) => {
        impl From<$data> for RemoteObject {
            fn from(data: $data) -> Self {
                RemoteObject::$variant(data)
            }
        }

        impl TryFrom<RemoteObject> for $data {
            type Error = RemoteObject;

            fn try_from(object: RemoteObject) -> Result<Self, Self::Error> {
                match object {
                    RemoteObject::$variant(data) => Ok(data),
                    other => Err(other),
                }
            }
        }
    };
}

remote_variant!(Project, ProjectData);
remote_variant!(Dataset, DatasetData);
remote_variant!(Image, ImageData);
remote_variant!(Tag, TagData);
remote_variant!(MapAnnotation, MapAnnotationData);
remote_variant!(Folder, FolderData);
remote_variant!(Roi, RoiData);
remote_variant!(Link, LinkData);

/// Server-side selection for listing calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    Ids(Vec<Id>),
    /// Server name search; may be case-insensitive or match substrings
    Name(String),
}

/// Selection for `QueryService::find_all`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    pub ids: Option<Vec<Id>>,
    pub parent: Option<Id>,
    pub child: Option<Id>,
}

impl Criteria {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ids(ids: impl Into<Vec<Id>>) -> Self {
        Self {
            ids: Some(ids.into()),
            ..Self::default()
        }
    }

    pub fn parent(mut self, id: Id) -> Self {
        self.parent = Some(id);
        self
    }

    pub fn child(mut self, id: Id) -> Self {
        self.child = Some(id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_object_conversion() {
        let project = ProjectData {
            id: Some(1),
            name: "TestProject".to_string(),
            ..Default::default()
        };

        let object = RemoteObject::from(project.clone());
        assert_eq!(object.kind(), ObjectKind::Project);
        assert_eq!(object.object_ref(), Some(ObjectRef::new(ObjectKind::Project, 1)));

        let back = ProjectData::try_from(object).unwrap();
        assert_eq!(back, project);
    }

    #[test]
    fn test_wrong_variant_is_returned_back() {
        let object = RemoteObject::from(TagData::default());
        let err = ProjectData::try_from(object).unwrap_err();
        assert_eq!(err.kind(), ObjectKind::TagAnnotation);
    }

    #[test]
    fn test_link_kind_names() {
        assert_eq!(
            ObjectKind::Link(LinkKind::FolderAnnotation).as_str(),
            "FolderAnnotationLink"
        );
        assert_eq!(LinkKind::DatasetImage.parent_kind(), ObjectKind::Dataset);
    }

    #[test]
    fn test_admin_is_system_group_member() {
        let mut user = ExperimenterData {
            id: Some(0),
            username: "root".to_string(),
            groups: vec![GroupData {
                id: Some(SYSTEM_GROUP_ID),
                name: "system".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(user.is_admin());

        user.groups.clear();
        assert!(!user.is_admin());
    }
}
