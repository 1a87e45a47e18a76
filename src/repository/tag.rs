//! Tag annotations

use omero_gateway_interface::{ObjectKind, RemoteObject, TagData};

use crate::error::{OmeroError, Result};
use crate::repository::ImageWrapper;
use crate::session::Session;
use crate::wrapper::{absorb_saved, impl_entity_wrapper, EntityWrapper, Named, Persistent};

#[derive(Debug, Clone)]
pub struct TagWrapper {
    data: TagData,
}

impl_entity_wrapper!(TagWrapper, TagData, ObjectKind::TagAnnotation);

impl TagWrapper {
    pub fn new(data: TagData) -> Self {
        Self { data }
    }

    /// Create a tag on the server
    pub fn create(session: &Session, name: &str, description: &str) -> Result<Self> {
        let mut tag = Self::new(TagData {
            name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        });
        tag.save_and_update(session)?;
        Ok(tag)
    }

    /// Text of the tag
    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.data.name = name.into();
    }

    pub fn description(&self) -> &str {
        &self.data.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.data.description = description.into();
    }

    pub fn namespace(&self) -> Option<&str> {
        self.data.namespace.as_deref()
    }

    /// Images carrying this tag
    pub fn images(&self, session: &Session) -> Result<Vec<ImageWrapper>> {
        session.get_images_tagged(self)
    }

    /// Reload the payload from the server
    pub fn refresh(&mut self, session: &Session) -> Result<()> {
        let id = self.object_ref()?.id;
        match session.find(ObjectKind::TagAnnotation, id)? {
            Some(RemoteObject::Tag(data)) => {
                self.replace_data(data);
                Ok(())
            }
            _ => Err(OmeroError::not_found(format!("{} no longer exists", self))),
        }
    }
}

impl Named for TagWrapper {
    fn name(&self) -> &str {
        &self.data.name
    }
}

impl Persistent for TagWrapper {
    fn to_remote(&self) -> RemoteObject {
        RemoteObject::Tag(self.data.clone())
    }

    fn absorb(&mut self, saved: RemoteObject) -> Result<()> {
        absorb_saved(self, saved)
    }
}
