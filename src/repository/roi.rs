//! Regions of interest

use omero_gateway_interface::{Id, ObjectKind, RemoteObject, RoiData};

use crate::error::Result;
use crate::wrapper::{absorb_saved, impl_entity_wrapper, Named, Persistent};

#[derive(Debug, Clone)]
pub struct RoiWrapper {
    data: RoiData,
}

impl_entity_wrapper!(RoiWrapper, RoiData, ObjectKind::Roi);

impl RoiWrapper {
    pub fn new(data: RoiData) -> Self {
        Self { data }
    }

    /// Unsaved ROI; attach it with `ImageWrapper::save_roi`
    pub fn unsaved(name: impl Into<String>) -> Self {
        Self::new(RoiData {
            name: name.into(),
            ..Default::default()
        })
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn description(&self) -> &str {
        &self.data.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.data.description = description.into();
    }

    pub fn image_id(&self) -> Option<Id> {
        self.data.image_id
    }
}

impl Named for RoiWrapper {
    fn name(&self) -> &str {
        &self.data.name
    }
}

impl Persistent for RoiWrapper {
    fn to_remote(&self) -> RemoteObject {
        RemoteObject::Roi(self.data.clone())
    }

    fn absorb(&mut self, saved: RemoteObject) -> Result<()> {
        absorb_saved(self, saved)
    }
}
