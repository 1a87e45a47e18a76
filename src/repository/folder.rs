//! Folders
//!
//! ROIs are associated to folders per image, so a folder remembers the image
//! its ROI operations apply to. A folder still referenced by ROIs cannot be
//! deleted; [`Session::delete`] unlinks them first.

use omero_gateway_interface::{FolderData, Id, LinkKind, ObjectKind, RemoteObject, RoiData};
use tracing::debug;

use crate::error::{OmeroError, Result};
use crate::handler;
use crate::repository::{ImageWrapper, RepositoryObject, RoiWrapper};
use crate::session::Session;
use crate::wrapper::{absorb_saved, impl_entity_wrapper, wrap_by_id, EntityWrapper, Named, Persistent};

#[derive(Debug, Clone)]
pub struct FolderWrapper {
    data: FolderData,
    image_id: Option<Id>,
}

impl_entity_wrapper!(FolderWrapper, FolderData, ObjectKind::Folder);

impl FolderWrapper {
    pub fn new(data: FolderData) -> Self {
        Self {
            data,
            image_id: None,
        }
    }

    /// Create a folder on the server
    pub fn create(session: &Session, name: &str, description: &str) -> Result<Self> {
        let mut folder = Self::new(FolderData {
            name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        });
        folder.save_and_update(session)?;
        Ok(folder)
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.data.name = name.into();
    }

    pub fn description(&self) -> &str {
        &self.data.description
    }

    /// Image the folder's ROI operations apply to
    pub fn image_id(&self) -> Option<Id> {
        self.image_id
    }

    pub fn set_image_id(&mut self, image_id: Id) {
        self.image_id = Some(image_id);
    }

    pub fn set_image(&mut self, image: &ImageWrapper) -> Result<()> {
        self.image_id = Some(image.object_ref()?.id);
        Ok(())
    }

    fn require_image(&self) -> Result<Id> {
        self.image_id
            .ok_or_else(|| OmeroError::precondition(format!("No image set on {}", self)))
    }

    /// Associate a ROI of the current image with this folder
    pub fn add_roi(&self, session: &Session, roi: &RoiWrapper) -> Result<()> {
        self.add_rois(session, std::slice::from_ref(roi))
    }

    pub fn add_rois(&self, session: &Session, rois: &[RoiWrapper]) -> Result<()> {
        let image_id = self.require_image()?;
        let ctx = session.ctx()?;
        let rois: Vec<RoiData> = rois.iter().map(|r| r.data().clone()).collect();

        handler::call(
            session.roi()?.as_ref(),
            |r| r.add_rois_to_folders(&ctx, image_id, &rois, std::slice::from_ref(&self.data)),
            &format!("Cannot add ROIs to {}", self),
        )
    }

    /// ROIs of the current image associated with this folder, sorted by id
    pub fn rois(&self, session: &Session) -> Result<Vec<RoiWrapper>> {
        let image_id = self.require_image()?;
        let folder_id = self.object_ref()?.id;
        let ctx = session.ctx()?;

        let results = handler::call(
            session.roi()?.as_ref(),
            |r| r.load_rois_for_folder(&ctx, image_id, folder_id),
            &format!("Cannot get ROIs from {}", self),
        )?;

        Ok(wrap_by_id(results.into_iter().flat_map(|result| result.rois)))
    }

    /// Dissociate a ROI from this folder; the ROI is kept
    pub fn unlink_roi(&self, session: &Session, roi: &RoiWrapper) -> Result<()> {
        self.unlink_rois(session, std::slice::from_ref(roi))
    }

    fn unlink_rois(&self, session: &Session, rois: &[RoiWrapper]) -> Result<()> {
        if rois.is_empty() {
            return Ok(());
        }

        let image_id = self.require_image()?;
        let ctx = session.ctx()?;
        let rois: Vec<RoiData> = rois.iter().map(|r| r.data().clone()).collect();

        handler::call(
            session.roi()?.as_ref(),
            |r| r.remove_rois_from_folders(&ctx, image_id, &rois, std::slice::from_ref(&self.data)),
            &format!("Cannot unlink ROIs from {}", self),
        )
    }

    /// Dissociate every ROI of the current image from this folder
    pub fn unlink_all_rois(&self, session: &Session) -> Result<()> {
        let rois = self.rois(session)?;
        debug!("Unlinking {} ROI(s) from {}", rois.len(), self);
        self.unlink_rois(session, &rois)
    }

    /// Reload the payload from the server; the image is kept
    pub fn refresh(&mut self, session: &Session) -> Result<()> {
        let id = self.object_ref()?.id;
        match session.find(ObjectKind::Folder, id)? {
            Some(RemoteObject::Folder(data)) => {
                self.replace_data(data);
                Ok(())
            }
            _ => Err(OmeroError::not_found(format!("{} no longer exists", self))),
        }
    }
}

impl Named for FolderWrapper {
    fn name(&self) -> &str {
        &self.data.name
    }
}

impl Persistent for FolderWrapper {
    fn to_remote(&self) -> RemoteObject {
        RemoteObject::Folder(self.data.clone())
    }

    fn absorb(&mut self, saved: RemoteObject) -> Result<()> {
        absorb_saved(self, saved)
    }

    /// Unlink the ROIs of the current image; without an image there is
    /// nothing this folder knows how to unlink
    fn prepare_delete(&self, session: &Session) -> Result<()> {
        match self.image_id {
            Some(_) => self.unlink_all_rois(session),
            None => {
                debug!("No image set on {}, skipping ROI unlink", self);
                Ok(())
            }
        }
    }
}

impl RepositoryObject for FolderWrapper {
    const ANNOTATION_LINK: LinkKind = LinkKind::FolderAnnotation;
}
