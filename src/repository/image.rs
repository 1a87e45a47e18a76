//! Images

use chrono::{DateTime, Utc};
use omero_gateway_interface::{Filter, Id, ImageData, LinkKind, ObjectKind, RemoteObject, RoiData};

use crate::error::{OmeroError, Result};
use crate::handler;
use crate::repository::{DatasetWrapper, RepositoryObject, RoiWrapper};
use crate::session::Session;
use crate::wrapper::{
    absorb_saved, first, impl_entity_wrapper, wrap_by_id, EntityWrapper, Named, Persistent,
};

#[derive(Debug, Clone)]
pub struct ImageWrapper {
    data: ImageData,
}

impl_entity_wrapper!(ImageWrapper, ImageData, ObjectKind::Image);

impl ImageWrapper {
    pub fn new(data: ImageData) -> Self {
        Self { data }
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

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.data.description = description.into();
    }

    pub fn acquisition_date(&self) -> Option<DateTime<Utc>> {
        self.data.acquisition_date
    }

    pub fn owner_id(&self) -> Option<Id> {
        self.data.details.owner_id
    }

    /// Datasets containing this image
    pub fn datasets(&self, session: &Session) -> Result<Vec<DatasetWrapper>> {
        let id = self.object_ref()?.id;
        let ids: Vec<Id> = session
            .find_links(LinkKind::DatasetImage, None, Some(id))?
            .into_iter()
            .map(|link| link.parent.id)
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }
        session.get_datasets_by_ids(&ids)
    }

    /// ROIs drawn on this image, sorted by id
    pub fn rois(&self, session: &Session) -> Result<Vec<RoiWrapper>> {
        let image_id = self.object_ref()?.id;
        let ctx = session.ctx()?;
        let results = handler::call(
            session.roi()?.as_ref(),
            |r| r.load_rois(&ctx, image_id),
            &format!("Cannot get ROIs from {}", self),
        )?;

        Ok(wrap_by_id(results.into_iter().flat_map(|result| result.rois)))
    }

    /// Save a ROI on this image and return it as stored
    pub fn save_roi(&self, session: &Session, roi: &RoiWrapper) -> Result<RoiWrapper> {
        let image_id = self.object_ref()?.id;
        let ctx = session.ctx()?;
        let mut data: RoiData = roi.data().clone();
        data.image_id = Some(image_id);

        let saved = handler::call(
            session.roi()?.as_ref(),
            |r| r.save_rois(&ctx, image_id, std::slice::from_ref(&data)),
            &format!("Cannot link ROI to {}", self),
        )?;

        first(wrap_by_id(saved), || format!("Saving ROI on {} returned nothing", self))
    }

    /// Reload the payload from the server
    pub fn refresh(&mut self, session: &Session) -> Result<()> {
        let id = self.object_ref()?.id;
        let ctx = session.ctx()?;
        let images = handler::call(
            session.browse()?.as_ref(),
            |b| b.get_images(&ctx, &Filter::Ids(vec![id])),
            &format!("Cannot refresh {}", self),
        )?;

        let data = images
            .into_iter()
            .next()
            .ok_or_else(|| OmeroError::not_found(format!("{} no longer exists", self)))?;
        self.replace_data(data);
        Ok(())
    }
}

impl Named for ImageWrapper {
    fn name(&self) -> &str {
        &self.data.name
    }
}

impl Persistent for ImageWrapper {
    fn to_remote(&self) -> RemoteObject {
        RemoteObject::Image(self.data.clone())
    }

    fn absorb(&mut self, saved: RemoteObject) -> Result<()> {
        absorb_saved(self, saved)
    }
}

impl RepositoryObject for ImageWrapper {
    const ANNOTATION_LINK: LinkKind = LinkKind::ImageAnnotation;
}
