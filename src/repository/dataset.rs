//! Datasets

use omero_gateway_interface::{DatasetData, Filter, Id, LinkKind, ObjectKind, RemoteObject};

use crate::error::{OmeroError, Result};
use crate::handler;
use crate::repository::{
    link, remove_links, ImageFilter, ImageWrapper, ProjectWrapper, RepositoryObject, TagWrapper,
};
use crate::session::Session;
use crate::wrapper::{absorb_saved, impl_entity_wrapper, wrap_by_id, EntityWrapper, Named, Persistent};

#[derive(Debug, Clone)]
pub struct DatasetWrapper {
    data: DatasetData,
}

impl_entity_wrapper!(DatasetWrapper, DatasetData, ObjectKind::Dataset);

impl DatasetWrapper {
    pub fn new(data: DatasetData) -> Self {
        Self { data }
    }

    /// Unsaved dataset with a name and description
    pub fn unsaved(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(DatasetData {
            name: name.into(),
            description: description.into(),
            ..Default::default()
        })
    }

    /// Create an orphan dataset on the server
    pub fn create(session: &Session, name: &str, description: &str) -> Result<Self> {
        let mut dataset = Self::unsaved(name, description);
        dataset.save_and_update(session)?;
        Ok(dataset)
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

    /// Link the dataset to `project` when it is first saved
    pub(crate) fn attach_to(&mut self, project: Id) {
        if !self.data.projects.contains(&project) {
            self.data.projects.push(project);
        }
    }

    /// Projects containing this dataset
    pub fn projects(&self, session: &Session) -> Result<Vec<ProjectWrapper>> {
        let id = self.object_ref()?.id;
        let ids: Vec<Id> = session
            .find_links(LinkKind::ProjectDataset, None, Some(id))?
            .into_iter()
            .map(|link| link.parent.id)
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }
        session.get_projects_by_ids(&ids)
    }

    /// Images in this dataset, sorted by id
    pub fn images(&self, session: &Session) -> Result<Vec<ImageWrapper>> {
        let id = self.object_ref()?.id;
        let ctx = session.ctx()?;
        let images = handler::call(
            session.browse()?.as_ref(),
            |b| b.get_images_for_datasets(&ctx, &[id]),
            &format!("Cannot get images from {}", self),
        )?;
        Ok(wrap_by_id(images))
    }

    /// Images named exactly `name`
    pub fn images_named(&self, session: &Session, name: &str) -> Result<Vec<ImageWrapper>> {
        ImageFilter::Named(name).apply(session, self.images(session)?)
    }

    /// Images whose name contains a match of the regular expression
    pub fn images_like(&self, session: &Session, pattern: &str) -> Result<Vec<ImageWrapper>> {
        ImageFilter::Like(pattern).apply(session, self.images(session)?)
    }

    pub fn images_tagged(&self, session: &Session, tag: &TagWrapper) -> Result<Vec<ImageWrapper>> {
        self.images_tagged_id(session, tag.object_ref()?.id)
    }

    pub fn images_tagged_id(&self, session: &Session, tag_id: Id) -> Result<Vec<ImageWrapper>> {
        ImageFilter::Tagged(tag_id).apply(session, self.images(session)?)
    }

    pub fn images_with_key(&self, session: &Session, key: &str) -> Result<Vec<ImageWrapper>> {
        ImageFilter::WithKey(key).apply(session, self.images(session)?)
    }

    pub fn images_with_pair(&self, session: &Session, key: &str, value: &str) -> Result<Vec<ImageWrapper>> {
        ImageFilter::WithPair(key, value).apply(session, self.images(session)?)
    }

    /// Put an existing image in this dataset
    pub fn add_image(&self, session: &Session, image: &ImageWrapper) -> Result<()> {
        link(
            session,
            LinkKind::DatasetImage,
            self.object_ref()?,
            image.object_ref()?,
        )
    }

    pub fn add_images(&self, session: &Session, images: &[ImageWrapper]) -> Result<()> {
        for image in images {
            self.add_image(session, image)?;
        }
        Ok(())
    }

    /// Take an image out of this dataset; the image is kept
    pub fn remove_image(&self, session: &Session, image: &ImageWrapper) -> Result<()> {
        remove_links(
            session,
            LinkKind::DatasetImage,
            self.object_ref()?.id,
            image.object_ref()?,
        )
    }

    /// Reload the payload from the server
    pub fn refresh(&mut self, session: &Session) -> Result<()> {
        let id = self.object_ref()?.id;
        let ctx = session.ctx()?;
        let datasets = handler::call(
            session.browse()?.as_ref(),
            |b| b.get_datasets(&ctx, &Filter::Ids(vec![id])),
            &format!("Cannot refresh {}", self),
        )?;

        let data = datasets
            .into_iter()
            .next()
            .ok_or_else(|| OmeroError::not_found(format!("{} no longer exists", self)))?;
        self.replace_data(data);
        Ok(())
    }
}

impl Named for DatasetWrapper {
    fn name(&self) -> &str {
        &self.data.name
    }
}

impl Persistent for DatasetWrapper {
    fn to_remote(&self) -> RemoteObject {
        RemoteObject::Dataset(self.data.clone())
    }

    fn absorb(&mut self, saved: RemoteObject) -> Result<()> {
        absorb_saved(self, saved)
    }
}

impl RepositoryObject for DatasetWrapper {
    const ANNOTATION_LINK: LinkKind = LinkKind::DatasetAnnotation;
}
