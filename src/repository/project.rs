//! Projects
//!
//! A project holds datasets, which hold images. Image queries on a project
//! run once per dataset and merge the results, so an image reachable
//! through several datasets is reported once.

use omero_gateway_interface::{Filter, Id, LinkKind, ObjectKind, ProjectData, RemoteObject};
use tracing::debug;

use crate::error::{OmeroError, Result};
use crate::handler;
use crate::repository::{
    link, remove_links, DatasetWrapper, ImageFilter, ImageWrapper, RepositoryObject, TagWrapper,
};
use crate::session::Session;
use crate::wrapper::{
    absorb_saved, impl_entity_wrapper, retain_named, sort_and_purge, wrap_by_id, EntityWrapper,
    Named, Persistent,
};

#[derive(Debug, Clone)]
pub struct ProjectWrapper {
    data: ProjectData,
}

impl_entity_wrapper!(ProjectWrapper, ProjectData, ObjectKind::Project);

impl ProjectWrapper {
    pub fn new(data: ProjectData) -> Self {
        Self { data }
    }

    /// Create a project on the server
    pub fn create(session: &Session, name: &str, description: &str) -> Result<Self> {
        let mut project = Self::new(ProjectData {
            name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        });
        project.save_and_update(session)?;
        Ok(project)
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

    /// Datasets loaded with the project, sorted by id
    ///
    /// Reflects the server state at the last fetch or [`refresh`](Self::refresh).
    pub fn datasets(&self) -> Vec<DatasetWrapper> {
        wrap_by_id(self.data.datasets.clone())
    }

    /// Datasets named exactly `name`
    pub fn datasets_named(&self, name: &str) -> Vec<DatasetWrapper> {
        let mut datasets = self.datasets();
        retain_named(&mut datasets, name);
        datasets
    }

    /// Put a dataset in this project and return it as stored
    ///
    /// An unsaved dataset is created already linked; a saved one gets a new
    /// link. The project is refreshed afterwards.
    pub fn add_dataset(&mut self, session: &Session, mut dataset: DatasetWrapper) -> Result<DatasetWrapper> {
        let project = self.object_ref()?;

        if dataset.id().is_none() {
            dataset.attach_to(project.id);
            dataset.save_and_update(session)?;
        } else {
            link(session, LinkKind::ProjectDataset, project, dataset.object_ref()?)?;
        }

        debug!("Added {} to {}", dataset, self);
        self.refresh(session)?;
        Ok(dataset)
    }

    /// Create a dataset inside this project
    pub fn add_new_dataset(&mut self, session: &Session, name: &str, description: &str) -> Result<DatasetWrapper> {
        self.add_dataset(session, DatasetWrapper::unsaved(name, description))
    }

    /// Take a dataset out of this project; the dataset is kept
    pub fn remove_dataset(&mut self, session: &Session, dataset: &DatasetWrapper) -> Result<()> {
        remove_links(
            session,
            LinkKind::ProjectDataset,
            self.object_ref()?.id,
            dataset.object_ref()?,
        )?;
        self.refresh(session)
    }

    /// Images of every dataset, sorted by id, each reported once
    pub fn images(&self, session: &Session) -> Result<Vec<ImageWrapper>> {
        let mut images = Vec::new();
        for dataset in self.datasets() {
            images.extend(dataset.images(session)?);
        }
        Ok(sort_and_purge(images))
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

    /// Reload the payload, including the dataset list, from the server
    pub fn refresh(&mut self, session: &Session) -> Result<()> {
        let id = self.object_ref()?.id;
        let ctx = session.ctx()?;
        let projects = handler::call(
            session.browse()?.as_ref(),
            |b| b.get_projects(&ctx, &Filter::Ids(vec![id])),
            &format!("Cannot refresh {}", self),
        )?;

        let data = projects
            .into_iter()
            .next()
            .ok_or_else(|| OmeroError::not_found(format!("{} no longer exists", self)))?;
        self.replace_data(data);
        Ok(())
    }
}

impl Named for ProjectWrapper {
    fn name(&self) -> &str {
        &self.data.name
    }
}

impl Persistent for ProjectWrapper {
    fn to_remote(&self) -> RemoteObject {
        RemoteObject::Project(self.data.clone())
    }

    fn absorb(&mut self, saved: RemoteObject) -> Result<()> {
        absorb_saved(self, saved)
    }
}

impl RepositoryObject for ProjectWrapper {
    const ANNOTATION_LINK: LinkKind = LinkKind::ProjectAnnotation;
}
