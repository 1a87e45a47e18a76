/*!
 * Repository entities: projects, datasets, images, folders, tags and ROIs
 *
 * Navigation between entities goes through the session passed to each call;
 * wrappers never hold a connection themselves.
 */

pub mod dataset;
pub mod folder;
pub mod image;
pub mod project;
pub mod roi;
pub mod tag;

pub use dataset::DatasetWrapper;
pub use folder::FolderWrapper;
pub use image::ImageWrapper;
pub use project::ProjectWrapper;
pub use roi::RoiWrapper;
pub use tag::TagWrapper;

use omero_gateway_interface::{
    Id, LinkData, LinkKind, MapAnnotationData, NamedValue, ObjectKind, ObjectRef, RemoteObject,
};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::error::{OmeroError, Result};
use crate::handler;
use crate::session::Session;
use crate::wrapper::{retain_like, retain_named, wrap_by_id, EntityWrapper, Persistent};

/// Link `parent` to `child` with a new link object
pub(crate) fn link(session: &Session, kind: LinkKind, parent: ObjectRef, child: ObjectRef) -> Result<()> {
    debug!("Linking {} to {}", child, parent);
    session.save(RemoteObject::Link(LinkData::new(kind, parent, child)))?;
    Ok(())
}

/// Delete every link of `kind` between `parent` and `child`
///
/// Both ends survive; only the association is removed.
pub(crate) fn remove_links(session: &Session, kind: LinkKind, parent: Id, child: ObjectRef) -> Result<()> {
    let links: Vec<LinkData> = session
        .find_links(kind, Some(parent), Some(child.id))?
        .into_iter()
        .filter(|link| link.child == child)
        .collect();
    debug!(
        "Removing {} {} link(s) between {} and {}",
        links.len(),
        kind.as_str(),
        parent,
        child
    );

    for link in links {
        if let Some(id) = link.id {
            session.delete_ref(ObjectRef::new(ObjectKind::Link(kind), id))?;
        }
    }
    Ok(())
}

/// Entities that can carry tags and key/value annotations
pub trait RepositoryObject: Persistent + fmt::Display {
    /// Link kind joining this entity to its annotations
    const ANNOTATION_LINK: LinkKind;

    /// Attach an existing tag
    fn add_tag(&self, session: &Session, tag: &TagWrapper) -> Result<()> {
        self.add_tag_id(session, tag.object_ref()?.id)
    }

    fn add_tag_id(&self, session: &Session, tag_id: Id) -> Result<()> {
        link(
            session,
            Self::ANNOTATION_LINK,
            self.object_ref()?,
            ObjectRef::new(ObjectKind::TagAnnotation, tag_id),
        )
    }

    fn add_tags(&self, session: &Session, tags: &[TagWrapper]) -> Result<()> {
        for tag in tags {
            self.add_tag(session, tag)?;
        }
        Ok(())
    }

    /// Create a tag and attach it
    fn add_new_tag(&self, session: &Session, name: &str, description: &str) -> Result<TagWrapper> {
        let tag = TagWrapper::create(session, name, description)?;
        self.add_tag(session, &tag)?;
        Ok(tag)
    }

    /// Detach a tag; the tag itself is kept
    fn unlink_tag(&self, session: &Session, tag: &TagWrapper) -> Result<()> {
        remove_links(
            session,
            Self::ANNOTATION_LINK,
            self.object_ref()?.id,
            tag.object_ref()?,
        )
    }

    /// Tags attached to this entity, sorted by id
    fn tags(&self, session: &Session) -> Result<Vec<TagWrapper>> {
        let target = self.object_ref()?;
        let ctx = session.ctx()?;
        let tags = handler::call(
            session.metadata()?.as_ref(),
            |m| m.get_tags(&ctx, target),
            &format!("Cannot get tags for {}", target),
        )?;
        Ok(wrap_by_id(tags))
    }

    /// Attach a single key/value pair as a new map annotation
    fn add_pair(&self, session: &Session, key: &str, value: &str) -> Result<()> {
        let target = self.object_ref()?;
        let annotation = MapAnnotationData {
            pairs: vec![NamedValue::new(key, value)],
            ..Default::default()
        };

        let saved = session.save(RemoteObject::MapAnnotation(annotation))?;
        let annotation_id = saved
            .id()
            .ok_or_else(|| OmeroError::server(format!("Map annotation for {} has no id", target)))?;

        link(
            session,
            Self::ANNOTATION_LINK,
            target,
            ObjectRef::new(ObjectKind::MapAnnotation, annotation_id),
        )
    }

    /// Key/value pairs of every map annotation attached to this entity
    fn key_value_pairs(&self, session: &Session) -> Result<Vec<NamedValue>> {
        let target = self.object_ref()?;
        let ctx = session.ctx()?;
        let annotations = handler::call(
            session.metadata()?.as_ref(),
            |m| m.get_map_annotations(&ctx, target),
            &format!("Cannot get key/value pairs for {}", target),
        )?;

        Ok(annotations
            .into_iter()
            .flat_map(|annotation| annotation.pairs)
            .collect())
    }

    /// Value of the first pair named `key`
    fn value(&self, session: &Session, key: &str) -> Result<String> {
        self.key_value_pairs(session)?
            .into_iter()
            .find(|pair| pair.name == key)
            .map(|pair| pair.value)
            .ok_or_else(|| OmeroError::not_found(format!("Key \"{}\" not found on {}", key, self)))
    }
}

/// Local filter over an already fetched list of images
///
/// Every image query of projects, datasets and the session funnels through
/// here, so matching rules are the same wherever images are listed.
#[derive(Debug, Clone, Copy)]
pub enum ImageFilter<'a> {
    /// Name equal to the string
    Named(&'a str),
    /// Name containing a match of the regular expression
    Like(&'a str),
    /// Linked to the tag with this id
    Tagged(Id),
    /// Carries a key/value pair with this key
    WithKey(&'a str),
    /// Carries this exact key/value pair
    WithPair(&'a str, &'a str),
}

impl ImageFilter<'_> {
    /// Keep the images matching this filter, preserving order
    pub fn apply(self, session: &Session, mut images: Vec<ImageWrapper>) -> Result<Vec<ImageWrapper>> {
        match self {
            ImageFilter::Named(name) => retain_named(&mut images, name),
            ImageFilter::Like(pattern) => retain_like(&mut images, pattern)?,
            ImageFilter::Tagged(tag_id) => {
                let tagged: BTreeSet<Id> = session.tagged_image_ids(tag_id)?;
                images.retain(|image| image.id().is_some_and(|id| tagged.contains(&id)));
            }
            ImageFilter::WithKey(key) => {
                images = retain_annotated(session, images, |pair| pair.name == key)?;
            }
            ImageFilter::WithPair(key, value) => {
                images = retain_annotated(session, images, |pair| {
                    pair.name == key && pair.value == value
                })?;
            }
        }
        Ok(images)
    }
}

fn retain_annotated<P>(session: &Session, images: Vec<ImageWrapper>, predicate: P) -> Result<Vec<ImageWrapper>>
where
    P: Fn(&NamedValue) -> bool,
{
    let mut kept = Vec::with_capacity(images.len());
    for image in images {
        if image.key_value_pairs(session)?.iter().any(&predicate) {
            kept.push(image);
        }
    }
    Ok(kept)
}
